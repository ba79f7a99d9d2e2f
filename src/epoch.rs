//! Interval algebra over `(start, stop)` pairs in seconds.
//!
//! An [`Epoch`] is always stored sorted by `(start, stop)`.  Intervals may
//! overlap until [`Epoch::merge`] is called; every query below is correct
//! for overlapping input as well.
//!
//! ```text
//! A:        [----)      [------)
//! B:           [-----------)
//! A ∩ B:       [-)      [--)
//! A ∪ B:    [------------------)   (join + merge)
//! ```
//!
//! Containment is answered by binary search over the starts plus a
//! running maximum of the stops, so it is O(log n) whether or not the
//! epoch has been merged.
use crate::error::{Error, Result};
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Epoch {
    starts: Vec<f64>,
    stops: Vec<f64>,
    /// `max_stop[i] = max(stops[..=i])`.
    max_stop: Vec<f64>,
}

impl Epoch {
    /// The empty epoch.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an epoch from parallel start/stop arrays.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedInput`] if the arrays differ in length, contain a
    /// non-finite value, or any interval has `start > stop`.
    pub fn from_pairs(starts: &[f64], stops: &[f64]) -> Result<Self> {
        if starts.len() != stops.len() {
            return Err(Error::malformed(
                "epoch",
                format!("{} starts but {} stops", starts.len(), stops.len()),
            ));
        }
        for (i, (&s, &e)) in starts.iter().zip(stops).enumerate() {
            if !s.is_finite() || !e.is_finite() {
                return Err(Error::malformed("epoch", format!("interval {i} is not finite")));
            }
            if s > e {
                return Err(Error::malformed(
                    "epoch",
                    format!("interval {i} has start {s} > stop {e}"),
                ));
            }
        }
        Ok(Self::from_sorted_unchecked(
            sorted_pairs(starts.iter().copied().zip(stops.iter().copied()).collect()),
        ))
    }

    /// A single interval.
    pub fn interval(start: f64, stop: f64) -> Result<Self> {
        Self::from_pairs(&[start], &[stop])
    }

    /// Build from pairs that are already validated (finite, start ≤ stop).
    fn from_sorted_unchecked(pairs: Vec<(f64, f64)>) -> Self {
        let mut starts = Vec::with_capacity(pairs.len());
        let mut stops = Vec::with_capacity(pairs.len());
        let mut max_stop = Vec::with_capacity(pairs.len());
        let mut running = f64::NEG_INFINITY;
        for (s, e) in pairs {
            running = running.max(e);
            starts.push(s);
            stops.push(e);
            max_stop.push(running);
        }
        Self { starts, stops, max_stop }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn starts(&self) -> &[f64] {
        &self.starts
    }

    pub fn stops(&self) -> &[f64] {
        &self.stops
    }

    /// Iterate over `(start, stop)` pairs in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.starts.iter().copied().zip(self.stops.iter().copied())
    }

    /// Earliest start, `None` for the empty epoch.
    pub fn start(&self) -> Option<f64> {
        self.starts.first().copied()
    }

    /// Latest stop, `None` for the empty epoch.
    pub fn stop(&self) -> Option<f64> {
        self.max_stop.last().copied()
    }

    pub fn centers(&self) -> Vec<f64> {
        self.iter().map(|(s, e)| 0.5 * (s + e)).collect()
    }

    pub fn durations(&self) -> Vec<f64> {
        self.iter().map(|(s, e)| e - s).collect()
    }

    /// Sum of interval durations (overlaps counted twice unless merged).
    pub fn total_duration(&self) -> f64 {
        self.iter().map(|(s, e)| e - s).sum()
    }

    /// The `idx`-th interval as a one-interval epoch.
    pub fn get(&self, idx: usize) -> Option<Epoch> {
        let s = *self.starts.get(idx)?;
        let e = self.stops[idx];
        Some(Self::from_sorted_unchecked(vec![(s, e)]))
    }

    /// Concatenate the intervals of `self` and `other` without merging.
    pub fn join(&self, other: &Epoch) -> Epoch {
        let pairs: Vec<(f64, f64)> = self.iter().chain(other.iter()).collect();
        Self::from_sorted_unchecked(sorted_pairs(pairs))
    }

    /// Combine overlapping or touching intervals.
    ///
    /// The result is disjoint and sorted ascending.
    pub fn merge(&self) -> Epoch {
        let mut out: Vec<(f64, f64)> = Vec::with_capacity(self.len());
        for (s, e) in self.iter() {
            match out.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => out.push((s, e)),
            }
        }
        Self::from_sorted_unchecked(out)
    }

    /// Pairwise overlaps of every interval in `self` with every interval in
    /// `other`: `(max(starts), min(stops))`.
    ///
    /// Two positive-length intervals that merely touch do not overlap.  A
    /// zero-length interval lying inside (or on the edge of) the other
    /// epoch is kept.
    pub fn intersect(&self, other: &Epoch) -> Epoch {
        if self.is_empty() || other.is_empty() {
            return Epoch::empty();
        }
        let mut out = Vec::new();
        for (a_start, a_stop) in self.iter() {
            // Candidates in `other` start no later than `a_stop`.
            let upper = other.starts.partition_point(|&s| s <= a_stop);
            let mut j = upper;
            while j > 0 {
                j -= 1;
                if other.max_stop[j] < a_start {
                    break;
                }
                let (b_start, b_stop) = (other.starts[j], other.stops[j]);
                let lo = a_start.max(b_start);
                let hi = a_stop.min(b_stop);
                let a_point = a_start == a_stop;
                let b_point = b_start == b_stop;
                if lo < hi || (lo == hi && (a_point || b_point)) {
                    out.push((lo, hi));
                }
            }
        }
        Self::from_sorted_unchecked(sorted_pairs(out))
    }

    /// Restrict to the wall-clock window `[t0, t1]`, clipping intervals that
    /// straddle either edge.  An inverted window yields the empty epoch.
    pub fn time_slice(&self, t0: f64, t1: f64) -> Epoch {
        if !(t0 <= t1) {
            return Epoch::empty();
        }
        self.intersect(&Self::from_sorted_unchecked(vec![(t0, t1)]))
    }

    /// `true` if `t` lies inside any closed interval `[start, stop]`.
    pub fn contains(&self, t: f64) -> bool {
        let idx = self.starts.partition_point(|&s| s <= t);
        idx > 0 && self.max_stop[idx - 1] >= t
    }

    /// Set difference: the parts of `self` not covered by `other`.
    pub fn excludes(&self, other: &Epoch) -> Epoch {
        let a = self.merge();
        let b = other.merge();
        let mut out = Vec::new();
        let mut j = 0;
        for (a_start, a_stop) in a.iter() {
            let mut cursor = a_start;
            while j < b.len() && b.stops[j] <= cursor {
                j += 1;
            }
            let mut k = j;
            while k < b.len() && b.starts[k] < a_stop {
                if b.starts[k] > cursor {
                    out.push((cursor, b.starts[k]));
                }
                cursor = cursor.max(b.stops[k]);
                k += 1;
            }
            if cursor < a_stop {
                out.push((cursor, a_stop));
            }
        }
        Self::from_sorted_unchecked(out)
    }

    /// For each interval of `self`, whether it overlaps any interval of `other`.
    pub fn overlaps(&self, other: &Epoch) -> Vec<bool> {
        self.iter()
            .map(|(s, e)| {
                let upper = other.starts.partition_point(|&b| b <= e);
                upper > 0 && other.max_stop[upper - 1] >= s
            })
            .collect()
    }
}

fn sorted_pairs(mut pairs: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    pairs.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
    });
    pairs
}
