//! Decoding-error and likelihood aggregation, per session and across
//! sessions.
//!
//! Insufficient data never becomes zero: an empty error set has a NaN mean,
//! a position bin never visited has a NaN error, a (trajectory, phase) group
//! without replays has an all-NaN likelihood curve and a phase without SWRs
//! has an undefined (`None`) replay proportion.
use crate::decode::{DecodedPosition, Posterior};
use crate::epoch::Epoch;
use crate::replay::ReplayClassification;
use crate::signal::Position;
use crate::stats::{nan_mean, nan_mean_rows, nan_median, proportion};
use crate::task::{Exclusivity, Phase, Trajectory};
use crate::tuning::position_bin;
use ndarray::Array1;
use std::collections::BTreeMap;

// ── Decoding error ───────────────────────────────────────────────────────────

/// Decoded and true position at every decoding bin that falls in a running
/// epoch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodingError {
    pub time: Vec<f64>,
    pub decoded: Vec<f64>,
    pub actual: Vec<f64>,
    /// `|decoded − actual|`, in position units.
    pub error: Vec<f64>,
}

impl DecodingError {
    /// Align `decoded` with the nearest true position sample.
    ///
    /// Only decoding bins whose time lies in `running` are kept, and the
    /// true position is looked up among running samples only.
    pub fn align(decoded: &DecodedPosition, position: &Position, running: &Epoch) -> Self {
        let run_position = position.restrict(running);
        let mut out = DecodingError::default();
        for (&t, &x) in decoded.time.iter().zip(&decoded.x) {
            if !running.contains(t) {
                continue;
            }
            let Some(row) = run_position.signal().nearest(t) else { continue };
            let actual = row[0];
            out.time.push(t);
            out.decoded.push(x);
            out.actual.push(actual);
            out.error.push((x - actual).abs());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.error.len()
    }

    pub fn is_empty(&self) -> bool {
        self.error.is_empty()
    }

    /// NaN when no bin was aligned.
    pub fn mean(&self) -> f64 {
        nan_mean(&self.error)
    }

    pub fn median(&self) -> f64 {
        nan_median(&self.error)
    }

    /// Mean error per true-position bin over `edges`; NaN for bins without
    /// samples.
    pub fn binned(&self, edges: &[f64]) -> Array1<f64> {
        binned_mean(&self.actual, &self.error, edges)
    }

    /// Append another error set (used across sessions).
    pub fn extend(&mut self, other: &DecodingError) {
        self.time.extend_from_slice(&other.time);
        self.decoded.extend_from_slice(&other.decoded);
        self.actual.extend_from_slice(&other.actual);
        self.error.extend_from_slice(&other.error);
    }
}

/// Mean of `values` grouped by the bin of `keys`.
fn binned_mean(keys: &[f64], values: &[f64], edges: &[f64]) -> Array1<f64> {
    let n_bins = edges.len().saturating_sub(1);
    let mut sum = vec![0.0; n_bins];
    let mut count = vec![0usize; n_bins];
    for (&k, &v) in keys.iter().zip(values) {
        if let Some(b) = position_bin(k, edges) {
            sum[b] += v;
            count[b] += 1;
        }
    }
    Array1::from_iter(
        sum.iter().zip(&count).map(|(&s, &c)| if c == 0 { f64::NAN } else { s / c as f64 }),
    )
}

// ── Likelihood by bin ────────────────────────────────────────────────────────

/// Mean posterior over the given events.
///
/// Each event is reduced to the mean of its valid posterior rows, then the
/// events are averaged NaN-aware.  No events, or no valid rows, gives an
/// all-NaN curve of `posterior.n_bins()` entries.
pub fn likelihood_curve(posterior: &Posterior, events: &Epoch) -> Array1<f64> {
    let per_event: Vec<Array1<f64>> =
        events.iter().map(|(start, stop)| posterior.mean_over(start, stop)).collect();
    nan_mean_rows(per_event.iter().map(|r| r.view()), posterior.n_bins())
}

/// Likelihood curve of every phase for one trajectory.
///
/// `posterior` must have been decoded over the SWRs with that trajectory's
/// tuning curves; only events in `replays` contribute.
pub fn likelihood_by_phase(
    posterior: &Posterior,
    swrs: &Epoch,
    replays: &[usize],
    events_by_phase: &BTreeMap<Phase, Vec<usize>>,
) -> BTreeMap<Phase, Array1<f64>> {
    Phase::ALL
        .into_iter()
        .map(|phase| {
            let in_phase = events_by_phase.get(&phase).map(Vec::as_slice).unwrap_or(&[]);
            let (starts, stops): (Vec<f64>, Vec<f64>) = in_phase
                .iter()
                .filter(|i| replays.binary_search(i).is_ok())
                .filter_map(|&i| Some((swrs.starts().get(i).copied()?, swrs.stops().get(i).copied()?)))
                .unzip();
            let events = Epoch::from_pairs(&starts, &stops).unwrap_or_default();
            (phase, likelihood_curve(posterior, &events))
        })
        .collect()
}

// ── Replay proportions ───────────────────────────────────────────────────────

/// Replay counts within one phase.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplayCounts {
    pub n_swrs: usize,
    pub replays: BTreeMap<Trajectory, usize>,
    pub exclusive: BTreeMap<Exclusivity, usize>,
}

impl ReplayCounts {
    /// Fraction of SWRs replaying `traj`; `None` without SWRs.
    pub fn proportion(&self, traj: Trajectory) -> Option<f64> {
        proportion(self.replays.get(&traj).copied().unwrap_or(0), self.n_swrs)
    }

    pub fn exclusive_proportion(&self, category: Exclusivity) -> Option<f64> {
        proportion(self.exclusive.get(&category).copied().unwrap_or(0), self.n_swrs)
    }

    pub fn add(&mut self, other: &ReplayCounts) {
        self.n_swrs += other.n_swrs;
        for (&t, &n) in &other.replays {
            *self.replays.entry(t).or_default() += n;
        }
        for (&c, &n) in &other.exclusive {
            *self.exclusive.entry(c).or_default() += n;
        }
    }
}

/// Replay counts of every phase.
pub fn replay_proportions(
    classification: &ReplayClassification,
    events_by_phase: &BTreeMap<Phase, Vec<usize>>,
) -> BTreeMap<Phase, ReplayCounts> {
    let count_in = |events: &[usize], set: &[usize]| {
        events.iter().filter(|i| set.binary_search(i).is_ok()).count()
    };
    Phase::ALL
        .into_iter()
        .map(|phase| {
            let events = events_by_phase.get(&phase).map(Vec::as_slice).unwrap_or(&[]);
            let counts = ReplayCounts {
                n_swrs: events.len(),
                replays: Trajectory::ALL
                    .into_iter()
                    .map(|t| (t, count_in(events, classification.replays(t))))
                    .collect(),
                exclusive: Exclusivity::ALL
                    .into_iter()
                    .map(|c| (c, count_in(events, classification.exclusive(c))))
                    .collect(),
            };
            (phase, counts)
        })
        .collect()
}

// ── Cross-session aggregation ────────────────────────────────────────────────

/// Aggregated metrics of one session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionMetrics {
    pub errors: BTreeMap<Trajectory, DecodingError>,
    pub likelihood: BTreeMap<Trajectory, BTreeMap<Phase, Array1<f64>>>,
    pub replay_counts: BTreeMap<Phase, ReplayCounts>,
}

/// Metrics stacked over sessions in their declared order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupSummary {
    pub sessions: Vec<String>,
    /// Decoding errors of all sessions, concatenated.
    pub errors: BTreeMap<Trajectory, DecodingError>,
    /// NaN-aware mean of the per-session likelihood curves.
    pub likelihood: BTreeMap<Trajectory, BTreeMap<Phase, Array1<f64>>>,
    /// Replay counts summed over sessions.
    pub replay_counts: BTreeMap<Phase, ReplayCounts>,
}

impl GroupSummary {
    /// Combine `sessions`; curves have `n_bins` entries.
    pub fn from_sessions<'a, I>(sessions: I, n_bins: usize) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a SessionMetrics)>,
    {
        let mut summary = GroupSummary::default();
        let mut curves: BTreeMap<(Trajectory, Phase), Vec<&'a Array1<f64>>> = BTreeMap::new();
        for (name, metrics) in sessions {
            summary.sessions.push(name.to_string());
            for (&traj, err) in &metrics.errors {
                summary.errors.entry(traj).or_default().extend(err);
            }
            for (&traj, by_phase) in &metrics.likelihood {
                for (&phase, curve) in by_phase {
                    curves.entry((traj, phase)).or_default().push(curve);
                }
            }
            for (&phase, counts) in &metrics.replay_counts {
                summary.replay_counts.entry(phase).or_default().add(counts);
            }
        }
        for traj in Trajectory::ALL {
            let by_phase = Phase::ALL
                .into_iter()
                .map(|phase| {
                    let rows = curves.get(&(traj, phase)).map(Vec::as_slice).unwrap_or(&[]);
                    (phase, nan_mean_rows(rows.iter().map(|r| r.view()), n_bins))
                })
                .collect();
            summary.likelihood.insert(traj, by_phase);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::EventCorrelation;
    use approx::assert_abs_diff_eq;

    #[test]
    fn error_only_in_running_epochs() {
        let decoded = DecodedPosition {
            time: vec![0.5, 1.5, 2.5],
            bin: vec![10, 20, 30],
            x: vec![10.5, 20.5, 30.5],
        };
        let time: Vec<f64> = (0..31).map(|i| i as f64 * 0.1).collect();
        let x: Vec<f64> = time.iter().map(|t| t * 10.0).collect();
        let pos = Position::linear(time, x).unwrap();
        let running = Epoch::from_pairs(&[0.0, 2.0], &[1.0, 3.0]).unwrap();
        let err = DecodingError::align(&decoded, &pos, &running);
        assert_eq!(err.len(), 2);
        assert_abs_diff_eq!(err.error[0], 5.5, epsilon = 1e-9);
        assert_abs_diff_eq!(err.error[1], 5.5, epsilon = 1e-9);
        assert_abs_diff_eq!(err.mean(), 5.5, epsilon = 1e-9);
    }

    #[test]
    fn binned_error_is_nan_where_unvisited() {
        let err = DecodingError {
            time: vec![0.0, 1.0, 2.0],
            decoded: vec![0.0; 3],
            actual: vec![0.5, 0.7, 2.5],
            error: vec![1.0, 3.0, 4.0],
        };
        let b = err.binned(&[0.0, 1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(b[0], 2.0);
        assert!(b[1].is_nan());
        assert_abs_diff_eq!(b[2], 4.0);
        assert!(DecodingError::default().mean().is_nan());
    }

    #[test]
    fn empty_group_is_all_nan() {
        let post = Posterior::empty(100);
        let curve = likelihood_curve(&post, &Epoch::empty());
        assert_eq!(curve.len(), 100);
        assert!(curve.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn proportions_undefined_without_swrs() {
        let mut corr = BTreeMap::new();
        let ev = |p: f64| EventCorrelation {
            correlation: 0.0,
            p_value: 0.5,
            shuffled: vec![],
            percentile: p,
            n_active: 4,
        };
        corr.insert(Trajectory::Familiar, vec![ev(99.0), ev(50.0), ev(1.0)]);
        corr.insert(Trajectory::Shortcut, vec![ev(50.0), ev(50.0), ev(1.0)]);
        let cls = ReplayClassification::from_correlations(&corr, 5.0);
        let mut by_phase = BTreeMap::new();
        by_phase.insert(Phase::PauseA, vec![0, 1]);
        by_phase.insert(Phase::PauseB, vec![2]);
        let counts = replay_proportions(&cls, &by_phase);

        let pause_a = &counts[&Phase::PauseA];
        assert_eq!(pause_a.n_swrs, 2);
        assert_abs_diff_eq!(pause_a.proportion(Trajectory::Familiar).unwrap(), 0.5);
        assert_eq!(pause_a.proportion(Trajectory::Shortcut), Some(0.0));
        assert_eq!(counts[&Phase::PauseB].exclusive[&Exclusivity::Both], 1);
        assert_eq!(counts[&Phase::Phase1].proportion(Trajectory::Familiar), None);
    }

    #[test]
    fn group_summary_stacks_in_order() {
        let mut a = SessionMetrics::default();
        a.errors.insert(Trajectory::Familiar, DecodingError {
            time: vec![0.0],
            decoded: vec![1.0],
            actual: vec![2.0],
            error: vec![1.0],
        });
        let mut curve = Array1::from_elem(4, f64::NAN);
        curve[1] = 0.5;
        a.likelihood.entry(Trajectory::Familiar).or_default().insert(Phase::PauseA, curve);
        let mut b = SessionMetrics::default();
        b.errors.insert(Trajectory::Familiar, DecodingError {
            time: vec![5.0],
            decoded: vec![1.0],
            actual: vec![4.0],
            error: vec![3.0],
        });
        let mut curve = Array1::from_elem(4, f64::NAN);
        curve[1] = 1.0;
        b.likelihood.entry(Trajectory::Familiar).or_default().insert(Phase::PauseA, curve);

        let g = GroupSummary::from_sessions([("r1", &a), ("r2", &b)], 4);
        assert_eq!(g.sessions, vec!["r1", "r2"]);
        assert_eq!(g.errors[&Trajectory::Familiar].error, vec![1.0, 3.0]);
        let c = &g.likelihood[&Trajectory::Familiar][&Phase::PauseA];
        assert_abs_diff_eq!(c[1], 0.75);
        assert!(c[0].is_nan());
        assert!(g.likelihood[&Trajectory::Shortcut][&Phase::Phase3].iter().all(|v| v.is_nan()));
    }
}
