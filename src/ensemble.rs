//! Neuron ensembles, tuning-curve sets and place-field ordering.
use crate::epoch::Epoch;
use crate::error::{Error, Result};
use crate::signal::SpikeTrain;
use ndarray::{Array2, ArrayView1};
use tracing::debug;

/// The spike trains of one session, in a fixed order shared with every
/// tuning-curve matrix of that session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NeuronEnsemble {
    trains: Vec<SpikeTrain>,
}

impl NeuronEnsemble {
    pub fn new(trains: Vec<SpikeTrain>) -> Self {
        Self { trains }
    }

    pub fn trains(&self) -> &[SpikeTrain] {
        &self.trains
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.trains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }

    /// Keep neurons whose mean rate over `window` is at most `max_rate` and
    /// which fire at least `min_spikes` spikes inside it.
    ///
    /// Returns the filtered ensemble and the original indices that were kept,
    /// so tuning-curve rows can be selected to match.  An empty `window`
    /// keeps nothing.
    pub fn filter_by_rate(
        &self,
        window: &Epoch,
        max_rate: f64,
        min_spikes: usize,
    ) -> (NeuronEnsemble, Vec<usize>) {
        let duration = window.merge().total_duration();
        let mut kept = Vec::new();
        let mut trains = Vec::new();
        for (i, train) in self.trains.iter().enumerate() {
            let inside = train.restrict(window);
            let keep = match inside.mean_rate(duration) {
                Some(rate) => rate <= max_rate && inside.n_spikes() >= min_spikes,
                None => false,
            };
            if keep {
                kept.push(i);
                trains.push(train.clone());
            }
        }
        debug!(
            total = self.len(),
            kept = kept.len(),
            "filtered ensemble by firing rate"
        );
        (NeuronEnsemble { trains }, kept)
    }
}

/// Firing rate of every neuron over linear-position bins: `[N, B]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningCurves {
    rates: Array2<f64>,
}

impl TuningCurves {
    /// # Errors
    ///
    /// [`Error::BinMismatch`] unless `rates` has exactly `n_bins` columns;
    /// [`Error::MalformedInput`] for negative or non-finite rates.
    pub fn new(rates: Array2<f64>, n_bins: usize) -> Result<Self> {
        if rates.ncols() != n_bins {
            return Err(Error::BinMismatch { expected: n_bins, got: rates.ncols() });
        }
        if rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(Error::malformed("tuning curves", "rates must be finite and non-negative"));
        }
        Ok(Self { rates })
    }

    pub fn rates(&self) -> &Array2<f64> {
        &self.rates
    }

    #[inline]
    pub fn n_neurons(&self) -> usize {
        self.rates.nrows()
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.rates.ncols()
    }

    pub fn neuron(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.rates.row(idx)
    }

    /// Rows for the given neuron indices, in that order.
    pub fn select(&self, neurons: &[usize]) -> TuningCurves {
        TuningCurves { rates: self.rates.select(ndarray::Axis(0), neurons) }
    }

    /// Bin of maximum rate (lowest index on ties); `None` for a silent neuron.
    pub fn peak_bin(&self, idx: usize) -> Option<usize> {
        let row = self.rates.row(idx);
        let mut best: Option<(usize, f64)> = None;
        for (b, &r) in row.iter().enumerate() {
            if best.map_or(true, |(_, m)| r > m) {
                best = Some((b, r));
            }
        }
        best.filter(|&(_, m)| m > 0.0).map(|(b, _)| b)
    }

    /// Check that every set in `sets` has this set's shape.
    pub fn ensure_compatible<'a, I>(&self, sets: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a TuningCurves>,
    {
        for other in sets {
            if other.n_bins() != self.n_bins() {
                return Err(Error::BinMismatch { expected: self.n_bins(), got: other.n_bins() });
            }
            if other.n_neurons() != self.n_neurons() {
                return Err(Error::malformed(
                    "tuning curves",
                    format!("{} neurons vs {}", other.n_neurons(), self.n_neurons()),
                ));
            }
        }
        Ok(())
    }
}

/// Canonical place-field order of an ensemble for one trajectory.
///
/// Neurons are ranked by the bin of their tuning-curve peak (ascending,
/// ensemble index breaks ties).  Neurons without a field on the trajectory
/// have no rank and are ignored by the correlation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    /// Ensemble indices, sorted by preferred position.
    order: Vec<usize>,
    /// `rank[i]` = position of ensemble neuron `i` in `order`.
    rank: Vec<Option<usize>>,
}

impl PlaceOrder {
    pub fn from_tuning_curves(tc: &TuningCurves) -> Self {
        let mut peaks: Vec<(usize, usize)> = (0..tc.n_neurons())
            .filter_map(|i| tc.peak_bin(i).map(|b| (b, i)))
            .collect();
        peaks.sort_unstable();
        let order: Vec<usize> = peaks.into_iter().map(|(_, i)| i).collect();
        let mut rank = vec![None; tc.n_neurons()];
        for (r, &i) in order.iter().enumerate() {
            rank[i] = Some(r);
        }
        Self { order, rank }
    }

    /// Ensemble indices in preferred-position order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Place rank of ensemble neuron `neuron`.
    pub fn rank_of(&self, neuron: usize) -> Option<usize> {
        self.rank.get(neuron).copied().flatten()
    }

    /// Number of neurons with a place field.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Size of the ensemble this order was built for.
    pub fn ensemble_size(&self) -> usize {
        self.rank.len()
    }
}
