//! Tuning-curve-order correlation with a shuffle significance test.
//!
//! For one event and one trajectory:
//!
//! ```text
//! spikes in [start, stop]  →  this_swr     = place rank of each spike, in time order
//!                             template_swr = sort(this_swr)
//! observed  = spearman(this_swr, template_swr)
//! null[0]   = observed
//! null[k]   = spearman(shuffle(template_swr), template_swr)   k = 1..=n_shuffles
//! percentile = percentileofscore(null, observed)
//! ```
//!
//! An event where fewer than `min_n_active` distinct neurons fire gets NaN
//! everywhere and consumes no randomness.
use crate::config::AnalysisConfig;
use crate::ensemble::{NeuronEnsemble, PlaceOrder};
use crate::epoch::Epoch;
use crate::stats::{percentile_of_score, spearman};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

/// Outcome of the correlation test for one event and one trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct EventCorrelation {
    /// Spearman correlation of firing order against place order; NaN when
    /// the event had too few active neurons.
    pub correlation: f64,
    /// Two-sided p-value of `correlation`; NaN alongside it.
    pub p_value: f64,
    /// Null distribution of length `n_shuffles + 1`; entry 0 is the
    /// observed correlation.  All NaN for an insufficient event.
    pub shuffled: Vec<f64>,
    /// Percentile of `correlation` within `shuffled`.
    pub percentile: f64,
    /// Distinct place-ranked neurons that fired in the event.
    pub n_active: usize,
}

impl EventCorrelation {
    fn insufficient(n_shuffles: usize, n_active: usize) -> Self {
        Self {
            correlation: f64::NAN,
            p_value: f64::NAN,
            shuffled: vec![f64::NAN; n_shuffles + 1],
            percentile: f64::NAN,
            n_active,
        }
    }

    /// `None` when the event had too few active neurons.
    pub fn percentile(&self) -> Option<f64> {
        (!self.percentile.is_nan()).then_some(self.percentile)
    }

    pub fn is_defined(&self) -> bool {
        !self.correlation.is_nan()
    }
}

/// Place ranks of the spikes fired in `[start, stop]`, in firing order.
///
/// Spikes at the same instant are ordered by place rank.  Neurons without a
/// place field on this trajectory do not contribute.
pub fn firing_sequence(
    ensemble: &NeuronEnsemble,
    order: &PlaceOrder,
    start: f64,
    stop: f64,
) -> Vec<usize> {
    let mut spikes: Vec<(f64, usize)> = Vec::new();
    for (idx, train) in ensemble.trains().iter().enumerate() {
        let Some(rank) = order.rank_of(idx) else { continue };
        spikes.extend(train.time_slice(start, stop).iter().map(|&t| (t, rank)));
    }
    spikes.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    spikes.into_iter().map(|(_, r)| r).collect()
}

/// Run the correlation test on one event.
pub fn correlate_event<R: Rng + ?Sized>(
    ensemble: &NeuronEnsemble,
    order: &PlaceOrder,
    start: f64,
    stop: f64,
    cfg: &AnalysisConfig,
    rng: &mut R,
) -> EventCorrelation {
    let sequence = firing_sequence(ensemble, order, start, stop);
    let n_active = sequence.iter().collect::<BTreeSet<_>>().len();
    if n_active < cfg.min_n_active {
        return EventCorrelation::insufficient(cfg.n_shuffles, n_active);
    }

    let this_swr: Vec<f64> = sequence.iter().map(|&r| r as f64).collect();
    let mut template_swr = this_swr.clone();
    template_swr.sort_by(f64::total_cmp);

    let Some(observed) = spearman(&this_swr, &template_swr) else {
        return EventCorrelation::insufficient(cfg.n_shuffles, n_active);
    };

    let mut shuffled = Vec::with_capacity(cfg.n_shuffles + 1);
    shuffled.push(observed.correlation);
    let mut permuted = template_swr.clone();
    for _ in 0..cfg.n_shuffles {
        permuted.copy_from_slice(&template_swr);
        permuted.shuffle(rng);
        let r = spearman(&permuted, &template_swr).map_or(f64::NAN, |s| s.correlation);
        shuffled.push(r);
    }

    let percentile = percentile_of_score(&shuffled, observed.correlation, cfg.percentile_kind);
    EventCorrelation {
        correlation: observed.correlation,
        p_value: observed.p_value,
        shuffled,
        percentile,
        n_active,
    }
}

/// Run the correlation test on every event of `swrs`, in ascending order.
pub fn correlate_events<R: Rng + ?Sized>(
    ensemble: &NeuronEnsemble,
    order: &PlaceOrder,
    swrs: &Epoch,
    cfg: &AnalysisConfig,
    rng: &mut R,
) -> Vec<EventCorrelation> {
    swrs.iter()
        .map(|(start, stop)| correlate_event(ensemble, order, start, stop, cfg, rng))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::TuningCurves;
    use crate::signal::SpikeTrain;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn order_for_peaks(peaks: &[usize]) -> PlaceOrder {
        let mut rates = Array2::<f64>::zeros((peaks.len(), 100));
        for (i, &p) in peaks.iter().enumerate() {
            rates[[i, p]] = 1.0;
        }
        PlaceOrder::from_tuning_curves(&TuningCurves::new(rates, 100).unwrap())
    }

    fn ensemble(spikes: &[&[f64]]) -> NeuronEnsemble {
        NeuronEnsemble::new(
            spikes
                .iter()
                .enumerate()
                .map(|(i, s)| SpikeTrain::new(format!("n{i}"), s.to_vec()).unwrap())
                .collect(),
        )
    }

    #[test]
    fn sequence_follows_firing_time() {
        let ens = ensemble(&[&[0.03], &[0.01], &[0.02]]);
        // Neuron 1 has the earliest field, neuron 0 the latest.
        let order = order_for_peaks(&[90, 10, 50]);
        assert_eq!(firing_sequence(&ens, &order, 0.0, 0.1), vec![2, 0, 1]);
    }

    #[test]
    fn too_few_active_neurons_is_nan() {
        let ens = ensemble(&[&[0.01], &[0.02], &[0.03]]);
        let order = order_for_peaks(&[10, 50, 90]);
        let cfg = AnalysisConfig { n_shuffles: 10, ..Default::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let res = correlate_event(&ens, &order, 0.0, 0.1, &cfg, &mut rng);
        assert!(res.correlation.is_nan());
        assert!(res.p_value.is_nan());
        assert_eq!(res.shuffled.len(), 11);
        assert!(res.shuffled.iter().all(|v| v.is_nan()));
        assert_eq!(res.percentile(), None);
        assert_eq!(res.n_active, 3);
    }

    #[test]
    fn template_order_gives_unit_correlation() {
        let ens = ensemble(&[&[0.01], &[0.02], &[0.03], &[0.04], &[0.05], &[0.06]]);
        let order = order_for_peaks(&[5, 20, 35, 50, 65, 80]);
        let cfg = AnalysisConfig { n_shuffles: 200, ..Default::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let res = correlate_event(&ens, &order, 0.0, 0.1, &cfg, &mut rng);
        approx::assert_abs_diff_eq!(res.correlation, 1.0, epsilon = 1e-12);
        assert_eq!(res.shuffled[0], res.correlation);
        assert!(res.percentile().unwrap() >= 95.0, "percentile {}", res.percentile);
    }

    #[test]
    fn same_seed_same_null() {
        let ens = ensemble(&[&[0.04, 0.01], &[0.02], &[0.05, 0.03], &[0.06]]);
        let order = order_for_peaks(&[5, 20, 35, 50]);
        let cfg = AnalysisConfig { n_shuffles: 50, ..Default::default() };
        let a = correlate_event(&ens, &order, 0.0, 0.1, &cfg, &mut ChaCha8Rng::seed_from_u64(9));
        let b = correlate_event(&ens, &order, 0.0, 0.1, &cfg, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn insufficient_event_consumes_no_randomness() {
        let sparse = ensemble(&[&[0.01]]);
        let order = order_for_peaks(&[10]);
        let cfg = AnalysisConfig { n_shuffles: 5, ..Default::default() };
        let mut used = ChaCha8Rng::seed_from_u64(1);
        let _ = correlate_event(&sparse, &order, 0.0, 0.1, &cfg, &mut used);
        let mut fresh = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(used.gen::<u64>(), fresh.gen::<u64>());
    }
}
