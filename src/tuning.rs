//! Linear tuning-curve estimation.
//!
//! ```text
//! occupancy[b] = (#position samples in bin b) · dt
//! spikes[n, b] = #spikes of neuron n whose nearest position sample is in b
//! rate[n, b]   = spikes[n, b] / occupancy[b]     (0 where occupancy is 0)
//! ```
//!
//! Only samples and spikes inside the running epoch contribute.  Rates are
//! optionally smoothed across bins with a unit-gain Gaussian.
use crate::config::AnalysisConfig;
use crate::ensemble::{NeuronEnsemble, TuningCurves};
use crate::epoch::Epoch;
use crate::error::{Error, Result};
use crate::filter::{convolve_same, gaussian_kernel, DEFAULT_N_STD};
use crate::signal::Position;
use ndarray::{Array1, Array2, ArrayView1};

/// Bin index of `x` over `edges`; values on the last edge fall in the last
/// bin, values outside the edges have no bin.
pub fn position_bin(x: f64, edges: &[f64]) -> Option<usize> {
    let n_bins = edges.len().checked_sub(1)?;
    if n_bins == 0 || !(x >= edges[0] && x <= edges[n_bins]) {
        return None;
    }
    if x == edges[n_bins] {
        return Some(n_bins - 1);
    }
    Some(edges.partition_point(|&e| e <= x) - 1)
}

/// Time spent in each position bin, in seconds.
pub fn occupancy(position: &Position, edges: &[f64]) -> Array1<f64> {
    let n_bins = edges.len().saturating_sub(1);
    let mut occ = Array1::<f64>::zeros(n_bins);
    let dt = position.signal().median_dt().unwrap_or(0.0);
    for &x in position.x().iter() {
        if let Some(b) = position_bin(x, edges) {
            occ[b] += dt;
        }
    }
    occ
}

/// Estimate `[N, B]` tuning curves from a linearised position.
///
/// # Errors
///
/// [`Error::MalformedInput`] if `position` is not one-dimensional.
pub fn linear_tuning_curves(
    ensemble: &NeuronEnsemble,
    position: &Position,
    run_epoch: &Epoch,
    cfg: &AnalysisConfig,
) -> Result<TuningCurves> {
    if position.signal().n_channels() != 1 {
        return Err(Error::malformed("position", "tuning curves need a linearised position"));
    }
    let edges = cfg.position_edges();
    let n_bins = cfg.n_position_bins;
    let run_position = position.restrict(run_epoch);
    let occ = occupancy(&run_position, &edges);

    let mut rates = Array2::<f64>::zeros((ensemble.len(), n_bins));
    for (n, train) in ensemble.trains().iter().enumerate() {
        let mut counts = Array1::<f64>::zeros(n_bins);
        for &t in train.restrict(run_epoch).times() {
            let Some(row) = run_position.signal().nearest(t) else { continue };
            if let Some(b) = position_bin(row[0], &edges) {
                counts[b] += 1.0;
            }
        }
        let row = occupancy_normalise(counts.view(), occ.view());
        rates.row_mut(n).assign(&smooth_bins(row, cfg.tc_gaussian));
    }
    TuningCurves::new(rates, n_bins)
}

fn occupancy_normalise(counts: ArrayView1<'_, f64>, occ: ArrayView1<'_, f64>) -> Array1<f64> {
    Array1::from_iter(
        counts
            .iter()
            .zip(occ.iter())
            .map(|(&c, &o)| if o > 0.0 { c / o } else { 0.0 }),
    )
}

fn smooth_bins(row: Array1<f64>, std_bins: f64) -> Array1<f64> {
    let h = gaussian_kernel(std_bins, DEFAULT_N_STD);
    if h.len() <= 1 {
        return row;
    }
    Array1::from(convolve_same(&row.to_vec(), &h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SpikeTrain;

    #[test]
    fn position_bin_edges() {
        let edges = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(position_bin(0.0, &edges), Some(0));
        assert_eq!(position_bin(1.0, &edges), Some(1));
        assert_eq!(position_bin(2.999, &edges), Some(2));
        assert_eq!(position_bin(3.0, &edges), Some(2));
        assert_eq!(position_bin(-0.1, &edges), None);
        assert_eq!(position_bin(f64::NAN, &edges), None);
    }

    #[test]
    fn place_cell_peaks_at_field() {
        // Animal runs 0 → 100 at 10 units/s, sampled at 100 Hz.
        let time: Vec<f64> = (0..1000).map(|i| i as f64 * 0.01).collect();
        let x: Vec<f64> = time.iter().map(|t| t * 10.0).collect();
        let pos = Position::linear(time, x).unwrap();
        // Neuron fires on every sample while x ∈ [40.5, 49.5).
        let spikes: Vec<f64> = (405..495).map(|i| i as f64 * 0.01).collect();
        let ens = NeuronEnsemble::new(vec![SpikeTrain::new("pc", spikes).unwrap()]);
        let run = Epoch::interval(0.0, 10.0).unwrap();
        let cfg = AnalysisConfig { tc_gaussian: 0.0, ..Default::default() };
        let tc = linear_tuning_curves(&ens, &pos, &run, &cfg).unwrap();
        let peak = tc.peak_bin(0).unwrap();
        assert!((40..=49).contains(&peak), "peak at {peak}");
        // 1 spike per 10 ms sample = 100 Hz inside the field.
        approx::assert_abs_diff_eq!(tc.rates()[[0, 45]], 100.0, epsilon = 1e-6);
        assert_eq!(tc.rates()[[0, 10]], 0.0);
    }

    #[test]
    fn unvisited_bins_have_zero_rate() {
        let time: Vec<f64> = (0..100).map(|i| i as f64 * 0.01).collect();
        let x = vec![5.0; 100];
        let pos = Position::linear(time, x).unwrap();
        let ens = NeuronEnsemble::new(vec![SpikeTrain::new("a", vec![0.5]).unwrap()]);
        let run = Epoch::interval(0.0, 1.0).unwrap();
        let cfg = AnalysisConfig { tc_gaussian: 0.0, ..Default::default() };
        let tc = linear_tuning_curves(&ens, &pos, &run, &cfg).unwrap();
        assert!(tc.rates().iter().all(|r| r.is_finite()));
        assert!(tc.rates()[[0, 5]] > 0.0);
        assert_eq!(tc.rates().row(0).iter().filter(|&&r| r > 0.0).count(), 1);
    }
}
