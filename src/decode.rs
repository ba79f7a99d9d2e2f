//! Bayesian position decoding from ensemble spike counts.
//!
//! ```text
//! spikes ─► counts[t, n]        histogram at decoding_dt
//!        ─► window sum          n_window_bins bins, centred
//!        ─► gaussian smooth     std = counts_gaussian / decoding_dt bins
//!        ─► log L[t, b] = Σₙ c[t,n] · ln(λ[n,b]·τ) − λ[n,b]·τ      τ = decoding_window
//!        ─► P[t, b]     = exp(log L − max_b log L) / Σ_b (…)
//!        ─► decoded[t]  = argmax_b P[t, b]          (lowest bin on ties)
//! ```
//!
//! A bin is valid when its windowed counts have at least
//! `min_decoding_neurons` active neurons and `min_decoding_spikes` spikes in
//! total.  [`bayesian_posterior`] marks invalid bins with a NaN row;
//! [`decode_epoch`] drops them, so its posterior holds valid rows only.
use crate::config::AnalysisConfig;
use crate::ensemble::{NeuronEnsemble, TuningCurves};
use crate::epoch::Epoch;
use crate::error::{Error, Result};
use crate::filter::{gaussian_kernel, smooth_columns_inplace, DEFAULT_N_STD};
use crate::signal::AnalogSignal;
use crate::stats::nan_mean_rows;
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};
use tracing::debug;

// ── Spike counts ─────────────────────────────────────────────────────────────

/// Spike counts of every neuron over `[t0, t1]`, summed over the decoding
/// window and smoothed: an `[T, N]` signal whose timestamps are bin centres.
///
/// Also returns the per-bin validity computed from the unsmoothed windowed
/// counts.
pub fn bin_counts(
    ensemble: &NeuronEnsemble,
    t0: f64,
    t1: f64,
    cfg: &AnalysisConfig,
) -> Result<(AnalogSignal, Vec<bool>)> {
    let dt = cfg.decoding_dt;
    let n_time = if t1 >= t0 { (((t1 - t0) / dt) - 1e-9).ceil().max(1.0) as usize } else { 0 };
    let edges: Vec<f64> = (0..=n_time).map(|i| t0 + i as f64 * dt).collect();
    let time: Vec<f64> = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();

    let mut counts = Array2::<f64>::zeros((n_time, ensemble.len()));
    for (n, train) in ensemble.trains().iter().enumerate() {
        let hist = train.histogram(&edges);
        counts.column_mut(n).assign(&ArrayView1::from(&hist));
    }

    smooth_columns_inplace(&mut counts, &vec![1.0; cfg.n_window_bins()]);
    let valid: Vec<bool> = counts
        .rows()
        .into_iter()
        .map(|row| {
            let active = row.iter().filter(|&&c| c > 0.5).count();
            let total: f64 = row.sum();
            active >= cfg.min_decoding_neurons && total + 0.5 >= cfg.min_decoding_spikes as f64
        })
        .collect();

    let h = gaussian_kernel(cfg.counts_gaussian / dt, DEFAULT_N_STD);
    smooth_columns_inplace(&mut counts, &h);
    Ok((AnalogSignal::new(time, counts)?, valid))
}

// ── Posterior ────────────────────────────────────────────────────────────────

/// Posterior over position bins for each decoding bin: `[T, B]`.
///
/// Rows of invalid bins are NaN; valid rows sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Posterior {
    time: Vec<f64>,
    prob: Array2<f64>,
    valid: Vec<bool>,
}

impl Posterior {
    pub fn empty(n_bins: usize) -> Self {
        Self { time: Vec::new(), prob: Array2::zeros((0, n_bins)), valid: Vec::new() }
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn prob(&self) -> &Array2<f64> {
        &self.prob
    }

    pub fn valid(&self) -> &[bool] {
        &self.valid
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn n_bins(&self) -> usize {
        self.prob.ncols()
    }

    pub fn n_valid(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Decoding bins whose centre lies in `[t0, t1]`.
    pub fn time_slice(&self, t0: f64, t1: f64) -> Posterior {
        let lo = self.time.partition_point(|&t| t < t0);
        let hi = self.time.partition_point(|&t| t <= t1).max(lo);
        Posterior {
            time: self.time[lo..hi].to_vec(),
            prob: self.prob.slice(ndarray::s![lo..hi, ..]).to_owned(),
            valid: self.valid[lo..hi].to_vec(),
        }
    }

    /// NaN-aware mean of the valid rows in `[t0, t1]`; all NaN if none.
    pub fn mean_over(&self, t0: f64, t1: f64) -> Array1<f64> {
        let part = self.time_slice(t0, t1);
        let rows = part
            .prob
            .rows()
            .into_iter()
            .zip(&part.valid)
            .filter(|(_, v)| **v)
            .map(|(r, _)| r);
        nan_mean_rows(rows, self.n_bins())
    }

    /// The valid rows and their times.
    pub fn valid_only(&self) -> Posterior {
        let keep: Vec<usize> = (0..self.len()).filter(|&i| self.valid[i]).collect();
        Posterior {
            time: keep.iter().map(|&i| self.time[i]).collect(),
            prob: self.prob.select(Axis(0), &keep),
            valid: vec![true; keep.len()],
        }
    }

    /// Concatenate posteriors decoded over consecutive windows.
    fn concat(parts: Vec<Posterior>, n_bins: usize) -> Result<Posterior> {
        if parts.is_empty() {
            return Ok(Posterior::empty(n_bins));
        }
        let views: Vec<_> = parts.iter().map(|p| p.prob.view()).collect();
        let prob = concatenate(Axis(0), &views)?;
        let time = parts.iter().flat_map(|p| p.time.iter().copied()).collect();
        let valid = parts.iter().flat_map(|p| p.valid.iter().copied()).collect();
        Ok(Posterior { time, prob, valid })
    }
}

/// Posterior for every row of `counts` (`[T, N]`, windowed and smoothed).
///
/// # Errors
///
/// [`Error::MalformedInput`] when the number of count channels differs from
/// the number of tuning-curve rows, or `valid` has the wrong length.
pub fn bayesian_posterior(
    counts: &AnalogSignal,
    valid: &[bool],
    tuning: &TuningCurves,
    cfg: &AnalysisConfig,
) -> Result<Posterior> {
    if counts.n_channels() != tuning.n_neurons() {
        return Err(Error::malformed(
            "decoder",
            format!("{} spike trains vs {} tuning curves", counts.n_channels(), tuning.n_neurons()),
        ));
    }
    if valid.len() != counts.n_samples() {
        return Err(Error::malformed("decoder", "validity mask length differs from time bins"));
    }
    let tau = cfg.decoding_window;
    let expected = tuning.rates().mapv(|r| (r * tau).max(f64::EPSILON));
    let log_expected = expected.mapv(f64::ln);
    let expected_sum = expected.sum_axis(Axis(0));

    let mut prob = counts.data().dot(&log_expected);
    let mut valid = valid.to_vec();
    for (mut row, ok) in prob.rows_mut().into_iter().zip(valid.iter_mut()) {
        row -= &expected_sum;
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        if !*ok || !max.is_finite() {
            *ok = false;
            row.fill(f64::NAN);
            continue;
        }
        row.mapv_inplace(|v| (v - max).exp());
        let total = row.sum();
        if total > 0.0 && total.is_finite() {
            row /= total;
        } else {
            *ok = false;
            row.fill(f64::NAN);
        }
    }
    Ok(Posterior { time: counts.time().to_vec(), prob, valid })
}

/// Decode every interval of `epoch` and concatenate the posteriors.
///
/// Bins without a valid posterior are dropped, not filled in.
///
/// # Errors
///
/// [`Error::BinMismatch`] if `tuning` does not have `n_position_bins`
/// columns; see [`bayesian_posterior`] for the rest.
pub fn decode_epoch(
    ensemble: &NeuronEnsemble,
    tuning: &TuningCurves,
    epoch: &Epoch,
    cfg: &AnalysisConfig,
) -> Result<Posterior> {
    if tuning.n_bins() != cfg.n_position_bins {
        return Err(Error::BinMismatch { expected: cfg.n_position_bins, got: tuning.n_bins() });
    }
    let mut parts = Vec::with_capacity(epoch.len());
    for (start, stop) in epoch.iter() {
        let (counts, valid) = bin_counts(ensemble, start, stop, cfg)?;
        parts.push(bayesian_posterior(&counts, &valid, tuning, cfg)?);
    }
    let all = Posterior::concat(parts, tuning.n_bins())?;
    let posterior = all.valid_only();
    debug!(intervals = epoch.len(), bins = all.len(), valid = posterior.len(), "decoded epoch");
    Ok(posterior)
}

// ── Decoded position ─────────────────────────────────────────────────────────

/// Maximum-a-posteriori position of every valid decoding bin.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedPosition {
    pub time: Vec<f64>,
    pub bin: Vec<usize>,
    /// Centre of the decoded bin in position units.
    pub x: Vec<f64>,
}

impl DecodedPosition {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Index of the largest finite entry, lowest index on ties.
pub fn argmax(row: ArrayView1<'_, f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in row.iter().enumerate() {
        if v.is_finite() && best.map_or(true, |(_, m)| v > m) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// MAP decode of `posterior`; invalid bins are dropped.
pub fn decode_location(posterior: &Posterior, cfg: &AnalysisConfig) -> DecodedPosition {
    let binsize = cfg.position_binsize();
    let mut out = DecodedPosition::default();
    let rows = posterior.prob.rows().into_iter().zip(&posterior.time).zip(&posterior.valid);
    for ((row, &t), &ok) in rows {
        if !ok {
            continue;
        }
        if let Some(b) = argmax(row) {
            out.time.push(t);
            out.bin.push(b);
            out.x.push((b as f64 + 0.5) * binsize);
        }
    }
    out
}
