//! Analysis configuration.
//!
//! [`AnalysisConfig`] holds every tunable parameter of the replay and
//! decoding pipeline.  The defaults are the values that define compatible
//! results across sessions; change them only deliberately.
use crate::error::{Error, Result};
use crate::stats::PercentileKind;
use serde::Deserialize;
use std::path::Path;

/// Configuration for the replay-detection and decoding pipeline.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use swrdecode::AnalysisConfig;
///
/// let cfg = AnalysisConfig {
///     n_shuffles: 200,   // quicker significance test
///     seed:       7,
///     ..AnalysisConfig::default()
/// };
/// assert_eq!(cfg.significant, 5.0);
/// ```
///
/// A JSON file may override any subset of fields, see
/// [`AnalysisConfig::from_json_file`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Two-tailed significance threshold, in percentile units.
    ///
    /// An event replays a trajectory when its percentile is
    /// `≤ significant` or `≥ 100 − significant`.
    ///
    /// Default: `5.0`.
    pub significant: f64,

    /// Number of template permutations in the shuffle test.
    ///
    /// The null vector has `n_shuffles + 1` entries (entry 0 is the observed
    /// correlation).  Use [`AnalysisConfig::fast`] for a 2-shuffle smoke run.
    ///
    /// Default: `1000`.
    pub n_shuffles: usize,

    /// Minimum number of distinct neurons active in an event for the rank
    /// correlation to be computed.
    ///
    /// Default: `4`.
    pub min_n_active: usize,

    /// Tie convention of the percentile-of-score.
    ///
    /// Default: [`PercentileKind::Rank`].
    pub percentile_kind: PercentileKind,

    /// Step between decoding bins in seconds.
    ///
    /// Default: `0.01` s.
    pub decoding_dt: f64,

    /// Width of the spike-count window around each decoding bin in seconds.
    ///
    /// Must be a whole multiple of [`decoding_dt`](Self::decoding_dt).
    ///
    /// Default: `0.05` s.
    pub decoding_window: f64,

    /// Standard deviation (seconds) of the Gaussian applied to binned spike
    /// counts before decoding.  `0.0` disables smoothing.
    ///
    /// Default: `0.0075` s.
    pub counts_gaussian: f64,

    /// Minimum number of active neurons in a decoding bin.
    ///
    /// Default: `2`.
    pub min_decoding_neurons: usize,

    /// Minimum total spike count in a decoding bin.
    ///
    /// Default: `2`.
    pub min_decoding_spikes: usize,

    /// Number of linear-position bins for tuning curves and posteriors.
    ///
    /// Default: `100`.
    pub n_position_bins: usize,

    /// Length of the linearised track (same units as position).
    ///
    /// Position bins are `track_length / n_position_bins` wide.
    ///
    /// Default: `100.0`.
    pub track_length: f64,

    /// Speed (position units per second) above which the animal counts as
    /// running.
    ///
    /// Default: `0.4`.
    pub speed_threshold: f64,

    /// Gaussian smoothing (seconds) applied to speed before thresholding.
    ///
    /// Default: `0.5` s.
    pub speed_smoothing: f64,

    /// Gaussian smoothing of tuning curves across position bins, in bins.
    /// `0.0` disables smoothing.
    ///
    /// Default: `1.0`.
    pub tc_gaussian: f64,

    /// Candidate SWRs shorter than this (seconds) are discarded after
    /// merging.  `0.0` keeps every candidate.
    ///
    /// Default: `0.0` s.
    pub min_swr_duration: f64,

    /// Neurons with a session mean rate above this (Hz) are excluded
    /// (putative interneurons).
    ///
    /// Default: `5.0` Hz.
    pub max_mean_rate: f64,

    /// Neurons with fewer spikes than this over the session are excluded.
    ///
    /// Default: `100`.
    pub min_n_spikes: usize,

    /// Seed of the shuffle RNG.  Each session derives its own stream from
    /// this seed and its position in the declared session list.
    ///
    /// Default: `0`.
    pub seed: u64,
}

impl Default for AnalysisConfig {
    /// Returns the analysis configuration used for published results:
    /// 1000 shuffles · 5 % two-tailed · 10 ms / 50 ms decoding · 100 bins.
    fn default() -> Self {
        Self {
            significant: 5.0,
            n_shuffles: 1000,
            min_n_active: 4,
            percentile_kind: PercentileKind::Rank,
            decoding_dt: 0.01,
            decoding_window: 0.05,
            counts_gaussian: 0.0075,
            min_decoding_neurons: 2,
            min_decoding_spikes: 2,
            n_position_bins: 100,
            track_length: 100.0,
            speed_threshold: 0.4,
            speed_smoothing: 0.5,
            tc_gaussian: 1.0,
            min_swr_duration: 0.0,
            max_mean_rate: 5.0,
            min_n_spikes: 100,
            seed: 0,
        }
    }
}

impl AnalysisConfig {
    /// The default configuration with the shuffle test reduced to 2
    /// permutations, for smoke runs.
    pub fn fast() -> Self {
        Self { n_shuffles: 2, ..Self::default() }
    }

    /// Load overrides from a JSON object; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let cfg: AnalysisConfig = serde_json::from_slice(&bytes)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Number of `decoding_dt` bins summed into one decoding window.
    ///
    /// # Examples
    ///
    /// ```
    /// use swrdecode::AnalysisConfig;
    /// assert_eq!(AnalysisConfig::default().n_window_bins(), 5);
    /// ```
    pub fn n_window_bins(&self) -> usize {
        ((self.decoding_window / self.decoding_dt).round() as usize).max(1)
    }

    /// Width of one position bin.
    pub fn position_binsize(&self) -> f64 {
        self.track_length / self.n_position_bins as f64
    }

    /// Position bin edges, `n_position_bins + 1` values from 0 to
    /// `track_length`.
    pub fn position_edges(&self) -> Vec<f64> {
        let w = self.position_binsize();
        (0..=self.n_position_bins).map(|i| i as f64 * w).collect()
    }

    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if !(0.0..50.0).contains(&self.significant) {
            return fail("significant must be in [0, 50)");
        }
        if !(self.decoding_dt > 0.0) {
            return fail("decoding_dt must be positive");
        }
        if !(self.decoding_window >= self.decoding_dt) {
            return fail("decoding_window must be at least decoding_dt");
        }
        let ratio = self.decoding_window / self.decoding_dt;
        if (ratio - ratio.round()).abs() > 1e-6 {
            return fail("decoding_window must be a whole multiple of decoding_dt");
        }
        if !(self.counts_gaussian >= 0.0) || !(self.tc_gaussian >= 0.0) {
            return fail("smoothing widths must be non-negative");
        }
        if self.n_position_bins == 0 || !(self.track_length > 0.0) {
            return fail("position binning must be non-empty");
        }
        if self.min_n_active < 2 {
            return fail("min_n_active must be at least 2");
        }
        Ok(())
    }
}
