//! Time-stamped signals: spike trains, analog signals and position.
//!
//! All timestamps are in seconds.  Spike trains and analog signals are kept
//! sorted by time so every slice is two binary searches.
use crate::epoch::Epoch;
use crate::error::{Error, Result};
use crate::filter::{gaussian_kernel, smooth_columns_inplace, DEFAULT_N_STD};
use ndarray::{Array1, Array2, ArrayView1, Axis};

// ── SpikeTrain ────────────────────────────────────────────────────────────────

/// Spike times of one recorded neuron.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeTrain {
    label: String,
    times: Vec<f64>,
}

impl SpikeTrain {
    /// Build a spike train, sorting the times.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedInput`] if any spike time is not finite.
    pub fn new(label: impl Into<String>, times: Vec<f64>) -> Result<Self> {
        let label = label.into();
        if let Some(i) = times.iter().position(|t| !t.is_finite()) {
            return Err(Error::malformed(
                format!("spike train '{label}'"),
                format!("spike {i} is not finite"),
            ));
        }
        let mut times = times;
        times.sort_by(f64::total_cmp);
        Ok(Self { label, times })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    #[inline]
    pub fn n_spikes(&self) -> usize {
        self.times.len()
    }

    /// Spikes inside the closed window `[t0, t1]`.
    pub fn time_slice(&self, t0: f64, t1: f64) -> &[f64] {
        let lo = self.times.partition_point(|&t| t < t0);
        let hi = self.times.partition_point(|&t| t <= t1);
        if lo >= hi { &[] } else { &self.times[lo..hi] }
    }

    /// Spikes falling inside any interval of `epoch`.
    pub fn restrict(&self, epoch: &Epoch) -> SpikeTrain {
        let times = self.times.iter().copied().filter(|&t| epoch.contains(t)).collect();
        SpikeTrain { label: self.label.clone(), times }
    }

    /// Mean firing rate over `duration` seconds; `None` for a non-positive
    /// duration.
    pub fn mean_rate(&self, duration: f64) -> Option<f64> {
        (duration > 0.0).then(|| self.n_spikes() as f64 / duration)
    }

    /// Histogram of spike counts over contiguous `edges` (`edges.len() - 1`
    /// bins, each `[edge_i, edge_{i+1})`, the last one closed).
    pub fn histogram(&self, edges: &[f64]) -> Vec<f64> {
        let n_bins = edges.len().saturating_sub(1);
        let mut counts = vec![0.0; n_bins];
        if n_bins == 0 {
            return counts;
        }
        let last_edge = edges[n_bins];
        for &t in self.time_slice(edges[0], last_edge) {
            let idx = edges.partition_point(|&e| e <= t);
            let bin = if t == last_edge { n_bins - 1 } else { idx - 1 };
            counts[bin] += 1.0;
        }
        counts
    }
}

// ── AnalogSignal ─────────────────────────────────────────────────────────────

/// Regularly or irregularly sampled multi-channel signal.
///
/// `data` is `[T, C]`: one row per timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogSignal {
    time: Vec<f64>,
    data: Array2<f64>,
}

impl AnalogSignal {
    /// # Errors
    ///
    /// [`Error::MalformedInput`] if the row count differs from the number of
    /// timestamps or the timestamps are not non-decreasing.
    pub fn new(time: Vec<f64>, data: Array2<f64>) -> Result<Self> {
        if time.len() != data.nrows() {
            return Err(Error::malformed(
                "analog signal",
                format!("{} timestamps but {} rows", time.len(), data.nrows()),
            ));
        }
        if time.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err(Error::malformed("analog signal", "timestamps are not sorted"));
        }
        Ok(Self { time, data })
    }

    /// Single-channel convenience constructor.
    pub fn from_channel(time: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        let n = values.len();
        let data = Array2::from_shape_vec((n, 1), values)?;
        Self::new(time, data)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.time.len()
    }

    #[inline]
    pub fn n_channels(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Channel `c` across all samples.
    pub fn channel(&self, c: usize) -> ArrayView1<'_, f64> {
        self.data.column(c)
    }

    fn select_rows(&self, rows: &[usize]) -> AnalogSignal {
        AnalogSignal {
            time: rows.iter().map(|&i| self.time[i]).collect(),
            data: self.data.select(Axis(0), rows),
        }
    }

    /// Samples inside the closed window `[t0, t1]`.
    pub fn time_slice(&self, t0: f64, t1: f64) -> AnalogSignal {
        let lo = self.time.partition_point(|&t| t < t0);
        let hi = self.time.partition_point(|&t| t <= t1).max(lo);
        let rows: Vec<usize> = (lo..hi).collect();
        self.select_rows(&rows)
    }

    /// Samples whose timestamp lies inside any interval of `epoch`.
    pub fn restrict(&self, epoch: &Epoch) -> AnalogSignal {
        let rows: Vec<usize> = (0..self.n_samples())
            .filter(|&i| epoch.contains(self.time[i]))
            .collect();
        self.select_rows(&rows)
    }

    /// Index of the sample nearest in time to `t` (earlier sample on ties).
    pub fn nearest_index(&self, t: f64) -> Option<usize> {
        if self.time.is_empty() || !t.is_finite() {
            return None;
        }
        let idx = self.time.partition_point(|&s| s < t);
        if idx == 0 {
            return Some(0);
        }
        if idx == self.time.len() {
            return Some(idx - 1);
        }
        let before = t - self.time[idx - 1];
        let after = self.time[idx] - t;
        Some(if after < before { idx } else { idx - 1 })
    }

    /// Row nearest in time to `t`.
    pub fn nearest(&self, t: f64) -> Option<ArrayView1<'_, f64>> {
        self.nearest_index(t).map(|i| self.data.row(i))
    }

    /// Median sample spacing, `None` with fewer than two samples.
    pub fn median_dt(&self) -> Option<f64> {
        let mut dts: Vec<f64> = self.time.windows(2).map(|w| w[1] - w[0]).collect();
        if dts.is_empty() {
            return None;
        }
        dts.sort_by(f64::total_cmp);
        let n = dts.len();
        Some(if n % 2 == 1 { dts[n / 2] } else { 0.5 * (dts[n / 2 - 1] + dts[n / 2]) })
    }
}

// ── Position ─────────────────────────────────────────────────────────────────

/// Animal position: one channel (linearised) or two (x, y).
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    signal: AnalogSignal,
}

impl Position {
    pub fn new(signal: AnalogSignal) -> Result<Self> {
        if !(1..=2).contains(&signal.n_channels()) {
            return Err(Error::malformed(
                "position",
                format!("expected 1 or 2 channels, got {}", signal.n_channels()),
            ));
        }
        Ok(Self { signal })
    }

    /// Linearised (1-D) position.
    pub fn linear(time: Vec<f64>, x: Vec<f64>) -> Result<Self> {
        Self::new(AnalogSignal::from_channel(time, x)?)
    }

    pub fn signal(&self) -> &AnalogSignal {
        &self.signal
    }

    pub fn time(&self) -> &[f64] {
        self.signal.time()
    }

    /// First coordinate (the linear position for a 1-D signal).
    pub fn x(&self) -> ArrayView1<'_, f64> {
        self.signal.channel(0)
    }

    pub fn restrict(&self, epoch: &Epoch) -> Position {
        Position { signal: self.signal.restrict(epoch) }
    }

    pub fn time_slice(&self, t0: f64, t1: f64) -> Position {
        Position { signal: self.signal.time_slice(t0, t1) }
    }

    /// Euclidean distance between consecutive samples.
    fn step_distances(&self) -> Vec<f64> {
        let data = self.signal.data();
        (1..data.nrows())
            .map(|i| {
                let diff = &data.row(i) - &data.row(i - 1);
                diff.dot(&diff).sqrt()
            })
            .collect()
    }

    /// Instantaneous speed in units per second, Gaussian-smoothed with a
    /// standard deviation of `t_smooth` seconds (`0.0` disables smoothing).
    ///
    /// The first sample has speed 0; a zero time step contributes speed 0.
    pub fn speed(&self, t_smooth: f64) -> AnalogSignal {
        let n = self.signal.n_samples();
        let time = self.signal.time();
        let mut speed = Array1::<f64>::zeros(n);
        for (i, d) in self.step_distances().into_iter().enumerate() {
            let dt = time[i + 1] - time[i];
            speed[i + 1] = if dt > 0.0 { d / dt } else { 0.0 };
        }
        let mut data = speed.insert_axis(Axis(1));
        if let Some(dt) = self.signal.median_dt().filter(|&dt| dt > 0.0) {
            let h = gaussian_kernel(t_smooth / dt, DEFAULT_N_STD);
            smooth_columns_inplace(&mut data, &h);
        }
        AnalogSignal { time: time.to_vec(), data }
    }

    /// Epochs where the smoothed speed is at least `threshold`.
    ///
    /// Each run of consecutive above-threshold samples becomes one interval
    /// from its first to its last timestamp.
    pub fn running_epochs(&self, threshold: f64, t_smooth: f64) -> Epoch {
        let speed = self.speed(t_smooth);
        let time = speed.time();
        let values = speed.channel(0);
        let mut starts = Vec::new();
        let mut stops = Vec::new();
        let mut run_start: Option<usize> = None;
        for i in 0..time.len() {
            let running = values[i] >= threshold;
            match (running, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(s)) => {
                    starts.push(time[s]);
                    stops.push(time[i - 1]);
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = run_start {
            starts.push(time[s]);
            stops.push(time[time.len() - 1]);
        }
        // Timestamps are sorted and finite, so this cannot fail.
        Epoch::from_pairs(&starts, &stops).unwrap_or_default()
    }
}
