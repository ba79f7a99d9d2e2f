//! Smoothing-kernel design matching `scipy.signal.gaussian`.
//!
//! For a standard deviation of `std` samples and a support of `n_std`
//! standard deviations on each side:
//!   • kernel length M = round(2 · n_std · std), at least 1, rounded up to odd
//!   • w[i] = exp(−½ · ((i − (M−1)/2) / std)²)
//!   • normalised so Σ w = 1 (unit DC gain)

/// Number of standard deviations covered on each side by default.
pub const DEFAULT_N_STD: f64 = 5.0;

/// Kernel length for `std` samples and `n_std` standard deviations per side.
/// Always odd so the kernel has a well-defined centre tap.
pub fn gaussian_length(std: f64, n_std: f64) -> usize {
    let n_raw = (2.0 * n_std * std).round().max(1.0) as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Unnormalised Gaussian window of length `m` (`scipy.signal.gaussian(m, std)`).
pub fn gaussian_window(m: usize, std: f64) -> Vec<f64> {
    if m == 0 {
        return vec![];
    }
    let centre = (m - 1) as f64 / 2.0;
    (0..m)
        .map(|i| {
            let x = (i as f64 - centre) / std;
            (-0.5 * x * x).exp()
        })
        .collect()
}

/// Design a unit-gain Gaussian smoothing kernel.
///
/// `std` is in samples.  A non-positive or non-finite `std` returns the
/// identity kernel `[1.0]`.
pub fn gaussian_kernel(std: f64, n_std: f64) -> Vec<f64> {
    if !(std > 0.0) || !std.is_finite() {
        return vec![1.0];
    }
    let m = gaussian_length(std, n_std);
    let mut h = gaussian_window(m, std);
    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);
    h
}
