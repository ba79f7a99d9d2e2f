//! Gaussian smoothing of binned signals.
//!
//! - [`design`]: unit-gain Gaussian kernels, matching `scipy.signal.gaussian`
//!   normalised to sum 1.
//! - [`apply`]: zero-padded `'same'`-mode convolution, matching
//!   `numpy.convolve(..., mode='same')`, with an FFT overlap-add path for
//!   long kernels.

pub mod apply;
pub mod design;

pub use apply::{convolve_same, smooth_columns_inplace};
pub use design::{gaussian_kernel, gaussian_length, gaussian_window, DEFAULT_N_STD};
