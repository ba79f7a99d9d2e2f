//! Overlap-add linear convolution with `'same'`-mode output.
//!
//! Matches `numpy.convolve(x, h, mode='same')` for odd-length kernels:
//! the signal is implicitly zero-padded, the full convolution of length
//! `n_x + n_h − 1` is formed, and the centred `n_x` samples are kept
//! (offset `(n_h − 1) / 2`).
//!
//! Short kernels are applied directly; longer ones go through FFT blocks.
use ndarray::{Array2, ArrayView1, Axis};
use rustfft::{num_complex::Complex, FftPlanner};

/// Kernels up to this many taps are applied by direct summation.
const DIRECT_MAX_TAPS: usize = 64;

/// Convolve a single 1-D signal with `h`, returning `x.len()` samples.
pub fn convolve_same(x: &[f64], h: &[f64]) -> Vec<f64> {
    let n_x = x.len();
    let n_h = h.len();
    if n_x == 0 || n_h == 0 {
        return vec![0.0; n_x];
    }
    let full = if n_h <= DIRECT_MAX_TAPS {
        convolve_direct(x, h)
    } else {
        convolve_overlap_add(x, h)
    };
    let offset = (n_h - 1) / 2;
    full[offset..offset + n_x].to_vec()
}

/// Smooth every column of `data` (`[T, C]`, time along rows) in place.
pub fn smooth_columns_inplace(data: &mut Array2<f64>, h: &[f64]) {
    if h.len() <= 1 {
        return;
    }
    for mut col in data.axis_iter_mut(Axis(1)) {
        let x: Vec<f64> = col.to_vec();
        let y = convolve_same(&x, h);
        col.assign(&ArrayView1::from(&y));
    }
}

fn convolve_direct(x: &[f64], h: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; x.len() + h.len() - 1];
    for (i, &xv) in x.iter().enumerate() {
        if xv == 0.0 {
            continue;
        }
        for (k, &hv) in h.iter().enumerate() {
            out[i + k] += xv * hv;
        }
    }
    out
}

fn convolve_overlap_add(x: &[f64], h: &[f64]) -> Vec<f64> {
    let n_x = x.len();
    let n_h = h.len();
    let n_out = n_x + n_h - 1;

    let n_fft = choose_fft_len(n_h, n_x);
    let h_fft = fft_of_h(h, n_fft);

    let n_seg = n_fft - n_h + 1;
    let n_segments = n_x.div_ceil(n_seg);
    let mut out = vec![0.0_f64; n_out];

    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fft_fwd = planner.plan_fft_forward(n_fft);
    let fft_inv = planner.plan_fft_inverse(n_fft);
    let inv_scale = 1.0 / n_fft as f64;

    for seg_idx in 0..n_segments {
        let start = seg_idx * n_seg;
        let stop = (start + n_seg).min(n_x);

        let mut buf: Vec<Complex<f64>> = x[start..stop]
            .iter()
            .map(|&v| Complex { re: v, im: 0.0 })
            .chain(std::iter::repeat(Complex::default()))
            .take(n_fft)
            .collect();

        fft_fwd.process(&mut buf);
        for (b, &hf) in buf.iter_mut().zip(h_fft.iter()) {
            *b *= hf;
        }
        fft_inv.process(&mut buf);

        let seg_len = (stop - start) + n_h - 1;
        for (p, o) in (start..(start + seg_len).min(n_out)).enumerate() {
            out[o] += buf[p].re * inv_scale;
        }
    }
    out
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Choose the FFT block size (power of 2 minimising operation count).
///
///   `cost = ceil(n_x / (N - n_h + 1)) * N * (log2(N) + 1) + 4e-5 * N * n_x`
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;

    let max_pow = ((n_x + n_h) as f64).log2().ceil() as u32 + 1;
    let min_pow = (min_fft as f64).log2().ceil() as u32;

    let mut best_n = 1_usize << max_pow.max(min_pow);
    let mut best_cost = f64::INFINITY;

    for pow in min_pow..=max_pow.max(min_pow) {
        let n = 1_usize << pow;
        if n < min_fft { continue; }
        let n_seg = (n - n_h + 1) as f64;
        let cost = (n_x as f64 / n_seg).ceil() * n as f64 * (pow as f64 + 1.0)
            + 4e-5 * n as f64 * n_x as f64;
        if cost < best_cost {
            best_cost = cost;
            best_n = n;
        }
    }
    best_n
}

/// Compute the FFT of `h` zero-padded to `n_fft`.
fn fft_of_h(h: &[f64], n_fft: usize) -> Vec<Complex<f64>> {
    let mut buf: Vec<Complex<f64>> = h
        .iter()
        .map(|&v| Complex { re: v, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n_fft)
        .collect();
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    planner.plan_fft_forward(n_fft).process(&mut buf);
    buf
}
