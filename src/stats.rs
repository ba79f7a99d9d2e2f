//! Rank statistics, percentile-of-score and NaN-aware reductions.
//!
//! Conventions:
//! * ranks are 1-based, ties receive the average of the ranks they span
//!   (`scipy.stats.rankdata(method='average')`);
//! * the Spearman p-value is two-sided from a Student-t with `n − 2`
//!   degrees of freedom, as `scipy.stats.spearmanr` computes it;
//! * [`percentile_of_score`] implements every `kind` of
//!   `scipy.stats.percentileofscore`; the pipeline default is
//!   [`PercentileKind::Rank`].
use ndarray::{Array1, ArrayView1};
use serde::Deserialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::cmp::Ordering;

/// 1-based average ranks.
pub fn rank_average(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // Positions i..j (0-based) share ranks i+1..=j.
        let avg = (i + j + 1) as f64 / 2.0;
        for &k in &order[i..j] {
            ranks[k] = avg;
        }
        i = j;
    }
    ranks
}

/// Pearson correlation; `None` for mismatched/short input or zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n != y.len() || n < 2 {
        return None;
    }
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spearman {
    pub correlation: f64,
    /// Two-sided p-value; NaN with fewer than three observations.
    pub p_value: f64,
}

/// Spearman rank correlation with its two-sided p-value.
///
/// `None` when either input is constant (the correlation is undefined).
pub fn spearman(x: &[f64], y: &[f64]) -> Option<Spearman> {
    let rx = rank_average(x);
    let ry = rank_average(y);
    let r = pearson(&rx, &ry)?;
    Some(Spearman { correlation: r, p_value: correlation_p_value(r, x.len()) })
}

/// Two-sided p-value of a correlation `r` over `n` samples.
fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n < 3 {
        return f64::NAN;
    }
    let dof = (n - 2) as f64;
    let denom = (1.0 + r) * (1.0 - r);
    if denom <= 0.0 {
        return 0.0;
    }
    let t = r * (dof / denom).sqrt();
    match StudentsT::new(0.0, 1.0, dof) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Tie convention for [`percentile_of_score`].
///
/// With `left = #{a < score}` and `right = #{a ≤ score}` over `n` values:
///
/// | kind     | percentile                                   |
/// |----------|----------------------------------------------|
/// | `Rank`   | `(left + right + [right > left]) · 50 / n`   |
/// | `Weak`   | `right · 100 / n`                            |
/// | `Strict` | `left · 100 / n`                             |
/// | `Mean`   | `(left + right) · 50 / n`                    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercentileKind {
    #[default]
    Rank,
    Weak,
    Strict,
    Mean,
}

/// Percentile (0–100) of `score` relative to `values`.
///
/// NaN entries of `values` are ignored.  Returns NaN when `score` is NaN
/// or no finite value remains.
pub fn percentile_of_score(values: &[f64], score: f64, kind: PercentileKind) -> f64 {
    if score.is_nan() {
        return f64::NAN;
    }
    let mut n = 0usize;
    let mut left = 0usize;
    let mut right = 0usize;
    for &v in values.iter().filter(|v| !v.is_nan()) {
        n += 1;
        if v < score {
            left += 1;
        }
        if v <= score {
            right += 1;
        }
    }
    if n == 0 {
        return f64::NAN;
    }
    let (n, left, right) = (n as f64, left as f64, right as f64);
    match kind {
        PercentileKind::Rank => {
            let bump = if right > left { 1.0 } else { 0.0 };
            (left + right + bump) * 50.0 / n
        }
        PercentileKind::Weak => right * 100.0 / n,
        PercentileKind::Strict => left * 100.0 / n,
        PercentileKind::Mean => (left + right) * 50.0 / n,
    }
}

/// Mean of the non-NaN entries; NaN if there are none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// Median of the non-NaN entries; NaN if there are none.
pub fn nan_median(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(f64::total_cmp);
    let n = v.len();
    if n % 2 == 1 { v[n / 2] } else { 0.5 * (v[n / 2 - 1] + v[n / 2]) }
}

/// Element-wise NaN-aware mean of equally long rows.
///
/// Positions where every row is NaN (or there are no rows) are NaN.
pub fn nan_mean_rows<'a, I>(rows: I, n: usize) -> Array1<f64>
where
    I: IntoIterator<Item = ArrayView1<'a, f64>>,
{
    let mut sum = Array1::<f64>::zeros(n);
    let mut count = vec![0usize; n];
    for row in rows {
        for (i, &v) in row.iter().enumerate().take(n) {
            if !v.is_nan() {
                sum[i] += v;
                count[i] += 1;
            }
        }
    }
    Array1::from_iter(
        sum.iter().zip(&count).map(|(&s, &c)| if c == 0 { f64::NAN } else { s / c as f64 }),
    )
}

/// `numerator / denominator`, undefined (`None`) for a zero denominator.
pub fn proportion(numerator: usize, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Events per second, undefined (`None`) for a non-positive duration.
pub fn rate(count: usize, duration: f64) -> Option<f64> {
    (duration > 0.0).then(|| count as f64 / duration)
}
