//! Small order-statistic helpers used by the running-median smoother.

/// Median of three values.
///
/// Branch-only (no allocation, no sort); NaN inputs propagate through the
/// comparisons in an unspecified but deterministic way.
#[inline]
pub fn median3(a: f64, b: f64, c: f64) -> f64 {
    if a > b {
        if b > c {
            b
        } else if a > c {
            c
        } else {
            a
        }
    } else if a > c {
        a
    } else if b > c {
        c
    } else {
        b
    }
}

/// Median of five values.
#[inline]
pub fn median5(values: [f64; 5]) -> f64 {
    let mut v = values;
    v.sort_by(|a, b| a.total_cmp(b));
    v[2]
}
