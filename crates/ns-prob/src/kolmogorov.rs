//! Kolmogorov distribution and the binned two-sample Kolmogorov-Smirnov test.

use ns_core::{BinnedSeries, Result};

/// `sqrt(2π)`, the prefactor of the small-`z` asymptotic series.
const SQRT_2PI: f64 = 2.506_628_27;

/// Survival function of the Kolmogorov distribution, `P(K > z)`.
///
/// Small `z` uses the Jacobi-transformed series, intermediate `z` the
/// alternating series `2 Σ (-1)^(j-1) exp(-2 j² z²)` truncated to at most
/// four terms, and `z >= 6.8116` underflows to 0.
pub fn kolmogorov_prob(z: f64) -> f64 {
    const FJ: [f64; 4] = [-2.0, -8.0, -18.0, -32.0];
    // -π²/8, 9·(-π²/8), 25·(-π²/8)
    const C1: f64 = -1.233_700_550_136_169_7;
    const C2: f64 = -11.103_304_951_225_528;
    const C3: f64 = -30.842_513_753_404_244;

    let u = z.abs();
    if u < 0.2 {
        1.0
    } else if u < 0.755 {
        let v = 1.0 / (u * u);
        1.0 - SQRT_2PI * ((C1 * v).exp() + (C2 * v).exp() + (C3 * v).exp()) / u
    } else if u < 6.8116 {
        let v = u * u;
        let max_j = ((3.0 / u).round() as usize).clamp(1, 4);
        let mut r = [0.0f64; 4];
        for j in 0..max_j {
            r[j] = (FJ[j] * v).exp();
        }
        2.0 * (r[0] - r[1] + r[2] - r[3])
    } else {
        0.0
    }
}

/// Binned two-sample KS probability that `a` and `b` share a parent shape.
///
/// Each series is normalized to unit area and the maximum distance between the
/// cumulative distributions is scaled by the effective number of entries
/// (`sum² / Σ err²`). A series with zero errors contributes no statistical
/// weight; when both do, or when either sum is zero, the probability is 0.
pub fn ks_test_binned(a: &BinnedSeries, b: &BinnedSeries) -> Result<f64> {
    a.ensure_same_binning(b, "KS test")?;

    let sum1 = a.integral();
    let sum2 = b.integral();
    if sum1 == 0.0 || sum2 == 0.0 {
        return Ok(0.0);
    }
    let w1: f64 = a.errors().iter().map(|e| e * e).sum();
    let w2: f64 = b.errors().iter().map(|e| e * e).sum();
    if w1 <= 0.0 && w2 <= 0.0 {
        return Ok(0.0);
    }
    let esum1 = if w1 > 0.0 { sum1 * sum1 / w1 } else { 0.0 };
    let esum2 = if w2 > 0.0 { sum2 * sum2 / w2 } else { 0.0 };

    let (s1, s2) = (1.0 / sum1, 1.0 / sum2);
    let mut rsum1 = 0.0;
    let mut rsum2 = 0.0;
    let mut dfmax = 0.0f64;
    for (c1, c2) in a.contents().iter().zip(b.contents()) {
        rsum1 += s1 * c1;
        rsum2 += s2 * c2;
        dfmax = dfmax.max((rsum1 - rsum2).abs());
    }

    let z = if w1 <= 0.0 {
        dfmax * esum2.sqrt()
    } else if w2 <= 0.0 {
        dfmax * esum1.sqrt()
    } else {
        dfmax * (esum1 * esum2 / (esum1 + esum2)).sqrt()
    };
    Ok(kolmogorov_prob(z))
}
