//! Standard normal distribution and the two-proportion z-test.
//!
//! The z-test is reported alongside the practical significance gate used for
//! promotion decisions. It never replaces that gate.

use serde::{Deserialize, Serialize};

/// Error function (Abramowitz & Stegun 7.1.26, |error| < 1.5e-7).
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Two-sided p-value for a standard normal statistic.
pub fn two_sided_p_value(z: f64) -> f64 {
    (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0)
}

/// Result of a pooled two-proportion z-test (treatment vs control).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoProportionTest {
    /// Positive when the second (treatment) proportion is larger.
    pub z: f64,
    pub p_value: f64,
}

/// Pooled two-proportion z-test.
///
/// Returns `None` if either arm has no trials or successes exceed trials.
/// When both arms are all-success or all-failure the standard error is zero
/// and the test reports `z = 0, p = 1`.
pub fn two_proportion_z_test(
    control_successes: u64,
    control_trials: u64,
    treatment_successes: u64,
    treatment_trials: u64,
) -> Option<TwoProportionTest> {
    if control_trials == 0 || treatment_trials == 0 {
        return None;
    }
    if control_successes > control_trials || treatment_successes > treatment_trials {
        return None;
    }

    let n1 = control_trials as f64;
    let n2 = treatment_trials as f64;
    let p1 = control_successes as f64 / n1;
    let p2 = treatment_successes as f64 / n2;
    let pooled = (control_successes + treatment_successes) as f64 / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    if se <= 0.0 || !se.is_finite() {
        return Some(TwoProportionTest { z: 0.0, p_value: 1.0 });
    }

    let z = (p2 - p1) / se;
    Some(TwoProportionTest {
        z,
        p_value: two_sided_p_value(z),
    })
}
