//! Numeric derivatives and definite integrals over curve evaluators

/// Step used by both finite-difference operators
pub const DIFFERENCE_STEP: f64 = 1e-4;

/// Sub-intervals sampled by `integrate` (17 points). Must be a power of two.
pub const INTEGRATION_INTERVALS: usize = 16;

/// Central first difference `(f(x+d) - f(x-d)) / 2d`
pub fn central_difference<E>(mut f: impl FnMut(f64) -> Result<f64, E>, x: f64) -> Result<f64, E> {
    let d = DIFFERENCE_STEP;
    Ok((f(x + d)? - f(x - d)?) / (2.0 * d))
}

/// Central second difference `(f(x+d) - 2f(x) + f(x-d)) / d²`
pub fn second_difference<E>(mut f: impl FnMut(f64) -> Result<f64, E>, x: f64) -> Result<f64, E> {
    let d = DIFFERENCE_STEP;
    Ok((f(x + d)? - 2.0 * f(x)? + f(x - d)?) / (d * d))
}

/// Definite integral of `f` over `[min, max]` from 17 evenly spaced samples
///
/// Reversed bounds negate the result; equal bounds give exactly zero.
pub fn integrate<E>(
    mut f: impl FnMut(f64) -> Result<f64, E>,
    min: f64,
    max: f64,
) -> Result<f64, E> {
    if min == max {
        return Ok(0.0);
    }
    let (lo, hi, sign) = if min > max { (max, min, -1.0) } else { (min, max, 1.0) };

    let step = (hi - lo) / INTEGRATION_INTERVALS as f64;
    let mut samples = [0.0; INTEGRATION_INTERVALS + 1];
    for (i, sample) in samples.iter_mut().enumerate() {
        *sample = f(lo + step * i as f64)?;
    }

    Ok(sign * romberg(&samples, hi - lo))
}

/// Romberg extrapolation over uniformly spaced samples
///
/// `samples.len() - 1` must be a power of two. Trapezoid estimates are built
/// with strides `n, n/2, .., 1` and refined with Richardson extrapolation.
pub fn romberg(samples: &[f64], width: f64) -> f64 {
    let intervals = samples.len().saturating_sub(1);
    if intervals == 0 {
        return 0.0;
    }
    debug_assert!(intervals.is_power_of_two());

    let levels = intervals.trailing_zeros() as usize + 1;
    let mut table = vec![0.0; levels];

    let mut stride = intervals;
    for level in 0..levels {
        let h = width * stride as f64 / intervals as f64;
        let interior: f64 = samples[stride..intervals].iter().step_by(stride).sum();
        table[level] = h * ((samples[0] + samples[intervals]) / 2.0 + interior);
        stride /= 2;
    }

    // In-place Richardson: after pass k, table[level] holds R(level, k)
    let mut factor = 4.0;
    for k in 1..levels {
        for level in (k..levels).rev() {
            table[level] = (factor * table[level] - table[level - 1]) / (factor - 1.0);
        }
        factor *= 4.0;
    }

    table[levels - 1]
}
