//! Small helpers for mathematical questions: 3x3 determinants, parabola
//! interpolation and roots, a false-position search and the probability that
//! a stock covers independent Bernoulli needs.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error_handling::MathError;

/// Column triple of a 3x3 matrix, or three x/y values.
pub type FloatThreeVec = (f64, f64, f64);

/// Determinant of a 3x3 matrix given as column triples.
pub fn determinant(cola: FloatThreeVec, colb: FloatThreeVec, colc: FloatThreeVec) -> f64 {
    let (a1, a2, a3) = cola;
    let (b1, b2, b3) = colb;
    let (c1, c2, c3) = colc;
    a1 * (b2 * c3 - b3 * c2) - a2 * (b1 * c3 - b3 * c1) + a3 * (b1 * c2 - b2 * c1)
}

/// Coefficients `(a, b, c)` of the second order polynomial through three points.
pub fn intp(x_values: FloatThreeVec, y_values: FloatThreeVec) -> Result<FloatThreeVec, MathError> {
    let ones = (1.0, 1.0, 1.0);
    let xpowtwo = (
        x_values.0 * x_values.0,
        x_values.1 * x_values.1,
        x_values.2 * x_values.2,
    );
    let major = determinant(xpowtwo, x_values, ones);
    if major == 0.0 {
        return Err(MathError::Singular);
    }
    Ok((
        determinant(y_values, x_values, ones) / major,
        determinant(xpowtwo, y_values, ones) / major,
        determinant(xpowtwo, x_values, y_values) / major,
    ))
}

/// Roots of `a*x^2 + b*x + c = val`, as `((-b - sqrt(d)) / 2a, (-b + sqrt(d)) / 2a)`.
pub fn polyroot(coeffs: FloatThreeVec, val: f64) -> Result<(f64, f64), MathError> {
    let (a, b, c) = coeffs;
    if a == 0.0 {
        return Err(MathError::InvalidArgument(
            "leading coefficient must not be zero".to_string(),
        ));
    }
    let c = c - val;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return Err(MathError::NoRealRoots);
    }
    let sqrt_discriminant = discriminant.sqrt();
    Ok((
        (-b - sqrt_discriminant) / (2.0 * a),
        (-b + sqrt_discriminant) / (2.0 * a),
    ))
}

/// Iteration bounds for [`easybisect`].
#[derive(Clone, Copy, Debug)]
pub struct BisectOptions {
    pub maxiter: usize,
    pub relerror: f64,
}

impl Default for BisectOptions {
    fn default() -> Self {
        Self {
            maxiter: 20,
            relerror: 0.01,
        }
    }
}

/// False-position search for `fun(x) == targetval` between two bounds.
///
/// Every evaluated point is kept; the lower bracket follows candidates below
/// the target, the upper bracket all others. The search ends after `maxiter`
/// candidates or once `|fun(x) - targetval| <= relerror * targetval`, and
/// returns the last evaluated `(x, fun(x))`.
pub fn easybisect<F>(
    fun: F,
    lowerbound: f64,
    upperbound: f64,
    targetval: f64,
    options: BisectOptions,
) -> Result<(f64, f64), MathError>
where
    F: Fn(f64) -> f64,
{
    if !(lowerbound < upperbound) {
        return Err(MathError::InvalidArgument(format!(
            "lowerbound {} must be below upperbound {}",
            lowerbound, upperbound
        )));
    }
    info!(
        maxiter = options.maxiter,
        relerror = options.relerror,
        "easybisect started"
    );
    let mut data: Vec<(f64, f64)> = Vec::with_capacity(options.maxiter + 2);
    let mut lowind = data.len();
    data.push((lowerbound, fun(lowerbound)));
    let mut highind = data.len();
    data.push((upperbound, fun(upperbound)));

    for actiter in 0..options.maxiter {
        let (xlow, ylow) = data[lowind];
        let (xhigh, yhigh) = data[highind];
        let candidate = xlow + (targetval - ylow) / (yhigh - ylow) * (xhigh - xlow);
        let candidateval = fun(candidate);
        let candidatediff = candidateval - targetval;
        if candidatediff < 0.0 {
            lowind = data.len();
        } else {
            highind = data.len();
        }
        data.push((candidate, candidateval));
        if candidatediff.abs() <= options.relerror * targetval {
            info!(
                "Early end of loop at iteration {} with relerr {:6.3}%.",
                actiter,
                candidatediff * 100.0 / targetval
            );
            break;
        }
        debug!(
            "Iteration {} with relative error {:6.3}%",
            actiter,
            candidatediff * 100.0 / targetval
        );
    }
    for entry in &data {
        debug!(x = entry.0, y = entry.1, "easybisect point");
    }
    // data always holds the two bounds
    Ok(data[data.len() - 1])
}

/// Probability that `avails` units cover all needs, where need `i` of size
/// `needs[i]` occurs independently with probability `probs[i]`.
///
/// `avails` defaults to the sum of all needs. Walks a table of
/// `remaining stock -> probability` over the needs; branches where a need
/// exceeds the remaining stock are dropped.
pub fn probneeds(needs: &[u64], probs: &[f64], avails: Option<u64>) -> Result<f64, MathError> {
    if needs.len() != probs.len() {
        return Err(MathError::LengthMismatch {
            needs: needs.len(),
            probs: probs.len(),
        });
    }
    if let Some(bad) = probs.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(MathError::InvalidArgument(format!(
            "probability {} outside [0, 1]",
            bad
        )));
    }
    let avails = match avails {
        Some(avails) => avails,
        None => {
            let total = needs
                .iter()
                .try_fold(0u64, |acc, &need| acc.checked_add(need))
                .ok_or_else(|| {
                    MathError::InvalidArgument("sum of needs overflows u64".to_string())
                })?;
            debug!("avails set to overall need value {}", total);
            total
        }
    };

    let mut stock: BTreeMap<u64, f64> = BTreeMap::new();
    stock.insert(avails, 1.0);
    for (&need, &prob) in needs.iter().zip(probs) {
        let mut next: BTreeMap<u64, f64> = BTreeMap::new();
        for (&count, &stockprob) in &stock {
            if let Some(rest) = count.checked_sub(need) {
                *next.entry(rest).or_insert(0.0) += stockprob * prob;
            }
            *next.entry(count).or_insert(0.0) += stockprob * (1.0 - prob);
        }
        stock = next;
    }
    debug!(?stock, "probneeds final stock");
    let sufficient: f64 = stock.values().sum();
    info!(
        "{} will be sufficient in {}% of all cases",
        avails,
        sufficient * 100.0
    );
    Ok(sufficient)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_determinant_identity() {
        let d = determinant((1.0, 0.0, 0.0), (0.0, 1.0, 0.0), (0.0, 0.0, 1.0));
        assert_eq!(d, 1.0);
        let d = determinant((2.0, 0.0, 0.0), (0.0, 3.0, 0.0), (0.0, 0.0, 4.0));
        assert_eq!(d, 24.0);
    }

    #[test]
    fn test_intp_recovers_parabola() {
        // y = 2x^2 - 3x + 1
        let xs = (0.0, 1.0, 2.0);
        let ys = (1.0, 0.0, 3.0);
        let (a, b, c) = intp(xs, ys).unwrap();
        assert!(close(a, 2.0));
        assert!(close(b, -3.0));
        assert!(close(c, 1.0));
    }

    #[test]
    fn test_intp_singular() {
        assert_eq!(
            intp((1.0, 1.0, 2.0), (0.0, 0.0, 1.0)),
            Err(MathError::Singular)
        );
    }

    #[test]
    fn test_polyroot() {
        assert_eq!(polyroot((1.0, 0.0, -1.0), 0.0).unwrap(), (-1.0, 1.0));
        assert_eq!(polyroot((1.0, -1.0, -2.0), 0.0).unwrap(), (-1.0, 2.0));
        assert_eq!(polyroot((1.0, -1.0, 0.0), 0.0).unwrap(), (0.0, 1.0));
        assert_eq!(polyroot((1.0, 0.0, 0.0), 0.0).unwrap(), (0.0, 0.0));
    }

    #[test]
    fn test_polyroot_shifted_value() {
        // x^2 = 4
        assert_eq!(polyroot((1.0, 0.0, 0.0), 4.0).unwrap(), (-2.0, 2.0));
    }

    #[test]
    fn test_polyroot_no_real_roots() {
        assert_eq!(polyroot((1.0, 0.0, 1.0), 0.0), Err(MathError::NoRealRoots));
        assert!(polyroot((0.0, 1.0, 1.0), 0.0).is_err());
    }

    #[test]
    fn test_easybisect() {
        let (x, y) = easybisect(|x| x.powf(x), 2.0, 3.0, 7.0, BisectOptions::default()).unwrap();
        assert!((x - 2.3130177346728433).abs() < 1e-9);
        assert!((y - 6.955885095010905).abs() < 1e-9);

        let tight = BisectOptions {
            maxiter: 30,
            relerror: 0.001,
        };
        let (x, y) = easybisect(|x| x.powf(x), 2.0, 3.0, 7.0, tight).unwrap();
        assert!((x - 2.3161170287184474).abs() < 1e-9);
        assert!((y - 6.995648896293349).abs() < 1e-9);
    }

    #[test]
    fn test_easybisect_linear_hits_in_one_step() {
        let (x, y) = easybisect(|x| 2.0 * x, 0.0, 10.0, 5.0, BisectOptions::default()).unwrap();
        assert!(close(x, 2.5));
        assert!(close(y, 5.0));
    }

    #[test]
    fn test_easybisect_rejects_reversed_bounds() {
        let res = easybisect(|x| x, 3.0, 2.0, 1.0, BisectOptions::default());
        assert!(matches!(res, Err(MathError::InvalidArgument(_))));
    }

    #[test]
    fn test_probneeds_two_items_one_unit() {
        let p = probneeds(&[1, 1], &[0.5, 0.5], Some(1)).unwrap();
        assert!(close(p, 0.75));
    }

    #[test]
    fn test_probneeds_overflowing_needs() {
        assert!(matches!(
            probneeds(&[u64::MAX, 1], &[0.5, 0.5], None),
            Err(MathError::InvalidArgument(_))
        ));
        // an explicit stock never sums the needs
        let p = probneeds(&[u64::MAX, 1], &[0.5, 0.5], Some(1)).unwrap();
        assert!(close(p, 0.5));
    }

    #[test]
    fn test_probneeds_default_avails_is_certain() {
        let p = probneeds(&[3, 2, 5], &[0.2, 0.9, 0.4], None).unwrap();
        assert!(close(p, 1.0));
    }

    #[test]
    fn test_probneeds_single_need() {
        assert!(close(probneeds(&[4], &[0.3], Some(3)).unwrap(), 0.7));
        assert!(close(probneeds(&[4], &[0.3], Some(4)).unwrap(), 1.0));
    }

    #[test]
    fn test_probneeds_empty() {
        assert_eq!(probneeds(&[], &[], Some(0)).unwrap(), 1.0);
    }

    #[test]
    fn test_probneeds_length_mismatch() {
        assert_eq!(
            probneeds(&[1, 2], &[0.5], None),
            Err(MathError::LengthMismatch { needs: 2, probs: 1 })
        );
    }
}
