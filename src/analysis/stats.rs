use super::AnalysisError;

/// Pearson correlation coefficient of two equally long samples.
///
/// Returns NaN when either sample has zero variance, matching `scipy.stats.pearsonr`.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<f64, AnalysisError> {
    if x.len() != y.len() {
        return Err(AnalysisError::Shape(format!(
            "pearson inputs have lengths {} and {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(AnalysisError::Insufficient(format!(
            "pearson needs at least 2 pairs, got {}",
            x.len()
        )));
    }

    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return Ok(f64::NAN);
    }
    Ok((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

/// Two-decimal display rounding: scale by 100, round half to even, scale back.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}

/// Index of the first maximum, ignoring NaN. `None` for an empty or all-NaN slice.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn perfect_linear_relationships() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let up = [2.0, 4.0, 6.0, 8.0];
        let down = [8.0, 6.0, 4.0, 2.0];
        assert_abs_diff_eq!(pearson(&x, &up).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pearson(&x, &down).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn known_coefficient() {
        // numpy.corrcoef([1, 2, 3, 4, 5], [2, 1, 4, 3, 5])[0, 1] == 0.8
        let r = pearson(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 1.0, 4.0, 3.0, 5.0]).unwrap();
        assert_abs_diff_eq!(r, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn constant_input_gives_nan() {
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).unwrap().is_nan());
    }

    #[test]
    fn length_checks() {
        assert!(matches!(
            pearson(&[1.0, 2.0], &[1.0]),
            Err(AnalysisError::Shape(_))
        ));
        assert!(matches!(
            pearson(&[1.0], &[1.0]),
            Err(AnalysisError::Insufficient(_))
        ));
    }

    #[test]
    fn rounding_for_display() {
        assert_eq!(round2(0.714), 0.71);
        assert_eq!(round2(-0.126), -0.13);
        assert_eq!(round2(0.5), 0.5);
        // Exact ties go to the even neighbour.
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(0.625), 0.62);
        assert_eq!(round2(-0.125), -0.12);
        assert!(round2(f64::NAN).is_nan());
    }

    #[test]
    fn argmax_takes_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.8, 0.3, 0.8]), Some(1));
        assert_eq!(argmax(&[f64::NAN, 0.2, 0.1]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
