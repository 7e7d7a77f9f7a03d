use ndarray::{s, Array2, Axis};

use super::stats::pearson;
use super::AnalysisError;

/// Strict upper triangle (diagonal excluded) of a square matrix, row by row.
pub fn upper_tri(m: &Array2<f64>) -> Result<Vec<f64>, AnalysisError> {
    if !m.is_square() {
        return Err(AnalysisError::Shape(format!(
            "upper triangle of a {}x{} matrix",
            m.nrows(),
            m.ncols()
        )));
    }
    let n = m.nrows();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in i + 1..n {
            out.push(m[[i, j]]);
        }
    }
    Ok(out)
}

/// Pearson correlation between every pair of rows (`np.corrcoef` semantics).
pub fn corrcoef(rows: &Array2<f64>) -> Result<Array2<f64>, AnalysisError> {
    let n = rows.nrows();
    let mut out = Array2::<f64>::zeros((n, n));
    let vectors: Vec<Vec<f64>> = rows.outer_iter().map(|r| r.to_vec()).collect();
    for i in 0..n {
        for j in i..n {
            let r = pearson(&vectors[i], &vectors[j])?;
            out[[i, j]] = r;
            out[[j, i]] = r;
        }
    }
    Ok(out)
}

/// Mean activation of each condition over consecutive blocks of `block` stimuli.
pub fn condition_average(
    acts: &Array2<f64>,
    n_conditions: usize,
    block: usize,
) -> Result<Array2<f64>, AnalysisError> {
    let needed = n_conditions * block;
    if acts.nrows() < needed {
        return Err(AnalysisError::Insufficient(format!(
            "{n_conditions} conditions x {block} stimuli need {needed} rows, activations have {}",
            acts.nrows()
        )));
    }
    if acts.nrows() > needed {
        log::warn!(
            "activations have {} rows; only the first {needed} are averaged",
            acts.nrows()
        );
    }

    let mut out = Array2::<f64>::zeros((n_conditions, acts.ncols()));
    for (c, mut row) in out.outer_iter_mut().enumerate() {
        let start = c * block;
        let mean = acts
            .slice(s![start..start + block, ..])
            .mean_axis(Axis(0))
            .ok_or_else(|| AnalysisError::Insufficient("empty condition block".into()))?;
        row.assign(&mean);
    }
    Ok(out)
}

/// Keep only the given unit columns, in the given order.
pub fn select_units(acts: &Array2<f64>, units: &[usize]) -> Result<Array2<f64>, AnalysisError> {
    if let Some(&index) = units.iter().find(|&&u| u >= acts.ncols()) {
        return Err(AnalysisError::UnitOutOfRange {
            index,
            units: acts.ncols(),
        });
    }
    Ok(acts.select(Axis(1), units))
}

/// Correlation-distance RDM between conditions (rows): `1 - corrcoef`.
pub fn rdm_from_activations(acts: &Array2<f64>) -> Result<Array2<f64>, AnalysisError> {
    Ok(corrcoef(acts)?.mapv(|r| 1.0 - r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn upper_triangle_is_row_major_without_diagonal() {
        let m = array![[0.0, 1.0, 2.0], [1.0, 0.0, 3.0], [2.0, 3.0, 0.0]];
        assert_eq!(upper_tri(&m).unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(upper_tri(&array![[1.0, 2.0]]).is_err());
    }

    #[test]
    fn corrcoef_matches_numpy() {
        let rows = array![[1.0, 2.0, 3.0], [3.0, 2.0, 1.0], [1.0, 3.0, 2.0]];
        let c = corrcoef(&rows).unwrap();
        assert_abs_diff_eq!(c[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[[0, 1]], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[[0, 2]], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(c[[2, 1]], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn rdm_is_one_minus_correlation() {
        let rows = array![[1.0, 2.0, 3.0], [2.0, 4.0, 6.1], [3.0, 1.0, 2.0]];
        let rdm = rdm_from_activations(&rows).unwrap();
        assert_abs_diff_eq!(rdm[[0, 0]], 0.0, epsilon = 1e-12);
        assert!(rdm[[0, 1]] < 0.01);
        assert_abs_diff_eq!(rdm[[0, 2]], rdm[[2, 0]], epsilon = 1e-15);
    }

    #[test]
    fn condition_average_uses_consecutive_blocks() {
        let acts = array![[1.0, 10.0], [3.0, 30.0], [5.0, 50.0], [7.0, 70.0], [9.0, 90.0]];
        let avg = condition_average(&acts, 2, 2).unwrap();
        assert_eq!(avg, array![[2.0, 20.0], [6.0, 60.0]]);
        assert!(condition_average(&acts, 3, 2).is_err());
    }

    #[test]
    fn select_units_checks_bounds() {
        let acts = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(select_units(&acts, &[2, 0]).unwrap(), array![[3.0, 1.0], [6.0, 4.0]]);
        assert_eq!(
            select_units(&acts, &[3]).unwrap_err(),
            AnalysisError::UnitOutOfRange { index: 3, units: 3 }
        );
    }
}
