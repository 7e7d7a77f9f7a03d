use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::Array2;

use super::mat::read_mat;
use super::model::{MatFile, SelectionResult};
use super::npy::{load_indices, load_npy};
use crate::config::HumanRdmSource;

// ---------------------------------------------------------------------------
// MAT-file inputs
// ---------------------------------------------------------------------------

pub fn load_mat(path: &Path) -> Result<MatFile> {
    let file = read_mat(path).with_context(|| format!("reading MAT-file {}", path.display()))?;
    log::debug!("{}: variables {:?}", path.display(), file.names());
    Ok(file)
}

/// Load the human RDM (behavioural or fMRI) as a square matrix.
pub fn load_human_rdm(source: &HumanRdmSource) -> Result<Array2<f64>> {
    let file = load_mat(&source.path)?;
    let mut value = file
        .get(&source.variable)
        .with_context(|| format!("in {}", source.path.display()))?;
    if let Some(field) = &source.field {
        value = value
            .field(field)
            .with_context(|| format!("in {}:{}", source.path.display(), source.variable))?;
    }
    let rdm = value
        .to_matrix()
        .with_context(|| format!("human RDM in {}", source.path.display()))?;
    if !rdm.is_square() {
        bail!(
            "human RDM in {} is {}x{}, expected a square matrix",
            source.path.display(),
            rdm.nrows(),
            rdm.ncols()
        );
    }
    log::info!(
        "Loaded {}x{} human RDM from {}",
        rdm.nrows(),
        rdm.ncols(),
        source.path.display()
    );
    Ok(rdm)
}

/// Expected variables: `score_full` (1×1), `score_each_node` (1×N), `score_sfs` (1×M).
pub fn load_selection(path: &Path) -> Result<SelectionResult> {
    let file = load_mat(path)?;
    let read = |name: &str| {
        file.get(name)
            .and_then(|v| v.to_vec())
            .with_context(|| format!("reading '{name}' from {}", path.display()))
    };

    let score_full = file
        .get("score_full")
        .and_then(|v| v.scalar())
        .with_context(|| format!("reading 'score_full' from {}", path.display()))?;

    Ok(SelectionResult {
        score_full,
        score_each_node: read("score_each_node")?,
        score_sfs: read("score_sfs")?,
    })
}

// ---------------------------------------------------------------------------
// NPY inputs
// ---------------------------------------------------------------------------

/// Load stimulus × unit activations. Trailing axes are flattened into units.
pub fn load_activations(path: &Path) -> Result<Array2<f64>> {
    let array = load_npy(path).with_context(|| format!("reading activations {}", path.display()))?;
    if array.ndim() < 2 {
        bail!(
            "{}: activations have shape {:?}, expected stimuli x units",
            path.display(),
            array.shape
        );
    }
    let rows = array.shape[0];
    let cols: usize = array.shape[1..].iter().product();
    log::debug!(
        "{}: activations {:?} -> {rows}x{cols}",
        path.display(),
        array.shape
    );
    Array2::from_shape_vec((rows, cols), array.data)
        .with_context(|| format!("reshaping activations from {}", path.display()))
}

pub fn load_unit_indices(path: &Path) -> Result<Vec<usize>> {
    let indices =
        load_indices(path).with_context(|| format!("reading unit indices {}", path.display()))?;
    log::debug!("{}: {} unit indices", path.display(), indices.len());
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mat::{struct_value, write_mat};
    use crate::data::model::MatValue;
    use crate::data::npy::{save_indices, save_npy};
    use tempfile::tempdir;

    #[test]
    fn selection_scores_are_flattened() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("V1.mat");
        let mut file = MatFile::default();
        file.insert("score_full", MatValue::scalar_value(0.42));
        file.insert("score_each_node", MatValue::row_vector(&[0.40, 0.41, 0.30]));
        file.insert("score_sfs", MatValue::row_vector(&[0.2, 0.5]));
        write_mat(&path, &file, true).unwrap();

        let res = load_selection(&path).unwrap();
        assert_eq!(res.score_full, 0.42);
        assert_eq!(res.score_each_node, vec![0.40, 0.41, 0.30]);
        assert_eq!(res.score_sfs, vec![0.2, 0.5]);
    }

    #[test]
    fn missing_selection_variable_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("V2.mat");
        let mut file = MatFile::default();
        file.insert("score_full", MatValue::scalar_value(0.42));
        write_mat(&path, &file, false).unwrap();

        let err = load_selection(&path).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("score_each_node"));
        assert!(text.contains("V2.mat"));
    }

    #[test]
    fn score_full_must_be_a_single_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("V4.mat");
        let mut file = MatFile::default();
        file.insert("score_full", MatValue::row_vector(&[0.42, 0.43]));
        file.insert("score_each_node", MatValue::row_vector(&[0.40]));
        file.insert("score_sfs", MatValue::row_vector(&[0.2]));
        write_mat(&path, &file, false).unwrap();

        let text = format!("{:#}", load_selection(&path).unwrap_err());
        assert!(text.contains("score_full"));
        assert!(text.contains("V4.mat"));
        assert!(text.contains("1x2"));
    }

    #[test]
    fn human_rdm_from_struct_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("MRI-RDM.mat");
        let mut file = MatFile::default();
        file.insert(
            "RDM",
            struct_value(vec![(
                "IPS345".into(),
                MatValue::from_rows(2, 2, &[0.0, 0.3, 0.3, 0.0]),
            )]),
        );
        write_mat(&path, &file, false).unwrap();

        let source = HumanRdmSource {
            path: path.clone(),
            variable: "RDM".into(),
            field: Some("IPS345".into()),
        };
        let rdm = load_human_rdm(&source).unwrap();
        assert_eq!(rdm[[0, 1]], 0.3);

        let missing = HumanRdmSource {
            field: Some("V3A".into()),
            ..source
        };
        assert!(load_human_rdm(&missing).is_err());
    }

    #[test]
    fn non_square_human_rdm_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Number.mat");
        let mut file = MatFile::default();
        file.insert("Number", MatValue::row_vector(&[0.0, 1.0, 2.0]));
        write_mat(&path, &file, false).unwrap();

        let source = HumanRdmSource {
            path,
            variable: "Number".into(),
            field: None,
        };
        assert!(load_human_rdm(&source).is_err());
    }

    #[test]
    fn activations_flatten_trailing_axes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("V1.npy");
        let data: Vec<f64> = (0..12).map(f64::from).collect();
        save_npy(&path, &[3, 2, 2], &data).unwrap();

        let acts = load_activations(&path).unwrap();
        assert_eq!(acts.dim(), (3, 4));
        assert_eq!(acts[[1, 0]], 4.0);
    }

    #[test]
    fn vector_activations_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("V1.npy");
        save_npy(&path, &[3], &[1.0, 2.0, 3.0]).unwrap();
        assert!(load_activations(&path).is_err());
    }

    #[test]
    fn unit_indices_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("IT.npy");
        save_indices(&path, &[3, 1]).unwrap();
        assert_eq!(load_unit_indices(&path).unwrap(), vec![3, 1]);
    }

    #[test]
    fn fractional_unit_indices_name_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("V2.npy");
        save_npy(&path, &[2], &[1.0, 2.5]).unwrap();
        let text = format!("{:#}", load_unit_indices(&path).unwrap_err());
        assert!(text.contains("V2.npy"));
        assert!(text.contains("element 1"));
    }
}
