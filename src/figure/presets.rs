//! Published score tables, panels ImageNet / DeWind / Untrained.

use super::{FigureError, ScoreGrid};

const PANELS: [&str; 3] = ["ImageNet", "DeWind", "Untrained"];
const NAN: f64 = f64::NAN;

pub fn cornet_s() -> Result<ScoreGrid, FigureError> {
    let values = vec![
        vec![
            vec![0.24, 0.71, 0.56],
            vec![0.24, 0.78, 0.74],
            vec![0.37, 0.82, 0.79],
            vec![0.29, 0.84, 0.72],
        ],
        vec![
            vec![0.42, 0.59, 0.71],
            vec![0.35, 0.51, 0.63],
            vec![0.26, 0.45, 0.44],
            vec![0.36, 0.68, NAN],
        ],
        vec![
            vec![0.21, 0.63, 0.01],
            vec![0.11, 0.68, 0.41],
            vec![0.03, 0.73, 0.45],
            vec![0.03, 0.75, 0.7],
        ],
    ];
    ScoreGrid::from_nested("CORnet-S", &PANELS, &values)
}

pub fn cornet_z() -> Result<ScoreGrid, FigureError> {
    let values = vec![
        vec![
            vec![0.38, 0.58, 0.48],
            vec![0.43, 0.61, 0.58],
            vec![0.46, 0.64, 0.26],
            vec![0.32, 0.66, 0.27],
        ],
        vec![
            vec![0.38, 0.57, 0.48],
            vec![0.43, 0.6, 0.5],
            vec![0.45, 0.62, 0.28],
            vec![0.56, 0.68, 0.24],
        ],
        vec![
            vec![0.28, 0.5, 0.19],
            vec![0.33, 0.52, NAN],
            vec![0.32, 0.53, 0.11],
            vec![0.31, 0.5, 0.01],
        ],
    ];
    ScoreGrid::from_nested("CORnet-Z", &PANELS, &values)
}

/// Look a preset up by its command-line name.
pub fn by_name(name: &str) -> Option<Result<ScoreGrid, FigureError>> {
    match name.to_ascii_lowercase().as_str() {
        "cornet-s" | "cornet_s" => Some(cornet_s()),
        "cornet-z" | "cornet_z" => Some(cornet_z()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_have_three_panels_of_four_layers() {
        for grid in [cornet_s().unwrap(), cornet_z().unwrap()] {
            assert_eq!(grid.values.dim(), (3, 4, 3));
            assert_eq!(grid.row_labels, vec!["V1", "V2", "V4", "IT"]);
        }
    }

    #[test]
    fn missing_cells_are_nan() {
        let s = cornet_s().unwrap();
        assert!(s.values[[1, 3, 2]].is_nan());
        assert_eq!(s.panel_titles[0], "CORnet-S ImageNet");

        let z = cornet_z().unwrap();
        assert!(z.values[[2, 1, 2]].is_nan());
        assert_eq!(z.values.iter().filter(|v| v.is_nan()).count(), 1);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(by_name("CORnet-S").is_some());
        assert!(by_name("cornet_z").is_some());
        assert!(by_name("alexnet").is_none());
    }
}
