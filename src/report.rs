use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::analysis::selection::LayerSummary;
use crate::analysis::stats::round2;

/// A rounded score as the numeric printer writes it: `1.0`, `0.56`, `nan`.
pub fn format_score(x: f64) -> String {
    let x = round2(x);
    if x.is_nan() {
        "nan".into()
    } else {
        format!("{x:?}")
    }
}

/// The two printed lines for one layer: the pruning summary, then the ANOVA summary.
pub fn layer_lines(s: &LayerSummary) -> [String; 2] {
    let pruning = format!(
        "{} {} {} {} {}",
        s.layer,
        s.n_nodes,
        format_score(s.score_full),
        s.n_selected(),
        format_score(s.best_sfs)
    );
    let anova = match &s.anova {
        Some(a) => format!(
            "{} {} {}",
            a.n_units,
            format_score(a.score),
            format_score(a.overlap)
        ),
        None => s.n_anova_units.to_string(),
    };
    [pruning, anova]
}

pub fn print_summaries<W: Write>(out: &mut W, summaries: &[LayerSummary]) -> Result<()> {
    for s in summaries {
        for line in layer_lines(s) {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

pub fn print_json<W: Write>(out: &mut W, summaries: &[LayerSummary]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, summaries)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    layer: &'a str,
    n_nodes: usize,
    score_full: f64,
    n_selected: usize,
    best_sfs: f64,
    n_anova_units: usize,
    anova_score: Option<f64>,
    overlap: Option<f64>,
}

impl<'a> From<&'a LayerSummary> for CsvRow<'a> {
    fn from(s: &'a LayerSummary) -> Self {
        CsvRow {
            layer: &s.layer,
            n_nodes: s.n_nodes,
            score_full: s.score_full,
            n_selected: s.n_selected(),
            best_sfs: s.best_sfs,
            n_anova_units: s.n_anova_units,
            anova_score: s.anova.as_ref().map(|a| a.score),
            overlap: s.anova.as_ref().map(|a| a.overlap),
        }
    }
}

/// One CSV row per layer; the ANOVA columns are empty when no units were selected.
pub fn write_csv(path: &Path, summaries: &[LayerSummary]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for s in summaries {
        writer.serialize(CsvRow::from(s))?;
    }
    writer.flush()?;
    log::info!("Wrote {} layer rows to {}", summaries.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::selection::AnovaSummary;
    use tempfile::tempdir;

    fn summaries() -> Vec<LayerSummary> {
        vec![
            LayerSummary {
                layer: "V1".into(),
                n_nodes: 64,
                score_full: 0.2449,
                selected_nodes: vec![3, 1, 7],
                best_sfs: 0.7125,
                anova: Some(AnovaSummary {
                    n_units: 12,
                    score: 0.556,
                    overlap: 1.0 / 3.0,
                }),
                n_anova_units: 12,
            },
            LayerSummary {
                layer: "IT".into(),
                n_nodes: 128,
                score_full: 0.29,
                selected_nodes: vec![0],
                best_sfs: 0.84,
                anova: None,
                n_anova_units: 0,
            },
        ]
    }

    #[test]
    fn lines_round_to_two_decimals() {
        let s = summaries();
        assert_eq!(layer_lines(&s[0]), ["V1 64 0.24 3 0.71", "12 0.56 0.33"]);
        assert_eq!(layer_lines(&s[1]), ["IT 128 0.29 1 0.84", "0"]);
    }

    #[test]
    fn whole_and_missing_scores_keep_their_float_form() {
        let s = LayerSummary {
            layer: "V1".into(),
            n_nodes: 4,
            score_full: 1.0,
            selected_nodes: vec![2],
            best_sfs: 0.5,
            anova: Some(AnovaSummary {
                n_units: 1,
                score: f64::NAN,
                overlap: 1.0,
            }),
            n_anova_units: 1,
        };
        assert_eq!(layer_lines(&s), ["V1 4 1.0 1 0.5", "1 nan 1.0"]);
        assert_eq!(format_score(0.125), "0.12");
        assert_eq!(format_score(-0.004), "-0.0");
    }

    #[test]
    fn printed_output_has_two_lines_per_layer() {
        let mut out = Vec::new();
        print_summaries(&mut out, &summaries()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.ends_with("0\n"));
    }

    #[test]
    fn csv_leaves_missing_anova_cells_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("summary.csv");
        write_csv(&path, &summaries()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "layer,n_nodes,score_full,n_selected,best_sfs,n_anova_units,anova_score,overlap"
        );
        assert!(lines[1].starts_with("V1,64,0.2449,3,0.7125,12,0.556,"));
        assert_eq!(lines[2], "IT,128,0.29,1,0.84,0,,");
    }

    #[test]
    fn json_lists_every_layer() {
        let mut out = Vec::new();
        print_json(&mut out, &summaries()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[1]["anova"], serde_json::Value::Null);
        assert_eq!(value[0]["selected_nodes"][0], 3);
    }
}
