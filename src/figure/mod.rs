//! Figure layer: the RSA score grid and its scatter-plot rendering.
//!
//! ```text
//!  presets / scores.json / LayerSummary
//!                 │
//!                 ▼
//!          ┌────────────┐
//!          │ ScoreGrid   │  panels × rows × series, NaN = missing
//!          └────────────┘
//!                 │
//!                 ▼
//!          ┌────────────┐
//!          │  render     │  plotters → RGB buffer → PNG
//!          └────────────┘
//! ```

use std::path::Path;

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::selection::LayerSummary;

pub mod presets;
pub mod render;

pub use render::render;

#[derive(Debug, Error)]
pub enum FigureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid score file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("drawing failed: {0}")]
    Drawing(String),

    #[error("bundled font could not be registered")]
    Font,

    #[error("inconsistent score grid: {0}")]
    Shape(String),
}

// ---------------------------------------------------------------------------
// Series and figure styling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    Circle,
    Square,
    Triangle,
}

/// How one series (selection method) is drawn and labelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStyle {
    pub label: String,
    /// SVG colour name.
    pub color: String,
    pub marker: Marker,
}

impl SeriesStyle {
    fn new(label: &str, color: &str, marker: Marker) -> Self {
        SeriesStyle {
            label: label.into(),
            color: color.into(),
            marker,
        }
    }
}

/// Full network, pruned network, ANOVA-selected units.
pub fn default_series() -> Vec<SeriesStyle> {
    vec![
        SeriesStyle::new("Full", "red", Marker::Circle),
        SeriesStyle::new("Prune", "blue", Marker::Square),
        SeriesStyle::new("ANOVA", "green", Marker::Triangle),
    ]
}

pub fn default_rows() -> Vec<String> {
    ["V1", "V2", "V4", "IT"].map(String::from).to_vec()
}

/// Pixel geometry and fonts of the rendered figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FigureStyle {
    pub width: u32,
    pub height: u32,
    pub x_min: f64,
    pub x_max: f64,
    /// Number of x tick labels, evenly spaced over the range.
    pub x_ticks: usize,
    /// Marker radius in pixels.
    pub marker_size: u32,
    pub title_font: u32,
    pub tick_font: u32,
    pub legend_font: u32,
    /// Panel that carries the legend; clamped to the last panel.
    pub legend_panel: usize,
    pub row_line_width: u32,
}

impl Default for FigureStyle {
    fn default() -> Self {
        Self {
            width: 1800,
            height: 300,
            x_min: 0.0,
            x_max: 1.0,
            x_ticks: 6,
            marker_size: 7,
            title_font: 22,
            tick_font: 20,
            legend_font: 15,
            legend_panel: 1,
            row_line_width: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// ScoreGrid
// ---------------------------------------------------------------------------

/// RSA scores indexed by (panel, row, series).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreGrid {
    pub model_name: String,
    pub panel_titles: Vec<String>,
    pub row_labels: Vec<String>,
    pub series: Vec<SeriesStyle>,
    pub values: Array3<f64>,
}

/// On-disk form of a [`ScoreGrid`]; `null` marks a missing score.
#[derive(Debug, Serialize, Deserialize)]
struct ScoreGridFile {
    model_name: String,
    /// Suffixes appended to the model name, one per panel.
    panels: Vec<String>,
    #[serde(default = "default_rows")]
    rows: Vec<String>,
    #[serde(default = "default_series")]
    series: Vec<SeriesStyle>,
    values: Vec<Vec<Vec<Option<f64>>>>,
}

impl ScoreGrid {
    pub fn new(
        model_name: &str,
        panel_titles: Vec<String>,
        row_labels: Vec<String>,
        series: Vec<SeriesStyle>,
        values: Array3<f64>,
    ) -> Result<Self, FigureError> {
        let (panels, rows, n_series) = values.dim();
        if panels == 0 || rows == 0 || n_series == 0 {
            return Err(FigureError::Shape(format!(
                "score grid {panels}x{rows}x{n_series} has an empty axis"
            )));
        }
        if panel_titles.len() != panels {
            return Err(FigureError::Shape(format!(
                "{} panel titles for {panels} panels",
                panel_titles.len()
            )));
        }
        if row_labels.len() != rows {
            return Err(FigureError::Shape(format!(
                "{} row labels for {rows} rows",
                row_labels.len()
            )));
        }
        if series.len() != n_series {
            return Err(FigureError::Shape(format!(
                "{} series styles for {n_series} series",
                series.len()
            )));
        }
        Ok(ScoreGrid {
            model_name: model_name.to_string(),
            panel_titles,
            row_labels,
            series,
            values,
        })
    }

    /// Build from nested `[panel][row][series]` values with default rows and series.
    pub fn from_nested(
        model_name: &str,
        panel_labels: &[&str],
        nested: &[Vec<Vec<f64>>],
    ) -> Result<Self, FigureError> {
        let values = nested_to_array(nested)?;
        let titles = panel_labels
            .iter()
            .map(|l| format!("{model_name} {l}"))
            .collect();
        let series = default_series();
        let n_series = values.dim().2;
        let series = if n_series == series.len() {
            series
        } else {
            (0..n_series)
                .map(|j| SeriesStyle::new(&format!("series {}", j + 1), "", Marker::Circle))
                .collect()
        };
        let rows = values.dim().1;
        let row_labels = if rows == 4 {
            default_rows()
        } else {
            (0..rows).map(|i| format!("row {}", i + 1)).collect()
        };
        ScoreGrid::new(model_name, titles, row_labels, series, values)
    }

    /// One panel per `(label, summaries)`; rows are layers.
    ///
    /// Series are Full (`score_full`), Prune (best forward-selection score) and
    /// ANOVA (RSA of the ANOVA units, NaN when none were selected).
    pub fn from_summaries(
        model_name: &str,
        panels: &[(String, Vec<LayerSummary>)],
    ) -> Result<Self, FigureError> {
        let Some((_, first)) = panels.first() else {
            return Err(FigureError::Shape("no panels to plot".into()));
        };
        let row_labels: Vec<String> = first.iter().map(|s| s.layer.clone()).collect();
        for (label, summaries) in panels {
            let layers: Vec<&str> = summaries.iter().map(|s| s.layer.as_str()).collect();
            if layers != row_labels.iter().map(String::as_str).collect::<Vec<_>>() {
                return Err(FigureError::Shape(format!(
                    "panel '{label}' has layers {layers:?}, expected {row_labels:?}"
                )));
            }
        }

        let mut values = Array3::from_elem((panels.len(), row_labels.len(), 3), f64::NAN);
        for (k, (_, summaries)) in panels.iter().enumerate() {
            for (i, s) in summaries.iter().enumerate() {
                values[[k, i, 0]] = s.score_full;
                values[[k, i, 1]] = s.best_sfs;
                values[[k, i, 2]] = s.anova.as_ref().map_or(f64::NAN, |a| a.score);
            }
        }
        let titles = panels
            .iter()
            .map(|(label, _)| format!("{model_name} {label}"))
            .collect();
        ScoreGrid::new(model_name, titles, row_labels, default_series(), values)
    }

    pub fn load_json(path: &Path) -> Result<Self, FigureError> {
        let text = std::fs::read_to_string(path)?;
        let file: ScoreGridFile = serde_json::from_str(&text)?;
        let nested: Vec<Vec<Vec<f64>>> = file
            .values
            .iter()
            .map(|panel| {
                panel
                    .iter()
                    .map(|row| row.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
                    .collect()
            })
            .collect();
        let values = nested_to_array(&nested)?;
        let titles = file
            .panels
            .iter()
            .map(|l| format!("{} {l}", file.model_name))
            .collect();
        ScoreGrid::new(&file.model_name, titles, file.rows, file.series, values)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), FigureError> {
        let prefix = format!("{} ", self.model_name);
        let file = ScoreGridFile {
            model_name: self.model_name.clone(),
            panels: self
                .panel_titles
                .iter()
                .map(|t| t.strip_prefix(&prefix).unwrap_or(t).to_string())
                .collect(),
            rows: self.row_labels.clone(),
            series: self.series.clone(),
            values: self
                .values
                .outer_iter()
                .map(|panel| {
                    panel
                        .outer_iter()
                        .map(|row| row.iter().map(|&v| (!v.is_nan()).then_some(v)).collect())
                        .collect()
                })
                .collect(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)? + "\n")?;
        Ok(())
    }

    pub fn n_panels(&self) -> usize {
        self.values.dim().0
    }

    pub fn n_rows(&self) -> usize {
        self.values.dim().1
    }

    pub fn n_series(&self) -> usize {
        self.values.dim().2
    }
}

fn nested_to_array(nested: &[Vec<Vec<f64>>]) -> Result<Array3<f64>, FigureError> {
    let panels = nested.len();
    let rows = nested.first().map_or(0, |p| p.len());
    let series = nested
        .first()
        .and_then(|p| p.first())
        .map_or(0, |r| r.len());
    let mut flat = Vec::with_capacity(panels * rows * series);
    for (k, panel) in nested.iter().enumerate() {
        if panel.len() != rows {
            return Err(FigureError::Shape(format!(
                "panel {k} has {} rows, expected {rows}",
                panel.len()
            )));
        }
        for (i, row) in panel.iter().enumerate() {
            if row.len() != series {
                return Err(FigureError::Shape(format!(
                    "panel {k} row {i} has {} values, expected {series}",
                    row.len()
                )));
            }
            flat.extend_from_slice(row);
        }
    }
    Array3::from_shape_vec((panels, rows, series), flat)
        .map_err(|e| FigureError::Shape(e.to_string()))
}
