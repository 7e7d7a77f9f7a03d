use std::path::Path;
use std::sync::OnceLock;

use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};

use super::{FigureError, FigureStyle, Marker, ScoreGrid};
use crate::color::series_colors;

const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");
static FONT: OnceLock<bool> = OnceLock::new();

const GRID: RGBColor = RGBColor(176, 176, 176);

type Chart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn ensure_font() -> Result<(), FigureError> {
    let ok = *FONT
        .get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES).is_ok());
    if ok {
        Ok(())
    } else {
        Err(FigureError::Font)
    }
}

fn drawing<E: std::fmt::Display>(e: E) -> FigureError {
    FigureError::Drawing(e.to_string())
}

/// Render `grid` as one scatter panel per dataset and write it to `path` as PNG.
pub fn render(grid: &ScoreGrid, style: &FigureStyle, path: &Path) -> Result<(), FigureError> {
    if style.width == 0 || style.height == 0 {
        return Err(FigureError::Shape(format!(
            "figure size {}x{} is empty",
            style.width, style.height
        )));
    }
    if style.x_min.is_nan() || style.x_max.is_nan() || style.x_min >= style.x_max {
        return Err(FigureError::Shape(format!(
            "x range {}..{} is empty",
            style.x_min, style.x_max
        )));
    }
    ensure_font()?;

    let (w, h) = (style.width, style.height);
    let mut buf = vec![0u8; w as usize * h as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (w, h)).into_drawing_area();
        draw_figure(&root, grid, style)?;
        root.present().map_err(drawing)?;
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let img = image::RgbImage::from_raw(w, h, buf)
        .ok_or_else(|| FigureError::Drawing("pixel buffer does not match figure size".into()))?;
    img.save_with_format(path, image::ImageFormat::Png)?;
    log::info!("Saved {} panel figure to {}", grid.n_panels(), path.display());
    Ok(())
}

/// Draw every panel of `grid` side by side onto `root`.
pub fn draw_figure<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    grid: &ScoreGrid,
    style: &FigureStyle,
) -> Result<(), FigureError> {
    root.fill(&WHITE).map_err(drawing)?;
    let n = grid.n_panels();
    let names: Vec<String> = grid.series.iter().map(|s| s.color.clone()).collect();
    let colors = series_colors(&names, grid.n_series());
    let legend_panel = style.legend_panel.min(n.saturating_sub(1));

    for (k, area) in root.split_evenly((1, n)).iter().enumerate() {
        draw_panel(area, grid, style, &colors, k, k == legend_panel)?;
    }
    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    grid: &ScoreGrid,
    style: &FigureStyle,
    colors: &[RGBColor],
    k: usize,
    with_legend: bool,
) -> Result<(), FigureError> {
    let n_rows = grid.n_rows();
    let y_top = n_rows as f64 - 0.5;
    let mut chart = ChartBuilder::on(area)
        .caption(&grid.panel_titles[k], (FONT_FAMILY, style.title_font))
        .margin(10)
        .x_label_area_size(style.tick_font * 2)
        .y_label_area_size(if k == 0 { style.tick_font * 3 } else { 0 })
        .build_cartesian_2d(style.x_min..style.x_max, -0.5..y_top)
        .map_err(drawing)?;

    // Row labels only on the first panel; the others share its y axis.
    let row_label = |y: &f64| {
        let i = y.round();
        if k == 0 && (y - i).abs() < 1e-6 && i >= 0.0 {
            grid.row_labels.get(i as usize).cloned().unwrap_or_default()
        } else {
            String::new()
        }
    };
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(style.x_ticks)
        .x_label_formatter(&|x| format!("{x:.1}"))
        .y_labels(n_rows)
        .y_label_formatter(&row_label)
        .label_style((FONT_FAMILY, style.tick_font))
        .axis_style(TRANSPARENT)
        .draw()
        .map_err(drawing)?;

    draw_guides(&mut chart, style, n_rows)?;

    for (j, series) in grid.series.iter().enumerate() {
        let points: Vec<(f64, f64)> = (0..n_rows)
            .filter_map(|i| {
                let v = grid.values[[k, i, j]];
                (!v.is_nan()).then_some((v, i as f64))
            })
            .collect();
        let label = with_legend.then_some(series.label.as_str());
        draw_markers(&mut chart, points, series.marker, colors[j], style.marker_size, label)?;
    }

    if with_legend {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font((FONT_FAMILY, style.legend_font))
            .draw()
            .map_err(drawing)?;
    }
    Ok(())
}

/// Dashed verticals at the x ticks, solid row lines, left and right spines.
fn draw_guides<DB: DrawingBackend>(
    chart: &mut Chart<'_, DB>,
    style: &FigureStyle,
    n_rows: usize,
) -> Result<(), FigureError> {
    let (lo, hi) = (-0.5, n_rows as f64 - 0.5);
    let steps = style.x_ticks.max(2) - 1;
    for t in 0..=steps {
        let x = style.x_min + (style.x_max - style.x_min) * t as f64 / steps as f64;
        chart
            .draw_series(DashedLineSeries::new(
                vec![(x, lo), (x, hi)],
                6u32,
                4u32,
                GRID.stroke_width(1),
            ))
            .map_err(drawing)?;
    }
    for i in 0..n_rows {
        let y = i as f64;
        chart
            .draw_series(LineSeries::new(
                vec![(style.x_min, y), (style.x_max, y)],
                GRID.stroke_width(style.row_line_width),
            ))
            .map_err(drawing)?;
    }
    for x in [style.x_min, style.x_max] {
        chart
            .draw_series(LineSeries::new(vec![(x, lo), (x, hi)], BLACK.stroke_width(1)))
            .map_err(drawing)?;
    }
    Ok(())
}

fn draw_markers<DB: DrawingBackend>(
    chart: &mut Chart<'_, DB>,
    points: Vec<(f64, f64)>,
    marker: Marker,
    color: RGBColor,
    size: u32,
    label: Option<&str>,
) -> Result<(), FigureError> {
    let fill = color.filled();
    let r = size as i32;
    let anno = match marker {
        Marker::Circle => chart.draw_series(points.iter().map(|&p| Circle::new(p, size, fill))),
        Marker::Square => chart.draw_series(
            points
                .iter()
                .map(|&p| EmptyElement::at(p) + Rectangle::new([(-r, -r), (r, r)], fill)),
        ),
        Marker::Triangle => {
            chart.draw_series(points.iter().map(|&p| TriangleMarker::new(p, size + 1, fill)))
        }
    }
    .map_err(drawing)?;

    let Some(label) = label else {
        return Ok(());
    };
    let anno = anno.label(label);
    match marker {
        Marker::Circle => anno.legend(move |c| Circle::new(c, size, fill)),
        Marker::Square => {
            anno.legend(move |(x, y)| Rectangle::new([(x - r, y - r), (x + r, y + r)], fill))
        }
        Marker::Triangle => anno.legend(move |c| TriangleMarker::new(c, size + 1, fill)),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::figure::presets;
    use tempfile::tempdir;

    #[test]
    fn preset_renders_to_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("figs").join("CORnet-S.png");
        let grid = presets::cornet_s().unwrap();
        render(&grid, &FigureStyle::default(), &path).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (1800, 300));
        let reddish = img
            .pixels()
            .any(|p| p[0] > 200 && p[1] < 60 && p[2] < 60);
        assert!(reddish, "no Full markers drawn");
    }

    #[test]
    fn empty_x_range_is_rejected() {
        let dir = tempdir().unwrap();
        let style = FigureStyle {
            x_min: 1.0,
            x_max: 1.0,
            ..FigureStyle::default()
        };
        let grid = presets::cornet_z().unwrap();
        let err = render(&grid, &style, &dir.path().join("x.png")).unwrap_err();
        assert!(matches!(err, FigureError::Shape(_)));
    }
}
