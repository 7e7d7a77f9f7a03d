use palette::{Hsl, IntoColor, Srgb};
use plotters::style::RGBColor;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<RGBColor> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.45);
            let rgb: Srgb = hsl.into_color();
            let rgb: Srgb<u8> = rgb.into_format();
            RGBColor(rgb.red, rgb.green, rgb.blue)
        })
        .collect()
}

/// Resolve an SVG/CSS colour name such as `"red"` (case-insensitive).
pub fn named(name: &str) -> Option<RGBColor> {
    palette::named::from_str(&name.to_ascii_lowercase()).map(|c| RGBColor(c.red, c.green, c.blue))
}

/// Colours for `names`, falling back to generated hues for unknown names
/// and for any series beyond the named ones.
pub fn series_colors(names: &[String], n_series: usize) -> Vec<RGBColor> {
    let fallback = generate_palette(n_series);
    (0..n_series)
        .map(|i| {
            names
                .get(i)
                .and_then(|name| {
                    let color = named(name);
                    if color.is_none() {
                        log::warn!("unknown colour '{name}', using a generated hue");
                    }
                    color
                })
                .unwrap_or(fallback[i])
        })
        .collect()
}
