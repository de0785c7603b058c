//! Draws a [`ChartLayout`] with plotters.

use std::panic;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use gear_chart::layout::{Rgb, BACKGROUND_COLOR, MARKER_COLOR, TEXT_COLOR};
use gear_chart::{ChartLayout, LabelSide};
use image::imageops::{self, FilterType};
use image::RgbImage;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontDesc, FontFamily, FontStyle};
use plotters_backend::{
    BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingBackend, DrawingErrorKind,
};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug)]
pub enum ChartKind {
    /// Raster drawn at the layout's size, then downscaled to `output`.
    Png { output: (u32, u32) },
    Svg,
}

pub fn render_chart_guard(chart: &ChartLayout, path: &Path, kind: ChartKind) -> Result<(), String> {
    let render = || match kind {
        ChartKind::Png { output } => render_png(chart, path, output),
        ChartKind::Svg => render_svg(chart, path),
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
        .map_err(|err| format!("{:#}", err))
}

fn canvas_size(chart: &ChartLayout) -> (u32, u32) {
    (chart.width.round() as u32, chart.height.round() as u32)
}

fn render_png(chart: &ChartLayout, path: &Path, output: (u32, u32)) -> Result<()> {
    let (width, height) = canvas_size(chart);
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let backend = BitMapBackend::with_buffer(&mut buffer, (width, height));
        let root = FontSafeBackend::new(backend).into_drawing_area();
        draw_layout(root, chart)?;
    }

    let image = RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| anyhow!("bitmap buffer does not match {}x{}", width, height))?;
    let image = downscale(image, output);
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn downscale(image: RgbImage, output: (u32, u32)) -> RgbImage {
    if image.dimensions() == output {
        return image;
    }
    debug!(
        "Downscaling {}x{} -> {}x{}",
        image.width(),
        image.height(),
        output.0,
        output.1
    );
    imageops::resize(&image, output.0, output.1, FilterType::Triangle)
}

fn render_svg(chart: &ChartLayout, path: &Path) -> Result<()> {
    let backend = SVGBackend::new(path, canvas_size(chart));
    let root = FontSafeBackend::new(backend).into_drawing_area();
    draw_layout(root, chart)
}

fn rgb((r, g, b): Rgb) -> RGBColor {
    RGBColor(r, g, b)
}

fn px(value: f64) -> i32 {
    value.round() as i32
}

fn stroke(value: f64) -> u32 {
    (value.round() as u32).max(1)
}

fn draw_layout<DB>(root: DrawingArea<DB, Shift>, chart: &ChartLayout) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&rgb(BACKGROUND_COLOR))?;
    let height = px(chart.height);

    let grid_font = FontDesc::new(FontFamily::SansSerif, chart.large_font, FontStyle::Normal);
    for line in &chart.grid {
        let x = px(line.x);
        let style = ShapeStyle {
            color: rgb(line.color).to_rgba(),
            filled: false,
            stroke_width: stroke(line.stroke_width),
        };
        root.draw(&PathElement::new(vec![(x, 0), (x, height)], style))?;
        if let Some(label) = &line.label {
            let text = grid_font
                .color(&rgb(line.color))
                .pos(Pos::new(HPos::Right, VPos::Top));
            root.draw(&Text::new(
                label.as_str(),
                (px(line.x - chart.grid_label_pad), px(chart.grid_label_top)),
                text,
            ))?;
        }
    }

    let radius = stroke(chart.marker_radius);
    let solid = rgb(MARKER_COLOR).filled();
    let outline = ShapeStyle {
        color: rgb(MARKER_COLOR).to_rgba(),
        filled: false,
        stroke_width: stroke(chart.outline_width),
    };
    let gear_font = FontDesc::new(FontFamily::SansSerif, chart.small_font, FontStyle::Normal);
    let name_font = FontDesc::new(FontFamily::SansSerif, chart.large_font, FontStyle::Normal);

    for row in &chart.rows {
        for marker in &row.markers {
            let centre = (px(marker.x), px(marker.y));
            let style = if marker.flagged { outline } else { solid };
            root.draw(&Circle::new(centre, radius, style))?;

            let v_pos = match marker.label_side {
                LabelSide::Above => VPos::Bottom,
                LabelSide::Below => VPos::Top,
            };
            let label_y = marker.y + marker.label_side.sign() * chart.label_gap;
            root.draw(&Text::new(
                marker.label.as_str(),
                (centre.0, px(label_y)),
                gear_font
                    .color(&rgb(TEXT_COLOR))
                    .pos(Pos::new(HPos::Center, v_pos)),
            ))?;
        }

        root.draw(&Text::new(
            row.name.as_str(),
            (px(row.name_x), px(row.y)),
            name_font
                .color(&rgb(TEXT_COLOR))
                .pos(Pos::new(HPos::Left, VPos::Center)),
        ))?;
    }

    root.present()?;
    Ok(())
}

/// Delegating backend that keeps gear and grid labels legible when no
/// system font can be loaded, using a built-in digit font.
struct FontSafeBackend<DB> {
    inner: DB,
    fallback_reported: bool,
}

impl<DB> FontSafeBackend<DB> {
    fn new(inner: DB) -> Self {
        Self {
            inner,
            fallback_reported: false,
        }
    }
}

impl<DB: DrawingBackend> DrawingBackend for FontSafeBackend<DB> {
    type ErrorType = DB::ErrorType;

    fn get_size(&self) -> (u32, u32) {
        self.inner.get_size()
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.ensure_prepared()
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.present()
    }

    fn draw_pixel(
        &mut self,
        point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_pixel(point, color)
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_line(from, to, style)
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_rect(upper_left, bottom_right, style, fill)
    }

    fn draw_path<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        path: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_path(path, style)
    }

    fn draw_circle<S: BackendStyle>(
        &mut self,
        center: BackendCoord,
        radius: u32,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_circle(center, radius, style, fill)
    }

    fn fill_polygon<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        vert: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.fill_polygon(vert, style)
    }

    fn blit_bitmap(
        &mut self,
        pos: BackendCoord,
        (iw, ih): (u32, u32),
        src: &[u8],
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.blit_bitmap(pos, (iw, ih), src)
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let attempt = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.inner.draw_text(text, style, pos)
        }));
        match attempt {
            Ok(Err(DrawingErrorKind::FontError(err))) => {
                self.report_fallback(&err.to_string());
                self.draw_digits(text, style, pos)
            }
            Ok(result) => result,
            Err(_) => {
                self.report_fallback("font backend panicked");
                self.draw_digits(text, style, pos)
            }
        }
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Self::ErrorType>> {
        match panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.inner.estimate_text_size(text, style)
        })) {
            Ok(Ok(size)) => Ok(size),
            _ => {
                let (w, h) = digit_text_size(text, style.size());
                Ok((w as u32, h as u32))
            }
        }
    }
}

const DIGIT_WIDTH: i32 = 3;
const DIGIT_HEIGHT: i32 = 5;

impl<DB: DrawingBackend> FontSafeBackend<DB> {
    fn report_fallback(&mut self, reason: &str) {
        if !self.fallback_reported {
            warn!("No usable font ({}); drawing digits only", reason);
            self.fallback_reported = true;
        }
    }

    fn draw_digits<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        let color = style.color();
        if color.alpha == 0.0 || text.trim().is_empty() {
            return Ok(());
        }
        let scale = digit_scale(style.size());
        let (width, height) = digit_text_size(text, style.size());
        let anchor = style.anchor();
        let left = pos.0
            - match anchor.h_pos {
                HPos::Left => 0,
                HPos::Center => width / 2,
                HPos::Right => width,
            };
        let top = pos.1
            - match anchor.v_pos {
                VPos::Top => 0,
                VPos::Center => height / 2,
                VPos::Bottom => height,
            };

        for (idx, ch) in text.chars().enumerate() {
            let Some(rows) = digit_glyph(ch) else {
                continue;
            };
            let origin_x = left + idx as i32 * (DIGIT_WIDTH + 1) * scale;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..DIGIT_WIDTH {
                    if bits & (1 << (DIGIT_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    let x = origin_x + col * scale;
                    let y = top + row as i32 * scale;
                    self.inner
                        .draw_rect((x, y), (x + scale - 1, y + scale - 1), &color, true)?;
                }
            }
        }
        Ok(())
    }
}

/// Pixels per glyph cell so digits reach roughly cap height.
fn digit_scale(font_size: f64) -> i32 {
    ((font_size * 0.7 / DIGIT_HEIGHT as f64).round() as i32).max(1)
}

fn digit_text_size(text: &str, font_size: f64) -> (i32, i32) {
    let scale = digit_scale(font_size);
    let chars = text.chars().count() as i32;
    let width = (chars * (DIGIT_WIDTH + 1) - 1).max(0) * scale;
    (width, DIGIT_HEIGHT * scale)
}

fn digit_glyph(ch: char) -> Option<[u8; DIGIT_HEIGHT as usize]> {
    Some(match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '-' | '\u{2013}' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gear_chart::{layout, parse_bikes};

    fn chart(width: u32, height: u32) -> ChartLayout {
        let bikes = parse_bikes("# Road\nfront: 50, 34\nrear: 11, 13, 15, 17, 19, 21, 24, 28\n")
            .unwrap();
        layout(&bikes, (width, height)).unwrap()
    }

    #[test]
    fn markers_land_on_the_bitmap() {
        let chart = chart(400, 200);
        let (w, h) = canvas_size(&chart);
        let mut buffer = vec![0u8; (w * h * 3) as usize];
        {
            let backend = BitMapBackend::with_buffer(&mut buffer, (w, h));
            let root = FontSafeBackend::new(backend).into_drawing_area();
            draw_layout(root, &chart).unwrap();
        }
        let marker = chart.rows[0]
            .markers
            .iter()
            .find(|m| !m.flagged)
            .unwrap();
        let idx = ((px(marker.y) as u32 * w + px(marker.x) as u32) * 3) as usize;
        assert_eq!(&buffer[idx..idx + 3], &[200, 200, 200]);
    }

    #[test]
    fn downscale_keeps_or_shrinks() {
        let image = RgbImage::from_pixel(8, 4, image::Rgb([255, 255, 255]));
        assert_eq!(downscale(image.clone(), (8, 4)).dimensions(), (8, 4));
        let small = downscale(image, (2, 1));
        assert_eq!(small.dimensions(), (2, 1));
        assert_eq!(small.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn digit_font_metrics() {
        assert_eq!(digit_scale(1.0), 1);
        assert_eq!(digit_scale(50.0), 7);
        assert_eq!(digit_text_size("2\u{2013}5", 50.0), (11 * 7, 35));
        assert!(digit_glyph('A').is_none());
        assert!(digit_glyph('\u{2013}').is_some());
    }
}
