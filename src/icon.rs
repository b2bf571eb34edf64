use eframe::egui;
use fontdue::{Font, FontSettings};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::debug;

/// Glyphs tried in order; the bundled fonts do not all carry the mirror ball.
const ICON_GLYPHS: &[char] = &['🪩', '🔍', '◉'];

/// egui's bundled fonts, searched in order.
const ICON_FONTS: &[&str] = &["NotoEmoji-Regular", "emoji-icon-font", "Ubuntu-Light"];

const RENDER_PX: f32 = 256.0;

/// Renders the app glyph large, centers it on a transparent square and
/// shrinks it to `size` x `size`.
pub fn glyph_icon(size: u32) -> Option<egui::IconData> {
    let image = render_glyph()?;
    let image = imageops::resize(&image, size, size, FilterType::Lanczos3);
    Some(egui::IconData {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

fn render_glyph() -> Option<RgbaImage> {
    let fonts = egui::FontDefinitions::default();

    for name in ICON_FONTS {
        let Some(data) = fonts.font_data.get(*name) else {
            continue;
        };
        let font = match Font::from_bytes(&*data.font, FontSettings::default()) {
            Ok(font) => font,
            Err(e) => {
                debug!("Skipping icon font {}: {}", name, e);
                continue;
            }
        };
        for &glyph in ICON_GLYPHS {
            if font.lookup_glyph_index(glyph) == 0 {
                continue;
            }
            let (metrics, coverage) = font.rasterize(glyph, RENDER_PX);
            if metrics.width == 0 || metrics.height == 0 {
                continue;
            }
            debug!("Icon glyph {:?} from {}", glyph, name);
            return Some(square_canvas(metrics.width, metrics.height, &coverage));
        }
    }
    None
}

/// Places a coverage bitmap in the middle of a square transparent canvas.
fn square_canvas(width: usize, height: usize, coverage: &[u8]) -> RgbaImage {
    let side = width.max(height) as u32;
    let mut canvas = RgbaImage::new(side, side);
    let x0 = (side - width as u32) / 2;
    let y0 = (side - height as u32) / 2;

    for (i, &alpha) in coverage.iter().enumerate() {
        if alpha == 0 {
            continue;
        }
        let x = x0 + (i % width) as u32;
        let y = y0 + (i / width) as u32;
        canvas.put_pixel(x, y, Rgba([32, 32, 32, alpha]));
    }
    canvas
}
