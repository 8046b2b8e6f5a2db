#![cfg(feature = "overlay-raster")]

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use super::{OverlayStyle, Surface};
use crate::detect::BoundingBox;

/// Transparent RGBA overlay, composited over the video by the caller.
///
/// Labels are only rendered when a font is supplied.
pub struct RasterSurface {
    image: RgbaImage,
    font: Option<FontArc>,
}

impl RasterSurface {
    pub fn new() -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            font: None,
        }
    }

    /// Load a TTF/OTF font for labels.
    pub fn with_font_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

impl Default for RasterSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for RasterSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn stroke_rect(&mut self, rect: &BoundingBox, style: &OverlayStyle) {
        let color = Rgba(style.color);
        // Stroke grows inward, one pixel ring per unit of line width.
        for inset in 0..style.line_width.max(1) {
            let width = rect.width.round() as i64 - 2 * inset as i64;
            let height = rect.height.round() as i64 - 2 * inset as i64;
            if width <= 0 || height <= 0 {
                break;
            }
            let ring = Rect::at(
                rect.x.round() as i32 + inset as i32,
                rect.y.round() as i32 + inset as i32,
            )
            .of_size(width as u32, height as u32);
            draw_hollow_rect_mut(&mut self.image, ring, color);
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &OverlayStyle) {
        let Some(font) = self.font.as_ref() else {
            log::debug!("no overlay font loaded; skipping label '{}'", text);
            return;
        };
        // `y` is a baseline; imageproc positions text by its top edge.
        let top = (y - style.font_px).max(0.0);
        draw_text_mut(
            &mut self.image,
            Rgba(style.color),
            x.round() as i32,
            top.round() as i32,
            PxScale::from(style.font_px),
            font,
            text,
        );
    }
}
