use serde::Serialize;

use super::{OverlayStyle, Surface};
use crate::detect::BoundingBox;

/// A drawn primitive.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Primitive {
    Rect {
        rect: BoundingBox,
        color: [u8; 4],
        line_width: u32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        color: [u8; 4],
        font_px: f32,
    },
}

/// Retained record of what the last redraw put on screen.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DisplayList {
    width: u32,
    height: u32,
    primitives: Vec<Primitive>,
}

impl DisplayList {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn boxes(&self) -> impl Iterator<Item = &BoundingBox> {
        self.primitives.iter().filter_map(|p| match p {
            Primitive::Rect { rect, .. } => Some(rect),
            Primitive::Text { .. } => None,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.primitives.iter().filter_map(|p| match p {
            Primitive::Text { text, .. } => Some(text.as_str()),
            Primitive::Rect { .. } => None,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Surface for DisplayList {
    fn resize(&mut self, width: u32, height: u32) {
        // Resizing a canvas wipes it.
        self.width = width;
        self.height = height;
        self.primitives.clear();
    }

    fn clear(&mut self) {
        self.primitives.clear();
    }

    fn stroke_rect(&mut self, rect: &BoundingBox, style: &OverlayStyle) {
        self.primitives.push(Primitive::Rect {
            rect: *rect,
            color: style.color,
            line_width: style.line_width,
        });
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &OverlayStyle) {
        self.primitives.push(Primitive::Text {
            text: text.to_string(),
            x,
            y,
            color: style.color,
            font_px: style.font_px,
        });
    }
}
