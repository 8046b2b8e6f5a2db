//! Detection overlay.
//!
//! Every detection cycle is a full redraw: resize the surface to the frame,
//! clear it, then draw each box and its `"<class> (<score>%)"` label in set
//! order. Nothing is carried between redraws.

mod display_list;
#[cfg(feature = "overlay-raster")]
mod raster;

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::detect::{BoundingBox, DetectedObject, DetectionSet};
use crate::frame::FrameGeometry;

pub use display_list::{DisplayList, Primitive};
#[cfg(feature = "overlay-raster")]
pub use raster::RasterSurface;

/// Labels for boxes closer than this to the top edge are pinned here.
pub const LABEL_TOP_MARGIN: f32 = 10.0;
/// Gap between a box's top edge and its label baseline.
pub const LABEL_OFFSET: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    /// RGBA stroke and text color.
    pub color: [u8; 4],
    pub line_width: u32,
    pub font_px: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: [0, 255, 0, 255],
            line_width: 2,
            font_px: 18.0,
        }
    }
}

/// Drawing target for the overlay.
pub trait Surface {
    /// Match the frame's pixel size. Implementations drop all prior content.
    fn resize(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn stroke_rect(&mut self, rect: &BoundingBox, style: &OverlayStyle);
    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &OverlayStyle);
}

impl<S: Surface + ?Sized> Surface for Box<S> {
    fn resize(&mut self, width: u32, height: u32) {
        (**self).resize(width, height)
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn stroke_rect(&mut self, rect: &BoundingBox, style: &OverlayStyle) {
        (**self).stroke_rect(rect, style)
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &OverlayStyle) {
        (**self).fill_text(text, x, y, style)
    }
}

/// Surface shared between the session and an observer (UI, snapshot writer).
pub struct SharedSurface<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> SharedSurface<S> {
    pub fn new(surface: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(surface)),
        }
    }

    /// Lock the surface for reading. A poisoned lock is recovered; the
    /// surface is fully redrawn every cycle anyway.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S> Clone for SharedSurface<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Surface> Surface for SharedSurface<S> {
    fn resize(&mut self, width: u32, height: u32) {
        self.lock().resize(width, height)
    }

    fn clear(&mut self) {
        self.lock().clear()
    }

    fn stroke_rect(&mut self, rect: &BoundingBox, style: &OverlayStyle) {
        self.lock().stroke_rect(rect, style)
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &OverlayStyle) {
        self.lock().fill_text(text, x, y, style)
    }
}

/// `"<class> (<score*100, one decimal>%)"`.
///
/// Scaled in f64: in f32 a score like 0.8725 lands exactly on 87.25 and
/// rounds down.
pub fn label_text(obj: &DetectedObject) -> String {
    format!("{} ({:.1}%)", obj.class, f64::from(obj.score) * 100.0)
}

/// Label baseline: just above the box, or pinned near the top edge.
pub fn label_origin(bbox: &BoundingBox) -> (f32, f32) {
    let y = if bbox.y > LABEL_TOP_MARGIN {
        bbox.y - LABEL_OFFSET
    } else {
        LABEL_TOP_MARGIN
    };
    (bbox.x, y)
}

pub struct OverlayRenderer<S> {
    surface: S,
    style: OverlayStyle,
    redraws: u64,
}

impl<S: Surface> OverlayRenderer<S> {
    pub fn new(surface: S, style: OverlayStyle) -> Self {
        Self {
            surface,
            style,
            redraws: 0,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    pub fn render(&mut self, set: &DetectionSet, geometry: FrameGeometry) {
        self.surface.resize(geometry.width, geometry.height);
        self.surface.clear();
        for obj in set {
            self.surface.stroke_rect(&obj.bbox, &self.style);
            let (x, y) = label_origin(&obj.bbox);
            self.surface.fill_text(&label_text(obj), x, y, &self.style);
        }
        self.redraws += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(class: &str, score: f32, x: f32, y: f32) -> DetectedObject {
        DetectedObject::new(class, score, BoundingBox::new(x, y, 20.0, 30.0))
    }

    #[test]
    fn label_formats_percent_with_one_decimal() {
        assert_eq!(label_text(&obj("person", 0.8761, 0.0, 0.0)), "person (87.6%)");
        assert_eq!(label_text(&obj("dog", 1.0, 0.0, 0.0)), "dog (100.0%)");
    }

    #[test]
    fn label_rounds_half_tenths_up() {
        assert_eq!(label_text(&obj("person", 0.8725, 0.0, 0.0)), "person (87.3%)");
        assert_eq!(label_text(&obj("cat", 0.1225, 0.0, 0.0)), "cat (12.3%)");
    }

    #[test]
    fn label_sits_above_box_or_pins_to_top() {
        assert_eq!(label_origin(&BoundingBox::new(4.0, 50.0, 1.0, 1.0)), (4.0, 45.0));
        assert_eq!(label_origin(&BoundingBox::new(4.0, 10.0, 1.0, 1.0)), (4.0, 10.0));
        assert_eq!(label_origin(&BoundingBox::new(4.0, 2.0, 1.0, 1.0)), (4.0, 10.0));
    }

    #[test]
    fn redraw_replaces_previous_cycle() {
        let mut renderer = OverlayRenderer::new(DisplayList::default(), OverlayStyle::default());
        renderer.render(
            &DetectionSet::new(vec![
                obj("person", 0.9, 10.0, 40.0),
                obj("dog", 0.6, 100.0, 5.0),
                obj("cup", 0.5, 200.0, 80.0),
            ]),
            FrameGeometry::new(640, 480),
        );
        assert_eq!(renderer.surface().boxes().count(), 3);

        renderer.render(
            &DetectionSet::new(vec![obj("person", 0.95, 12.0, 41.0)]),
            FrameGeometry::new(1280, 720),
        );
        let list = renderer.surface();
        assert_eq!((list.width(), list.height()), (1280, 720));
        assert_eq!(list.boxes().count(), 1);
        assert_eq!(list.labels().collect::<Vec<_>>(), vec!["person (95.0%)"]);
        assert_eq!(renderer.redraws(), 2);
    }

    #[test]
    fn draw_order_follows_set_order() {
        let mut renderer = OverlayRenderer::new(DisplayList::default(), OverlayStyle::default());
        renderer.render(
            &DetectionSet::new(vec![obj("b", 0.5, 0.0, 20.0), obj("a", 0.5, 0.0, 20.0)]),
            FrameGeometry::new(100, 100),
        );
        let labels: Vec<_> = renderer.surface().labels().collect();
        assert_eq!(labels, vec!["b (50.0%)", "a (50.0%)"]);
    }

    #[test]
    fn shared_surface_is_visible_to_observer() {
        let shared = SharedSurface::new(DisplayList::default());
        let observer = shared.clone();
        let mut renderer =
            OverlayRenderer::new(Box::new(shared) as Box<dyn Surface>, OverlayStyle::default());
        renderer.render(
            &DetectionSet::new(vec![obj("person", 0.9, 10.0, 40.0)]),
            FrameGeometry::new(320, 240),
        );
        assert_eq!(observer.lock().boxes().count(), 1);
        assert_eq!(observer.lock().width(), 320);
    }
}
