use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame-pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One detection produced by a single detector invocation.
///
/// Objects carry no identity across cycles; a new set is produced for every
/// sampled frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub class: String,
    /// Confidence in `[0, 1]`. Thresholding is the detector's job.
    pub score: f32,
    pub bbox: BoundingBox,
}

impl DetectedObject {
    pub fn new(class: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
        Self {
            class: class.into(),
            score,
            bbox,
        }
    }
}

/// Detections for one sampled frame, in detector output order.
///
/// Order only matters for overlay draw order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionSet {
    objects: Vec<DetectedObject>,
}

impl DetectionSet {
    pub fn new(objects: Vec<DetectedObject>) -> Self {
        Self { objects }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectedObject> {
        self.objects.iter()
    }

    pub fn contains_class(&self, class: &str) -> bool {
        self.objects.iter().any(|obj| obj.class == class)
    }

    /// Class labels other than `excluded`, deduplicated, first-seen order.
    pub fn classes_except(&self, excluded: &str) -> Vec<String> {
        let mut classes: Vec<String> = Vec::new();
        for obj in &self.objects {
            if obj.class != excluded && !classes.iter().any(|c| c == &obj.class) {
                classes.push(obj.class.clone());
            }
        }
        classes
    }
}

impl From<Vec<DetectedObject>> for DetectionSet {
    fn from(objects: Vec<DetectedObject>) -> Self {
        Self::new(objects)
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a DetectedObject;
    type IntoIter = std::slice::Iter<'a, DetectedObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(class: &str) -> DetectedObject {
        DetectedObject::new(class, 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn classes_except_dedups_in_first_seen_order() {
        let set = DetectionSet::new(vec![
            obj("dog"),
            obj("person"),
            obj("chair"),
            obj("dog"),
            obj("person"),
        ]);
        assert_eq!(set.classes_except("person"), vec!["dog", "chair"]);
        assert!(set.contains_class("person"));
        assert!(!set.contains_class("cat"));
    }

    #[test]
    fn deserializes_from_plain_array() {
        let json = r#"[{"class":"person","score":0.8,"bbox":{"x":1,"y":2,"width":3,"height":4}}]"#;
        let set: DetectionSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().bbox, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
    }
}
