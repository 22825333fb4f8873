use serde::{Deserialize, Serialize};

/// Axis-aligned face bounding box in processing-resolution pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Box center point.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Euclidean distance between the centers of two boxes.
    pub fn center_distance(&self, other: &BoundingBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Confidence classification of a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Recognized,
    BelowThreshold,
    Unrecognized,
}

/// Split a `<displayName>_<studentId>` label from the recognition service.
///
/// The student ID is the LAST underscore-delimited segment; everything
/// before it is the display name, so names containing underscores survive:
/// `"Anna_Marie_S1023"` → `("Anna_Marie", "S1023")`.
///
/// Returns `None` for labels with no underscore or an empty side; callers
/// treat those as a protocol fault.
pub fn parse_label(label: &str) -> Option<(&str, &str)> {
    let (name, id) = label.rsplit_once('_')?;
    if name.is_empty() || id.is_empty() {
        return None;
    }
    Some((name, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label_simple() {
        assert_eq!(parse_label("John_S2001"), Some(("John", "S2001")));
    }

    #[test]
    fn test_parse_label_underscore_in_name() {
        assert_eq!(parse_label("Anna_Marie_S1023"), Some(("Anna_Marie", "S1023")));
    }

    #[test]
    fn test_parse_label_no_underscore() {
        assert_eq!(parse_label("Anna"), None);
    }

    #[test]
    fn test_parse_label_empty_sides() {
        assert_eq!(parse_label("_S1023"), None);
        assert_eq!(parse_label("Anna_"), None);
        assert_eq!(parse_label("_"), None);
    }

    #[test]
    fn test_center_distance() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(3.0, 4.0, 10.0, 10.0);
        assert!((a.center_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounding_box_from_array() {
        let b = BoundingBox::from([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(b, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
    }
}
