use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed category enumeration shared with the vision prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Electronics,
    Furniture,
    Kitchenware,
    Books,
    Clothing,
    Tools,
    Decor,
    Appliances,
    Sports,
    Toys,
    Other,
}

impl Category {
    /// Lenient parse of whatever string the model hands back.
    /// Unknown labels fold into `Other`; absence is the caller's problem.
    pub fn parse(label: &str) -> Category {
        match label.trim().to_ascii_lowercase().as_str() {
            "electronics" => Category::Electronics,
            "furniture" => Category::Furniture,
            "kitchenware" => Category::Kitchenware,
            "books" | "book" => Category::Books,
            "clothing" => Category::Clothing,
            "tools" => Category::Tools,
            "decor" => Category::Decor,
            "appliances" => Category::Appliances,
            "sports" => Category::Sports,
            "toys" => Category::Toys,
            _ => Category::Other,
        }
    }

    pub fn is_printed_material(&self) -> bool {
        matches!(self, Category::Books)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    New,
    Good,
    Fair,
    Poor,
}

/// Normalized `[x1, y1, x2, y2]`, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Rejects coordinates outside [0,1] or boxes with no area.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<BoundingBox> {
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        if in_range(x1) && in_range(y1) && in_range(x2) && in_range(y2) && x2 > x1 && y2 > y1 {
            Some(BoundingBox { x1, y1, x2, y2 })
        } else {
            None
        }
    }

    /// Pixel rectangle `(x, y, w, h)` within an image of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x = (self.x1 * width as f32) as u32;
        let y = (self.y1 * height as f32) as u32;
        let w = ((self.x2 - self.x1) * width as f32).max(1.0) as u32;
        let h = ((self.y2 - self.y1) * height as f32).max(1.0) as u32;
        (x.min(width - 1), y.min(height - 1), w, h)
    }
}

/// One per-frame detection as reported by the vision model, before any
/// cross-frame merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub name: String,
    pub description: String,
    pub category: Category,
    pub is_book: bool,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
    pub needs_closer_look: bool,
    pub closer_look_reason: Option<String>,
    pub estimated_value_usd: Option<f64>,
    pub condition: Option<Condition>,
    /// Detail-profile extras; absent on survey detections.
    pub brand: Option<String>,
    pub model_number: Option<String>,
    pub visible_text: Option<String>,
    pub barcode_present: bool,
    /// Evidentiary reference to the keyframe this came from.
    pub source_keyframe: Uuid,
}

impl DetectedObject {
    pub fn with_source(mut self, keyframe: Uuid) -> Self {
        self.source_keyframe = keyframe;
        self
    }
}
