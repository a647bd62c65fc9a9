use serde::Deserialize;
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::types::{BoundingBox, Category, Condition, DetectedObject};

use super::FrameAnalysis;

/// The model's reported object shape, before validation. Everything is
/// optional here; coercion decides what survives.
#[derive(Debug, Deserialize)]
struct ReportedObject {
    name: Option<String>,
    description: Option<String>,
    category: Option<String>,
    #[serde(default)]
    is_book: bool,
    #[serde(default)]
    needs_closer_look: bool,
    closer_look_reason: Option<String>,
    confidence: Option<f32>,
    estimated_value_usd: Option<f64>,
    condition: Option<String>,
    bounding_box: Option<Vec<f32>>,
    brand: Option<String>,
    model_number: Option<String>,
    visible_text: Option<String>,
    #[serde(default)]
    barcode_present: bool,
}

impl ReportedObject {
    /// An object missing a name or category is unparsable and dropped;
    /// everything else coerces with lenient defaults.
    fn coerce(self) -> Option<DetectedObject> {
        let name = self.name.filter(|n| !n.trim().is_empty())?;
        let category = Category::parse(&self.category?);
        let bounding_box = self.bounding_box.as_deref().and_then(|b| match b {
            [x1, y1, x2, y2] => BoundingBox::from_corners(*x1, *y1, *x2, *y2),
            _ => None,
        });
        Some(DetectedObject {
            name,
            description: self.description.unwrap_or_default(),
            category,
            is_book: self.is_book || category.is_printed_material(),
            confidence: self.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
            bounding_box,
            needs_closer_look: self.needs_closer_look,
            closer_look_reason: self.closer_look_reason,
            estimated_value_usd: self.estimated_value_usd,
            condition: self.condition.as_deref().and_then(parse_condition),
            brand: self.brand,
            model_number: self.model_number,
            visible_text: self.visible_text,
            barcode_present: self.barcode_present,
            source_keyframe: Uuid::nil(),
        })
    }
}

fn parse_condition(label: &str) -> Option<Condition> {
    // The model sometimes appends justification ("good - minor scuffs").
    match label
        .trim()
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
    {
        Some("new") => Some(Condition::New),
        Some("good") => Some(Condition::Good),
        Some("fair") => Some(Condition::Fair),
        Some("poor") => Some(Condition::Poor),
        _ => None,
    }
}

/// Models wrap JSON in markdown fences often enough that stripping them
/// is part of the contract.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.rsplit_once("```").map(|(b, _)| b).unwrap_or(body).trim()
}

/// Coerce the model's free-text reply into typed detections. A reply that
/// is not JSON at all is a parse failure; individual malformed objects are
/// dropped and counted, never failing the batch.
pub fn parse_detections(text: &str) -> Result<FrameAnalysis, AnalysisError> {
    let body = strip_fences(text);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| AnalysisError::Parse)?;

    // A detail reply is a single object; normalize to a batch.
    let entries = match value {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        _ => return Err(AnalysisError::Parse),
    };

    let mut analysis = FrameAnalysis::default();
    for entry in entries {
        match serde_json::from_value::<ReportedObject>(entry) {
            Ok(reported) => match reported.coerce() {
                Some(object) => analysis.objects.push(object),
                None => analysis.skipped += 1,
            },
            Err(_) => analysis.skipped += 1,
        }
    }
    Ok(analysis)
}
