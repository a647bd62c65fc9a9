use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::detection::DetectedObject;

/// The deduplicated representation of one physical object: a representative
/// detection plus every constituent detection that merged into it.
///
/// Invariant: across a session, member sets partition the retained
/// detections. A detection belongs to exactly one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalCandidate {
    pub id: Uuid,
    /// The highest-confidence constituent.
    pub representative: DetectedObject,
    pub members: Vec<DetectedObject>,
    pub keyframes: Vec<Uuid>,
    /// Max across constituents; one clear view should not be dragged down
    /// by obstructed views of the same object.
    pub confidence: f32,
    /// OR across constituents.
    pub needs_closer_look: bool,
    /// Monotonic merge tick, used for recency tie-breaks.
    pub updated_tick: u64,
}

impl CanonicalCandidate {
    pub fn seed(detection: DetectedObject, tick: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            confidence: detection.confidence,
            needs_closer_look: detection.needs_closer_look,
            keyframes: vec![detection.source_keyframe],
            members: vec![detection.clone()],
            representative: detection,
            updated_tick: tick,
        }
    }

    /// Fold one more detection in, keeping the aggregate policy:
    /// representative and confidence follow the best view, the
    /// closer-look flag is sticky.
    pub fn merge(&mut self, detection: DetectedObject, tick: u64) {
        if !self.keyframes.contains(&detection.source_keyframe) {
            self.keyframes.push(detection.source_keyframe);
        }
        self.needs_closer_look |= detection.needs_closer_look;
        if detection.confidence > self.confidence {
            self.confidence = detection.confidence;
            self.representative = detection.clone();
        }
        self.members.push(detection);
        self.updated_tick = tick;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::detection::Category;

    fn obj(name: &str, confidence: f32, closer: bool) -> DetectedObject {
        DetectedObject {
            name: name.to_string(),
            description: String::new(),
            category: Category::Decor,
            is_book: false,
            confidence,
            bounding_box: None,
            needs_closer_look: closer,
            closer_look_reason: None,
            estimated_value_usd: None,
            condition: None,
            brand: None,
            model_number: None,
            visible_text: None,
            barcode_present: false,
            source_keyframe: Uuid::new_v4(),
        }
    }

    #[test]
    fn merge_keeps_best_view() {
        let mut c = CanonicalCandidate::seed(obj("lamp", 0.6, true), 0);
        c.merge(obj("brass lamp", 0.9, false), 1);
        assert_eq!(c.representative.name, "brass lamp");
        assert_eq!(c.confidence, 0.9);
        assert!(c.needs_closer_look, "flag is an OR, stays set");
        assert_eq!(c.members.len(), 2);
        assert_eq!(c.keyframes.len(), 2);
    }

    #[test]
    fn merge_with_lower_confidence_keeps_representative() {
        let mut c = CanonicalCandidate::seed(obj("lamp", 0.9, false), 0);
        c.merge(obj("blurry lamp", 0.3, false), 1);
        assert_eq!(c.representative.name, "lamp");
        assert_eq!(c.confidence, 0.9);
    }
}
