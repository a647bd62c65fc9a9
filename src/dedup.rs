use std::cmp::Ordering;
use std::collections::HashMap;

use imghash::ImageHash;
use tracing::trace;
use uuid::Uuid;

use crate::config::Configuration;
use crate::types::{CanonicalCandidate, DetectedObject};

/// Result of absorbing one detection: which candidate now owns it, and
/// whether that was a merge into an existing candidate or a fresh seed.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub candidate_id: Uuid,
    pub merged: bool,
}

/// Merges detections that likely refer to the same physical object,
/// incrementally as they arrive, so the running candidate count stays
/// accurate mid-session.
///
/// Matching requires an exact category match, then either textual
/// similarity or crop-fingerprint similarity — a tight shot and a wide
/// shot of the same object may share almost no text but look alike, or
/// vice versa for partially occluded views.
pub struct Deduplicator {
    candidates: Vec<CanonicalCandidate>,
    /// Crop fingerprints per candidate; kept out of the wire type.
    fingerprints: HashMap<Uuid, Vec<ImageHash>>,
    name_threshold: f64,
    weak_name_threshold: f64,
    description_threshold: f64,
    crop_distance: usize,
    tick: u64,
}

impl Deduplicator {
    pub fn new(config: &Configuration) -> Self {
        Self {
            candidates: Vec::new(),
            fingerprints: HashMap::new(),
            name_threshold: config.name_similarity,
            weak_name_threshold: config.weak_name_similarity,
            description_threshold: config.description_similarity,
            crop_distance: config.crop_distance,
            tick: 0,
        }
    }

    pub fn candidates(&self) -> &[CanonicalCandidate] {
        &self.candidates
    }

    pub fn candidate(&self, id: Uuid) -> Option<&CanonicalCandidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn into_candidates(self) -> Vec<CanonicalCandidate> {
        self.candidates
    }

    /// Route one detection to the candidate it belongs to, or seed a new
    /// one. `fingerprint` is the perceptual hash of the detection's
    /// bounding-box crop, when a usable box was reported.
    pub fn absorb(
        &mut self,
        detection: DetectedObject,
        fingerprint: Option<ImageHash>,
    ) -> MergeOutcome {
        let tick = self.next_tick();
        let target = self.best_match(&detection, fingerprint.as_ref());

        match target {
            Some(index) => {
                let candidate = &mut self.candidates[index];
                trace!(candidate = %candidate.id, name = %detection.name, "merged detection");
                candidate.merge(detection, tick);
                let id = candidate.id;
                if let Some(fp) = fingerprint {
                    self.fingerprints.entry(id).or_default().push(fp);
                }
                MergeOutcome {
                    candidate_id: id,
                    merged: true,
                }
            }
            None => {
                let candidate = CanonicalCandidate::seed(detection, tick);
                let id = candidate.id;
                if let Some(fp) = fingerprint {
                    self.fingerprints.insert(id, vec![fp]);
                }
                self.candidates.push(candidate);
                MergeOutcome {
                    candidate_id: id,
                    merged: false,
                }
            }
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// All matching candidates compete; higher aggregated confidence wins,
    /// ties break toward the most recently updated (a walkthrough tends to
    /// revisit what it just saw).
    fn best_match(
        &self,
        detection: &DetectedObject,
        fingerprint: Option<&ImageHash>,
    ) -> Option<usize> {
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, candidate)| {
                candidate.representative.category == detection.category
                    && (self.text_match(candidate, detection)
                        || self.image_match(candidate.id, fingerprint))
            })
            .max_by(|(_, a), (_, b)| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(Ordering::Equal)
                    .then(a.updated_tick.cmp(&b.updated_tick))
            })
            .map(|(index, _)| index)
    }

    fn text_match(&self, candidate: &CanonicalCandidate, detection: &DetectedObject) -> bool {
        let repr = &candidate.representative;
        let name_sim = strsim::normalized_levenshtein(
            &repr.name.to_lowercase(),
            &detection.name.to_lowercase(),
        );
        if name_sim > self.name_threshold {
            return true;
        }
        let desc_sim = strsim::normalized_levenshtein(
            &repr.description.to_lowercase(),
            &detection.description.to_lowercase(),
        );
        name_sim > self.weak_name_threshold && desc_sim > self.description_threshold
    }

    fn image_match(&self, candidate_id: Uuid, fingerprint: Option<&ImageHash>) -> bool {
        let Some(fp) = fingerprint else {
            return false;
        };
        self.fingerprints
            .get(&candidate_id)
            .map(|known| {
                known
                    .iter()
                    .any(|k| k.distance(fp).unwrap_or(usize::MAX) <= self.crop_distance)
            })
            .unwrap_or(false)
    }
}
