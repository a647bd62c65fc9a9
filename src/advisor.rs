use std::collections::HashSet;

use uuid::Uuid;

use crate::config::Configuration;
use crate::types::{AdvisoryKind, CanonicalCandidate, ModeSwitchAdvisory};

/// Evaluates candidates against a fixed rule table after each merge and
/// surfaces each distinguishing condition at most once per candidate per
/// session — no repeated nagging for the same object and reason.
pub struct ModeSwitchAdvisor {
    low_confidence: f32,
    high_value_usd: f64,
    surfaced: HashSet<(Uuid, AdvisoryKind)>,
}

impl ModeSwitchAdvisor {
    pub fn new(config: &Configuration) -> Self {
        Self {
            low_confidence: config.low_confidence,
            high_value_usd: config.high_value_usd,
            surfaced: HashSet::new(),
        }
    }

    /// Re-evaluate a candidate after a merge; returns only newly surfaced
    /// advisories.
    pub fn review(&mut self, candidate: &CanonicalCandidate) -> Vec<ModeSwitchAdvisory> {
        self.triggers(candidate)
            .into_iter()
            .filter(|(kind, _)| self.surfaced.insert((candidate.id, *kind)))
            .map(|(kind, message)| ModeSwitchAdvisory {
                kind,
                candidate_id: candidate.id,
                message,
            })
            .collect()
    }

    fn triggers(&self, candidate: &CanonicalCandidate) -> Vec<(AdvisoryKind, String)> {
        let mut out = Vec::new();
        let repr = &candidate.representative;
        let name = &repr.name;
        let printed = repr.is_book || repr.category.is_printed_material();
        // Every constituent's reason counts. A later obstructed sighting
        // must not be masked by an earlier sighting's different complaint.
        let reasons: Vec<String> = candidate
            .members
            .iter()
            .filter(|m| m.needs_closer_look)
            .filter_map(|m| m.closer_look_reason.as_deref())
            .map(str::to_lowercase)
            .collect();
        let reported = |matches: fn(&str) -> bool| reasons.iter().any(|r| matches(r));

        if printed && candidate.needs_closer_look && reported(mentions_text) {
            out.push((
                AdvisoryKind::BookSpineUnreadable,
                format!("\"{name}\": switch to close-up mode to capture the spine or cover"),
            ));
        }
        if !printed && candidate.needs_closer_look && reported(mentions_text) {
            out.push((
                AdvisoryKind::SmallText,
                format!("\"{name}\": text or serial number is illegible, take a close-up"),
            ));
        }
        if candidate.needs_closer_look && reported(mentions_occlusion) {
            out.push((
                AdvisoryKind::Occlusion,
                format!("\"{name}\": partially hidden, take an unobstructed close-up"),
            ));
        }
        if candidate.confidence < self.low_confidence {
            out.push((
                AdvisoryKind::LowConfidence,
                format!(
                    "\"{name}\": identified with {:.0}% confidence, a close-up would confirm it",
                    candidate.confidence * 100.0
                ),
            ));
        }
        if repr
            .estimated_value_usd
            .map(|v| v >= self.high_value_usd)
            .unwrap_or(false)
        {
            out.push((
                AdvisoryKind::HighValue,
                format!("\"{name}\": looks valuable, take a close-up for documentation"),
            ));
        }
        if (repr.barcode_present || reported(mentions_barcode)) && candidate.needs_closer_look {
            out.push((
                AdvisoryKind::BarcodeVisible,
                format!("\"{name}\": barcode visible but unreadable, take a close-up to scan it"),
            ));
        }
        out
    }
}

fn mentions_text(reason: &str) -> bool {
    ["text", "spine", "title", "label", "serial", "model number", "writing"]
        .iter()
        .any(|needle| reason.contains(needle))
}

fn mentions_occlusion(reason: &str) -> bool {
    ["occlu", "hidden", "blocked", "obstruct", "behind", "covered"]
        .iter()
        .any(|needle| reason.contains(needle))
}

fn mentions_barcode(reason: &str) -> bool {
    reason.contains("barcode") || reason.contains("qr code")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, DetectedObject};

    fn sighting(
        name: &str,
        category: Category,
        confidence: f32,
        closer_reason: Option<&str>,
        value: Option<f64>,
    ) -> DetectedObject {
        DetectedObject {
            name: name.to_string(),
            description: String::new(),
            category,
            is_book: category == Category::Books,
            confidence,
            bounding_box: None,
            needs_closer_look: closer_reason.is_some(),
            closer_look_reason: closer_reason.map(str::to_string),
            estimated_value_usd: value,
            condition: None,
            brand: None,
            model_number: None,
            visible_text: None,
            barcode_present: false,
            source_keyframe: Uuid::new_v4(),
        }
    }

    fn candidate(
        name: &str,
        category: Category,
        confidence: f32,
        closer_reason: Option<&str>,
        value: Option<f64>,
    ) -> CanonicalCandidate {
        CanonicalCandidate::seed(sighting(name, category, confidence, closer_reason, value), 0)
    }

    fn advisor() -> ModeSwitchAdvisor {
        ModeSwitchAdvisor::new(&Configuration::default())
    }

    #[test]
    fn unreadable_spine_and_low_confidence_both_fire_once() {
        let mut advisor = advisor();
        let c = candidate(
            "Paperback novels",
            Category::Books,
            0.5,
            Some("Book spine text is too small to read reliably"),
            None,
        );
        let first = advisor.review(&c);
        let kinds: Vec<AdvisoryKind> = first.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&AdvisoryKind::BookSpineUnreadable));
        assert!(kinds.contains(&AdvisoryKind::LowConfidence));
        assert_eq!(kinds.len(), 2);

        // A later merge re-reviews the same candidate: nothing new.
        assert!(advisor.review(&c).is_empty());
    }

    #[test]
    fn occlusion_advisory() {
        let mut advisor = advisor();
        let c = candidate(
            "Mystery appliance",
            Category::Appliances,
            0.9,
            Some("Partially hidden behind the couch"),
            None,
        );
        let advisories = advisor.review(&c);
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].kind, AdvisoryKind::Occlusion);
    }

    #[test]
    fn high_value_advisory() {
        let mut advisor = advisor();
        let c = candidate("OLED TV", Category::Electronics, 0.95, None, Some(1800.0));
        let advisories = advisor.review(&c);
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].kind, AdvisoryKind::HighValue);
    }

    #[test]
    fn confident_plain_candidate_stays_quiet() {
        let mut advisor = advisor();
        let c = candidate("Lamp", Category::Decor, 0.9, None, None);
        assert!(advisor.review(&c).is_empty());
    }

    #[test]
    fn barcode_advisory() {
        let mut advisor = advisor();
        let c = candidate(
            "Board game box",
            Category::Toys,
            0.8,
            Some("Barcode visible but unreadable at this distance"),
            None,
        );
        let advisories = advisor.review(&c);
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].kind, AdvisoryKind::BarcodeVisible);
    }

    #[test]
    fn second_sighting_reason_surfaces_its_own_kind() {
        let mut advisor = advisor();
        let mut c = candidate(
            "AV receiver",
            Category::Electronics,
            0.9,
            Some("Serial text too small to read"),
            None,
        );
        let first = advisor.review(&c);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, AdvisoryKind::SmallText);

        // A later view of the same object complains about something else;
        // its reason must trigger on its own merit.
        c.merge(
            sighting(
                "AV receiver",
                Category::Electronics,
                0.85,
                Some("Partially hidden behind the couch"),
                None,
            ),
            1,
        );
        let second = advisor.review(&c);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].kind, AdvisoryKind::Occlusion);
    }

    #[test]
    fn same_kind_for_different_candidates_both_surface() {
        let mut advisor = advisor();
        let a = candidate("Thing A", Category::Decor, 0.3, None, None);
        let b = candidate("Thing B", Category::Decor, 0.3, None, None);
        assert_eq!(advisor.review(&a).len(), 1);
        assert_eq!(advisor.review(&b).len(), 1);
    }
}
