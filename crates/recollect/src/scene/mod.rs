//! Scene classification
//!
//! Maps the free text of a turn to a scene category and picks the scoring
//! weights that suit it. A raid wants fresh, precise memories; a chat by the
//! campfire wants old relationships to resurface. Both functions here are
//! pure: `classify(text)` and `weights_for(classification)`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Game ticks per in-game hour
pub const TICKS_PER_HOUR: u64 = 2_500;
/// Game ticks per in-game day
pub const TICKS_PER_DAY: u64 = 24 * TICKS_PER_HOUR;

/// Scene categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    Combat,
    Social,
    Work,
    Medical,
    Research,
    Event,
    Neutral,
}

impl SceneKind {
    pub const ALL: [SceneKind; 7] = [
        SceneKind::Combat,
        SceneKind::Social,
        SceneKind::Work,
        SceneKind::Medical,
        SceneKind::Research,
        SceneKind::Event,
        SceneKind::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SceneKind::Combat => "combat",
            SceneKind::Social => "social",
            SceneKind::Work => "work",
            SceneKind::Medical => "medical",
            SceneKind::Research => "research",
            SceneKind::Event => "event",
            SceneKind::Neutral => "neutral",
        }
    }
}

impl fmt::Display for SceneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SceneKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SceneKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown scene: {s}"))
    }
}

/// Scoring weights for one scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicWeights {
    /// Weight of the recency term (archive entries only)
    pub time_decay: f32,
    pub importance_weight: f32,
    pub keyword_weight: f32,
    /// Bonus when the entry involves someone in the conversation
    pub relationship_bonus: f32,
    /// Ticks over which recency still matters
    pub recency_window: u64,
}

impl DynamicWeights {
    /// Fixed profile tuned for a scene
    pub fn profile(scene: SceneKind) -> Self {
        let (time_decay, importance_weight, keyword_weight, relationship_bonus, recency_window) =
            match scene {
                SceneKind::Combat => (0.8, 0.35, 0.9, 0.02, 6 * TICKS_PER_HOUR),
                SceneKind::Social => (0.05, 0.2, 0.4, 0.45, 30 * TICKS_PER_DAY),
                SceneKind::Work => (0.3, 0.3, 0.7, 0.1, 3 * TICKS_PER_DAY),
                SceneKind::Medical => (0.5, 0.4, 0.8, 0.15, TICKS_PER_DAY),
                SceneKind::Research => (0.2, 0.35, 0.8, 0.05, 7 * TICKS_PER_DAY),
                SceneKind::Event => (0.4, 0.45, 0.6, 0.15, 5 * TICKS_PER_DAY),
                SceneKind::Neutral => (0.3, 0.3, 0.6, 0.2, 10 * TICKS_PER_DAY),
            };
        Self {
            time_decay,
            importance_weight,
            keyword_weight,
            relationship_bonus,
            recency_window,
        }
    }

    /// Linear interpolation; `t = 0` gives `self`, `t = 1` gives `other`
    pub fn lerp(&self, other: &DynamicWeights, t: f32) -> DynamicWeights {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: f32, b: f32| a * (1.0 - t) + b * t;
        let window = mix(self.recency_window as f32, other.recency_window as f32);
        DynamicWeights {
            time_decay: mix(self.time_decay, other.time_decay),
            importance_weight: mix(self.importance_weight, other.importance_weight),
            keyword_weight: mix(self.keyword_weight, other.keyword_weight),
            relationship_bonus: mix(self.relationship_bonus, other.relationship_bonus),
            recency_window: window.round().max(1.0) as u64,
        }
    }
}

impl Default for DynamicWeights {
    fn default() -> Self {
        Self::profile(SceneKind::Neutral)
    }
}

/// Result of classifying a turn's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneClassification {
    pub primary: SceneKind,
    /// 0.0-1.0
    pub confidence: f32,
    /// Normalized weight per detected scene; sums to 1
    pub scene_scores: BTreeMap<SceneKind, f32>,
}

impl SceneClassification {
    pub fn neutral() -> Self {
        Self {
            primary: SceneKind::Neutral,
            confidence: 0.0,
            scene_scores: BTreeMap::from([(SceneKind::Neutral, 1.0)]),
        }
    }

    pub fn is_mixed(&self) -> bool {
        self.scene_scores.len() > 1
    }
}

const COMBAT_TERMS: &[&str] = &[
    "raid", "attack", "fight", "battle", "gun", "shoot", "shot", "enemy", "siege", "combat",
    "weapon", "mortar", "manhunter", "ambush", "kill", "melee", "turret", "sniper",
];
const SOCIAL_TERMS: &[&str] = &[
    "talk", "chat", "friend", "lover", "party", "gossip", "romance", "flirt", "joke", "greet",
    "marri", "wedding", "family", "relationship", "conversation", "insult", "rival", "hug",
];
const WORK_TERMS: &[&str] = &[
    "build", "construct", "haul", "mining", "craft", "cook", "harvest", "plant", "repair",
    "clean", "job", "work", "chore", "smelt", "sow", "tailor", "butcher",
];
const MEDICAL_TERMS: &[&str] = &[
    "injur", "wound", "doctor", "surgery", "medicine", "sick", "disease", "plague",
    "infection", "bleed", "hospital", "heal", "flu", "malaria", "treat", "bandage",
];
const RESEARCH_TERMS: &[&str] = &[
    "research", "study", "science", "tech", "experiment", "discover", "analy", "book",
    "learn", "blueprint", "theory",
];
const EVENT_TERMS: &[&str] = &[
    "trader", "caravan", "eclipse", "storm", "flood", "quest", "visitor", "festival",
    "fallout", "meteor", "shuttle", "disaster", "blight", "ceremony", "heatwave",
];

/// Keyword-lexicon scene classifier
#[derive(Debug, Clone)]
pub struct SceneClassifier {
    lexicons: Vec<(SceneKind, Vec<String>)>,
    /// Scenes below this share are not reported
    min_share: f32,
    /// Hit count at which the evidence is considered conclusive
    saturation_hits: usize,
}

impl Default for SceneClassifier {
    fn default() -> Self {
        let lexicon = |terms: &[&str]| terms.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        Self {
            lexicons: vec![
                (SceneKind::Combat, lexicon(COMBAT_TERMS)),
                (SceneKind::Social, lexicon(SOCIAL_TERMS)),
                (SceneKind::Work, lexicon(WORK_TERMS)),
                (SceneKind::Medical, lexicon(MEDICAL_TERMS)),
                (SceneKind::Research, lexicon(RESEARCH_TERMS)),
                (SceneKind::Event, lexicon(EVENT_TERMS)),
            ],
            min_share: 0.2,
            saturation_hits: 3,
        }
    }
}

impl SceneClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend a scene's lexicon with extra stems
    pub fn with_terms(mut self, scene: SceneKind, terms: &[&str]) -> Self {
        let extra = terms.iter().map(|t| t.to_lowercase());
        match self.lexicons.iter_mut().find(|(s, _)| *s == scene) {
            Some((_, lexicon)) => lexicon.extend(extra),
            None => self.lexicons.push((scene, extra.collect())),
        }
        self
    }

    /// Classify free text. Words match a lexicon stem by prefix.
    pub fn classify(&self, text: &str) -> SceneClassification {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        let hits: Vec<(SceneKind, usize)> = self
            .lexicons
            .iter()
            .map(|(scene, stems)| {
                let count = words
                    .iter()
                    .filter(|w| stems.iter().any(|s| w.starts_with(s.as_str())))
                    .count();
                (*scene, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect();

        let total: usize = hits.iter().map(|(_, c)| c).sum();
        if total == 0 {
            return SceneClassification::neutral();
        }

        let mut shares: Vec<(SceneKind, f32)> = hits
            .into_iter()
            .map(|(scene, count)| (scene, count as f32 / total as f32))
            .collect();
        // Highest share first; ties keep enum order
        shares.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let (primary, primary_share) = shares[0];
        let saturation = (total as f32 / self.saturation_hits as f32).min(1.0);

        let kept: Vec<(SceneKind, f32)> = shares
            .into_iter()
            .filter(|(scene, share)| *share >= self.min_share || *scene == primary)
            .collect();
        let kept_total: f32 = kept.iter().map(|(_, s)| s).sum();
        let scene_scores = kept
            .into_iter()
            .map(|(scene, share)| (scene, share / kept_total))
            .collect();

        SceneClassification {
            primary,
            confidence: (primary_share * saturation).clamp(0.0, 1.0),
            scene_scores,
        }
    }

    /// Blend the profiles of the detected scenes, then pull toward Neutral
    /// by how unsure the classification is.
    pub fn weights_for(&self, classification: &SceneClassification) -> DynamicWeights {
        let neutral = DynamicWeights::profile(SceneKind::Neutral);
        if classification.scene_scores.is_empty() {
            return neutral;
        }

        let mut blend = DynamicWeights {
            time_decay: 0.0,
            importance_weight: 0.0,
            keyword_weight: 0.0,
            relationship_bonus: 0.0,
            recency_window: 0,
        };
        let mut window = 0.0_f32;
        for (scene, share) in &classification.scene_scores {
            let p = DynamicWeights::profile(*scene);
            blend.time_decay += p.time_decay * share;
            blend.importance_weight += p.importance_weight * share;
            blend.keyword_weight += p.keyword_weight * share;
            blend.relationship_bonus += p.relationship_bonus * share;
            window += p.recency_window as f32 * share;
        }
        blend.recency_window = window.round().max(1.0) as u64;

        neutral.lerp(&blend, classification.confidence)
    }

    /// Classify and look up weights in one go
    pub fn weights_for_text(&self, text: &str) -> (SceneClassification, DynamicWeights) {
        let classification = self.classify(text);
        let weights = self.weights_for(&classification);
        (classification, weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_neutral() {
        let classifier = SceneClassifier::new();
        let result = classifier.classify("");
        assert_eq!(result.primary, SceneKind::Neutral);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(
            classifier.weights_for(&result),
            DynamicWeights::profile(SceneKind::Neutral)
        );
    }

    #[test]
    fn test_combat_text() {
        let classifier = SceneClassifier::new();
        let result = classifier.classify("Raiders attack! Grab a gun and fight at the wall.");
        assert_eq!(result.primary, SceneKind::Combat);
        assert!((result.confidence - 1.0).abs() < 1e-5);
        assert!(!result.is_mixed());

        let weights = classifier.weights_for(&result);
        assert_eq!(weights, DynamicWeights::profile(SceneKind::Combat));
        assert_eq!(weights.recency_window, 15_000);
    }

    #[test]
    fn test_social_profile_has_long_window() {
        let social = DynamicWeights::profile(SceneKind::Social);
        let combat = DynamicWeights::profile(SceneKind::Combat);
        assert_eq!(social.recency_window, 30 * TICKS_PER_DAY);
        assert!(social.relationship_bonus > combat.relationship_bonus);
        assert!(social.time_decay < combat.time_decay);
    }

    #[test]
    fn test_mixed_scene() {
        let classifier = SceneClassifier::new();
        let result = classifier.classify("After the raid we talked with friends about the fight");
        assert_eq!(result.primary, SceneKind::Combat);
        assert!(result.is_mixed());
        assert!(result.scene_scores.contains_key(&SceneKind::Social));
        let sum: f32 = result.scene_scores.values().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_weak_evidence_leans_neutral() {
        let classifier = SceneClassifier::new();
        let result = classifier.classify("He mentioned the raid once");
        assert_eq!(result.primary, SceneKind::Combat);
        assert!(result.confidence < 0.5);

        let weights = classifier.weights_for(&result);
        let neutral = DynamicWeights::profile(SceneKind::Neutral);
        let combat = DynamicWeights::profile(SceneKind::Combat);
        assert!(weights.time_decay > neutral.time_decay);
        assert!(weights.time_decay < combat.time_decay);
    }

    #[test]
    fn test_custom_terms() {
        let classifier = SceneClassifier::new().with_terms(SceneKind::Research, &["Archotech"]);
        let result = classifier.classify("archotech archotech archotech");
        assert_eq!(result.primary, SceneKind::Research);
    }

    #[test]
    fn test_parse_scene() {
        assert_eq!("COMBAT".parse::<SceneKind>(), Ok(SceneKind::Combat));
        assert!("dance".parse::<SceneKind>().is_err());
    }
}
