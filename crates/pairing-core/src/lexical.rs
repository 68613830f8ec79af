//! Lexical feature extraction: text in, named float features out.
//!
//! Word-list and punctuation statistics only. No model, no state, no I/O.
//! Ratios land in [0, 1]; `avg_sentence_length` is words per sentence.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

pub type Features = BTreeMap<String, f64>;

/// Anything that can turn raw text into named numeric features.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Features;
}

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}']+").unwrap());
static SENTENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^.!?]*[.!?]+|[^.!?]+$").unwrap());
static LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d)").unwrap());

const HEDGES: &[&str] = &[
    "maybe", "perhaps", "possibly", "might", "could", "would", "probably", "i think", "i guess",
    "i suppose", "sort of", "kind of", "somewhat", "a bit", "a little", "not sure", "i believe",
    "it seems", "apparently", "arguably",
];

const ACTION_VERBS: &[&str] = &[
    "build", "ship", "launch", "deploy", "create", "make", "push", "fix", "implement", "code",
    "design", "develop", "release", "finish", "complete", "start", "begin", "execute", "run",
    "test", "write", "publish", "deliver", "send", "sell", "buy", "hire", "fire", "decide",
    "commit", "close", "open", "break", "solve", "kill", "cut", "move", "do", "try", "go", "get",
    "set",
];

const URGENT: &[&str] = &[
    "now", "today", "asap", "immediately", "urgent", "hurry", "quick", "fast", "deadline",
    "overdue", "behind", "late", "rush", "priority", "critical", "tonight", "morning", "before",
    "soon",
];

const TEMPORAL: &[&str] = &[
    "now", "today", "tomorrow", "yesterday", "soon", "later", "eventually", "someday", "future",
    "past", "before", "after", "when", "until", "deadline", "schedule", "timeline", "calendar",
    "morning", "tonight",
];

const FINANCIAL: &[&str] = &[
    "debt", "money", "afford", "broke", "budget", "expenses", "rent", "bills", "payroll",
    "overdraft", "loan", "credit", "payment", "invoice", "cash", "revenue", "profit", "loss",
    "bankrupt", "collections", "owe", "overdue", "financial", "salary", "income", "cost",
    "price", "fee", "charge",
];

const LIFE_EVENT: &[&str] = &[
    "health", "hospital", "doctor", "sick", "illness", "surgery", "family", "divorce", "baby",
    "pregnant", "wedding", "funeral", "moving", "relocate", "accident", "emergency", "crisis",
    "death", "loss", "grief", "therapy", "burnout", "exhausted", "overwhelmed", "anxiety",
    "depression",
];

const ABSTRACT: &[&str] = &[
    "concept", "theory", "philosophy", "strategy", "vision", "framework", "paradigm",
    "principle", "idea", "thought", "perspective", "approach", "methodology", "model", "system",
    "architecture", "pattern", "abstract", "hypothetical",
];

const CONCRETE: &[&str] = &[
    "button", "page", "screen", "file", "code", "server", "database", "api", "endpoint", "table",
    "column", "row", "pixel", "color", "font", "image", "click", "tap", "build", "deploy",
    "install", "download", "upload",
];

const FIRST_PERSON: &[&str] = &["i", "me", "my", "mine", "myself", "i'm", "i've", "i'll", "i'd"];

/// Default extractor backed by fixed word lists.
#[derive(Debug, Clone)]
pub struct LexicalExtractor {
    action_verbs: HashSet<&'static str>,
    urgent: HashSet<&'static str>,
    temporal: HashSet<&'static str>,
    financial: HashSet<&'static str>,
    life_event: HashSet<&'static str>,
    abstract_words: HashSet<&'static str>,
    concrete: HashSet<&'static str>,
    first_person: HashSet<&'static str>,
}

impl Default for LexicalExtractor {
    fn default() -> Self {
        let set = |words: &[&'static str]| words.iter().copied().collect::<HashSet<_>>();
        Self {
            action_verbs: set(ACTION_VERBS),
            urgent: set(URGENT),
            temporal: set(TEMPORAL),
            financial: set(FINANCIAL),
            life_event: set(LIFE_EVENT),
            abstract_words: set(ABSTRACT),
            concrete: set(CONCRETE),
            first_person: set(FIRST_PERSON),
        }
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F600..=0x1F64F
        | 0x1F300..=0x1F5FF
        | 0x1F680..=0x1F6FF
        | 0x1F900..=0x1F9FF
        | 0x2600..=0x26FF
        | 0x2700..=0x27BF)
}

/// Sentences of more than two bytes; the whole text when none qualify.
fn sentences(text: &str) -> Vec<&str> {
    let found: Vec<&str> = SENTENCE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| s.len() > 2)
        .collect();
    if found.is_empty() { vec![text] } else { found }
}

impl LexicalExtractor {
    fn count(&self, words: &[String], set: &HashSet<&'static str>) -> usize {
        words.iter().filter(|w| set.contains(w.as_str())).count()
    }

    /// D/I/S/C proportions summing to 1. Uniform when `features` is empty.
    pub fn infer_disc(features: &Features) -> [(&'static str, f64); 4] {
        if features.is_empty() {
            return [("D", 0.25), ("I", 0.25), ("S", 0.25), ("C", 0.25)];
        }
        let f = |k: &str| features.get(k).copied().unwrap_or(0.0);
        let emoji = (f("emoji_frequency") * 10.0).min(1.0);
        let asl = f("avg_sentence_length");

        let d = 0.30 * f("imperative_ratio")
            + 0.25 * (1.0 - f("hedging_ratio"))
            + 0.20 * f("action_verb_density") * 3.0
            + 0.15 * (15.0 / asl.max(1.0)).min(1.0)
            + 0.10 * f("temporal_urgency");
        let i = 0.30 * f("exclamation_ratio")
            + 0.25 * emoji
            + 0.20 * f("emotion_expression")
            + 0.15 * (1.0 - f("formality"))
            + 0.10 * f("question_ratio");
        let s = 0.30 * f("hedging_ratio")
            + 0.25 * f("question_ratio")
            + 0.20 * (1.0 - f("temporal_urgency"))
            + 0.15 * (asl / 25.0).min(1.0)
            + 0.10 * f("first_person_ratio");
        let c = 0.30 * f("vocabulary_richness")
            + 0.25 * (1.0 - emoji)
            + 0.20 * f("list_usage")
            + 0.15 * f("formality")
            + 0.10 * f("detail_preference");

        let mut total = d + i + s + c;
        if total < 0.01 {
            total = 1.0;
        }
        [("D", d / total), ("I", i / total), ("S", s / total), ("C", c / total)]
    }
}

impl FeatureExtractor for LexicalExtractor {
    fn extract(&self, text: &str) -> Features {
        let mut f = Features::new();
        if text.len() < 5 {
            return f;
        }
        let lower = text.to_lowercase();
        let words: Vec<String> = WORD_RE
            .find_iter(&lower)
            .map(|m| m.as_str().trim_matches('\'').to_string())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return f;
        }
        let word_count = words.len() as f64;
        let sents = sentences(text);
        let sent_count = sents.len().max(1) as f64;

        let avg_sentence_length = word_count / sent_count;
        let unique: HashSet<&str> = words.iter().map(String::as_str).collect();
        let vocabulary_richness = unique.len() as f64 / word_count;
        let hedges = HEDGES.iter().filter(|h| lower.contains(**h)).count() as f64;
        let hedging_ratio = (hedges / sent_count).min(1.0);
        let action_verb_density = (self.count(&words, &self.action_verbs) as f64 / word_count).min(1.0);
        let question_ratio = sents.iter().filter(|s| s.ends_with('?')).count() as f64 / sent_count;
        let exclamation_ratio = sents.iter().filter(|s| s.ends_with('!')).count() as f64 / sent_count;
        let first_person_ratio = (self.count(&words, &self.first_person) as f64 / word_count).min(1.0);
        let emoji_frequency = (text.chars().filter(|&c| is_emoji(c)).count() as f64 / word_count).min(1.0);

        let urgent = self.count(&words, &self.urgent) as f64;
        let temporal = self.count(&words, &self.temporal) as f64;
        let temporal_urgency = if temporal > 0.0 {
            (urgent / temporal).min(1.0)
        } else {
            0.0
        };

        let imperatives = sents
            .iter()
            .filter(|s| {
                s.split_whitespace()
                    .next()
                    .is_some_and(|w| self.action_verbs.contains(w.to_lowercase().as_str()))
            })
            .count() as f64;
        let imperative_ratio = imperatives / sent_count;
        let list_usage = (LIST_ITEM_RE.find_iter(text).count() as f64 / sent_count).min(1.0);

        let directness = clamp01(
            0.30 * (1.0 - hedging_ratio)
                + 0.25 * action_verb_density * 3.0
                + 0.25 * imperative_ratio
                + 0.20 * (15.0 / avg_sentence_length.max(1.0)).min(1.0),
        );
        let formality = clamp01(
            0.40 * vocabulary_richness
                + 0.30 * (1.0 - emoji_frequency * 10.0)
                + 0.30 * (1.0 - exclamation_ratio),
        );
        let detail_preference = clamp01(
            0.40 * (avg_sentence_length / 25.0).min(1.0)
                + 0.35 * vocabulary_richness
                + 0.25 * question_ratio,
        );
        let emotion_expression = clamp01(
            0.35 * exclamation_ratio
                + 0.35 * (emoji_frequency * 10.0).min(1.0)
                + 0.30 * (1.0 - hedging_ratio),
        );
        let pace_preference = clamp01(
            0.40 * temporal_urgency
                + 0.35 * action_verb_density * 3.0
                + 0.25 * (10.0 / avg_sentence_length.max(1.0)).min(1.0),
        );
        let decision_style = clamp01(
            0.35 * imperative_ratio + 0.35 * (1.0 - question_ratio) + 0.30 * (1.0 - hedging_ratio),
        );

        let abstract_count = self.count(&words, &self.abstract_words) as f64;
        let concrete_count = self.count(&words, &self.concrete) as f64;
        let abstract_vs_concrete = if abstract_count + concrete_count > 0.0 {
            abstract_count / (abstract_count + concrete_count)
        } else {
            0.5
        };
        let holistic_vs_sequential = clamp01(0.50 * abstract_vs_concrete + 0.50 * (1.0 - list_usage));

        let financial_pressure = (self.count(&words, &self.financial) as f64 / 3.0).min(1.0);
        let life_event = (self.count(&words, &self.life_event) as f64 / 2.0).min(1.0);

        for (k, v) in [
            ("avg_sentence_length", avg_sentence_length),
            ("vocabulary_richness", vocabulary_richness),
            ("hedging_ratio", hedging_ratio),
            ("action_verb_density", action_verb_density),
            ("question_ratio", question_ratio),
            ("exclamation_ratio", exclamation_ratio),
            ("first_person_ratio", first_person_ratio),
            ("emoji_frequency", emoji_frequency),
            ("temporal_urgency", temporal_urgency),
            ("imperative_ratio", imperative_ratio),
            ("list_usage", list_usage),
            ("directness", directness),
            ("formality", formality),
            ("detail_preference", detail_preference),
            ("emotion_expression", emotion_expression),
            ("pace_preference", pace_preference),
            ("decision_style", decision_style),
            ("holistic_vs_sequential", holistic_vs_sequential),
            ("abstract_vs_concrete", abstract_vs_concrete),
            ("financial_pressure", financial_pressure),
            ("life_event", life_event),
        ] {
            f.insert(k.to_string(), v);
        }
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn extract(text: &str) -> Features {
        LexicalExtractor::default().extract(text)
    }

    #[test]
    fn test_short_text_yields_nothing() {
        assert!(extract("ok").is_empty());
        assert!(extract("    ").is_empty());
    }

    #[test]
    fn test_basic_ratios() {
        let f = extract("Ship the build today. Is it done? Great!");
        assert_relative_eq!(f["question_ratio"], 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(f["exclamation_ratio"], 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(f["imperative_ratio"], 1.0 / 3.0, epsilon = 1e-12);
        assert!(f["action_verb_density"] > 0.0);
    }

    #[test]
    fn test_all_ratio_features_in_unit_range() {
        let f = extract(
            "Maybe we could launch tomorrow?? I think the money is tight, rent and payroll are due!!! 🚀🚀",
        );
        for (k, v) in &f {
            if k != "avg_sentence_length" {
                assert!((0.0..=1.0).contains(v), "{k} = {v}");
            }
        }
    }

    #[test]
    fn test_financial_keywords_saturate() {
        let f = extract("debt and rent and payroll and a loan");
        assert_relative_eq!(f["financial_pressure"], 1.0);
    }

    #[test]
    fn test_life_event_keywords() {
        let f = extract("My family had an emergency this week.");
        assert_relative_eq!(f["life_event"], 1.0);
    }

    #[test]
    fn test_list_usage_counts_bullets() {
        let f = extract("Plan.\n- one\n- two\n1. three");
        assert!(f["list_usage"] > 0.0);
    }

    #[test]
    fn test_abstract_vs_concrete_neutral_without_markers() {
        let f = extract("hello there friend");
        assert_relative_eq!(f["abstract_vs_concrete"], 0.5);
    }

    #[test]
    fn test_disc_sums_to_one() {
        let f = extract("Fix the server now. Deploy it. Ship today!");
        let disc = LexicalExtractor::infer_disc(&f);
        let total: f64 = disc.iter().map(|(_, v)| v).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_disc_uniform_without_features() {
        let disc = LexicalExtractor::infer_disc(&Features::new());
        assert!(disc.iter().all(|(_, v)| *v == 0.25));
    }

    #[test]
    fn test_hedged_text_less_direct() {
        let blunt = extract("Ship it now. Fix the bug. Deploy today.");
        let hedged = extract("I think maybe we could possibly look at it, perhaps later, not sure.");
        assert!(blunt["directness"] > hedged["directness"]);
    }
}
