use serde::Serialize;

const COLOR_KEYWORDS: [&str; 6] = ["red", "blue", "green", "yellow", "black", "white"];
const OBJECT_KEYWORDS: [&str; 6] = ["dog", "cat", "car", "tree", "person", "sign"];
const PEOPLE_KEYWORDS: [&str; 8] = [
    "person", "people", "man", "woman", "child", "boy", "girl", "human",
];
const ACTION_KEYWORDS: [&str; 8] = [
    "running", "walking", "sitting", "standing", "jumping", "playing", "eating", "drinking",
];
const TEXT_KEYWORDS: [&str; 3] = ["text", "letter", "word"];
const LANGUAGE_INDICATORS: [&str; 94] = [
    "the", "and", "is", "in", "it", "you", "that", "he", "was", "for", "on", "are", "with", "as",
    "his", "they", "be", "at", "one", "have", "this", "from", "or", "had", "by", "hot", "but",
    "some", "what", "there", "we", "can", "out", "other", "were", "all", "your", "when", "up",
    "use", "word", "how", "said", "each", "which", "she", "do", "their", "time", "if", "will",
    "way", "about", "many", "then", "them", "would", "write", "like", "so", "these", "her",
    "long", "make", "thing", "see", "him", "two", "has", "look", "more", "day", "could", "go",
    "come", "did", "my", "sound", "no", "most", "number", "who", "over", "know", "water", "than",
    "call", "first", "may", "down", "side", "been", "now", "find",
];

const DETAILED_DESCRIPTION_MIN_WORDS: usize = 20;
const WELL_STRUCTURED_MIN_SEGMENTS: usize = 2;
const LANGUAGE_INDICATOR_THRESHOLD: usize = 3;
const REFUSAL_MARKER: &str = "Sorry";

/// Lexical signals of a single response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentSignals {
    pub response_length: usize,
    pub word_count: usize,
    pub sentence_count: usize,
    pub mentions_colors: bool,
    pub mentions_objects: bool,
    pub mentions_people: bool,
    pub mentions_text: bool,
    pub mentions_actions: bool,
    pub uses_target_language: bool,
    pub well_structured: bool,
    pub has_detailed_description: bool,
    pub has_specific_details: bool,
}

impl ContentSignals {
    /// Number of mention categories present, 0 to 5.
    pub fn mention_variety(&self) -> usize {
        [
            self.mentions_colors,
            self.mentions_objects,
            self.mentions_people,
            self.mentions_text,
            self.mentions_actions,
        ]
        .iter()
        .filter(|v| **v)
        .count()
    }
}

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Case-insensitive substring matching against fixed English vocabularies.
pub fn analyze(text: &str) -> ContentSignals {
    let lower = text.to_lowercase();
    let word_count = lower.split_whitespace().count();
    let sentence_count = text.split('.').filter(|v| !v.trim().is_empty()).count();

    let mentions_colors = mentions_any(&lower, &COLOR_KEYWORDS);
    let mentions_objects = mentions_any(&lower, &OBJECT_KEYWORDS);
    let mentions_people = mentions_any(&lower, &PEOPLE_KEYWORDS);

    let language_hits = LANGUAGE_INDICATORS
        .iter()
        .filter(|w| lower.contains(*w))
        .count();

    ContentSignals {
        response_length: text.chars().count(),
        word_count,
        sentence_count,
        mentions_colors,
        mentions_objects,
        mentions_people,
        mentions_text: mentions_any(&lower, &TEXT_KEYWORDS),
        mentions_actions: mentions_any(&lower, &ACTION_KEYWORDS),
        uses_target_language: language_hits > LANGUAGE_INDICATOR_THRESHOLD,
        well_structured: sentence_count > WELL_STRUCTURED_MIN_SEGMENTS
            && !text.starts_with(REFUSAL_MARKER),
        has_detailed_description: word_count > DETAILED_DESCRIPTION_MIN_WORDS,
        has_specific_details: mentions_colors || mentions_objects || mentions_people,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(analyze(""), ContentSignals::default());
        assert_eq!(analyze("   \n "), ContentSignals {
            response_length: 5,
            ..Default::default()
        });
    }

    #[test]
    fn test_short_scene() {
        let signals = analyze("The image shows a red car on the road near a man walking.");

        assert_eq!(signals.word_count, 12);
        assert_eq!(signals.sentence_count, 1);
        assert!(signals.mentions_colors);
        assert!(signals.mentions_objects);
        assert!(signals.mentions_people);
        assert!(signals.mentions_actions);
        assert!(!signals.mentions_text);
        assert!(!signals.has_detailed_description);
        assert!(!signals.well_structured);
        assert!(signals.has_specific_details);
        // the, in (walking), he (the), on, how (shows)
        assert!(signals.uses_target_language);
        assert_eq!(signals.mention_variety(), 4);
    }

    #[test]
    fn test_case_insensitive() {
        let signals = analyze("A BLUE SIGN WITH TEXT");
        assert!(signals.mentions_colors);
        assert!(signals.mentions_objects);
        assert!(signals.mentions_text);
        assert!(!signals.mentions_people);
    }

    #[test]
    fn test_structure() {
        let text = "A dog sits. It is brown. The grass is green. ";
        let signals = analyze(text);
        assert_eq!(signals.sentence_count, 3);
        assert!(signals.well_structured);

        let refusal = "Sorry, I cannot help. This image is blurry. Nothing is visible.";
        assert_eq!(analyze(refusal).sentence_count, 3);
        assert!(!analyze(refusal).well_structured);
        // only a refusal at the very start counts
        assert!(analyze(&format!("  {}", refusal)).well_structured);

        // empty segments between dots do not count
        assert!(!analyze("One.. Two...").well_structured);
    }

    #[test]
    fn test_detailed_description_threshold() {
        let twenty = vec!["word"; 20].join(" ");
        assert!(!analyze(&twenty).has_detailed_description);

        let twenty_one = vec!["word"; 21].join(" ");
        assert!(analyze(&twenty_one).has_detailed_description);
    }

    #[test]
    fn test_language_threshold() {
        // exactly three indicators: "the", "he", "and"
        assert!(!analyze("the and").uses_target_language);
        // the, he, and, with, it
        assert!(analyze("the and with").uses_target_language);
    }
}
