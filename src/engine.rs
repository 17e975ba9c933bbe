use crate::error::PreprocessError;
use image::DynamicImage;
use serde::Serialize;

/// Pixel box of a word in the processed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// A word as an engine reports it, before scoring
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedWord {
    pub text: String,
    pub bbox: Option<BoundingBox>,
}

impl RecognizedWord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// One recognized word
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrToken {
    pub text: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// Text recognized from a preprocessed buffer
#[derive(Debug, Clone, Default, Serialize)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
    pub tokens: Vec<OcrToken>,
    pub warnings: Vec<String>,
}

impl OcrOutput {
    /// Build an output from recognized lines of words, scoring each word and
    /// the joined text with `text_confidence`.
    pub fn from_lines(lines: Vec<Vec<RecognizedWord>>) -> Self {
        let text = lines
            .iter()
            .map(|words| {
                words
                    .iter()
                    .map(|word| word.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let tokens: Vec<OcrToken> = lines
            .into_iter()
            .flatten()
            .map(|word| OcrToken {
                confidence: text_confidence(&word.text),
                text: word.text,
                bbox: word.bbox,
            })
            .collect();

        let mut warnings = Vec::new();
        if tokens.is_empty() {
            warnings.push("No text recognized".to_string());
        }

        Self {
            confidence: text_confidence(&text),
            text,
            tokens,
            warnings,
        }
    }
}

/// Trait that all OCR engines must implement
pub trait OcrEngine: Send + Sync {
    /// Returns the engine identifier (e.g., "ocrs")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Recognize text in an already preprocessed buffer
    fn recognize(&self, image: &DynamicImage) -> Result<OcrOutput, PreprocessError>;
}

/// Score recognized text by how much it looks like readable SMS content.
///
/// The engine exposes no per-character scores, so garbled output is detected
/// from symbol density, word shape and long runs of one character.
pub fn text_confidence(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    if total < 5 {
        return 0.5;
    }

    let symbols = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !c.is_ascii_punctuation())
        .count();
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let symbol_score = 1.0 - (symbols as f32 / total as f32 * 10.0).min(1.0);
    let letter_score = (letters as f32 / total as f32 * 1.5).min(1.0);

    let words: Vec<&str> = text.split_whitespace().collect();
    let word_score = if words.is_empty() {
        0.5
    } else {
        let chars: usize = words.iter().map(|w| w.chars().count()).sum();
        let avg = chars as f32 / words.len() as f32;
        let singles = words.iter().filter(|w| w.chars().count() == 1).count() as f32;
        let shape = match avg as usize {
            0..=1 => 0.3,
            2..=3 => 0.7,
            4..=8 => 1.0,
            9..=12 => 0.8,
            _ => 0.4,
        };
        shape * (1.0 - (singles / words.len() as f32 * 1.5).min(0.5))
    };

    let repeat_score = match longest_run(text) {
        0..=3 => 1.0,
        4..=5 => 0.8,
        6..=10 => 0.5,
        _ => 0.2,
    };

    let confidence =
        0.25 * symbol_score + 0.20 * letter_score + 0.35 * word_score + 0.20 * repeat_score;
    confidence.clamp(0.0, 1.0)
}

/// Longest run of one repeated non-whitespace character
fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut prev = None;

    for c in text.chars() {
        if c.is_whitespace() {
            current = 0;
        } else if Some(c) == prev {
            current += 1;
        } else {
            current = 1;
        }
        longest = longest.max(current);
        prev = Some(c);
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_returns_zero() {
        assert_eq!(text_confidence(""), 0.0);
    }

    #[test]
    fn test_short_text_returns_half() {
        assert_eq!(text_confidence("ok"), 0.5);
    }

    #[test]
    fn test_chat_message_scores_high() {
        let confidence = text_confidence("Running late, see you at the station around seven");
        assert!(confidence > 0.75, "Expected > 0.75, got {}", confidence);
    }

    #[test]
    fn test_garbled_text_scores_low() {
        let confidence = text_confidence("§±®©¥€£¢¤");
        assert!(confidence < 0.5, "Expected < 0.5, got {}", confidence);
    }

    #[test]
    fn test_repeated_and_single_chars_penalized() {
        let clean = text_confidence("Hello there friend");
        assert!(text_confidence("Hello aaaaaaaaaaaa friend") < clean);
        assert!(text_confidence("a b c d e f g h i j k l") < 0.7);
    }

    #[test]
    fn test_longest_run() {
        assert_eq!(longest_run("Hello"), 2);
        assert_eq!(longest_run("aa  aaa"), 3);
        assert_eq!(longest_run(""), 0);
    }

    #[test]
    fn test_from_lines_joins_and_scores() {
        let output = OcrOutput::from_lines(vec![
            vec![RecognizedWord::new("See"), RecognizedWord::new("you")],
            vec![RecognizedWord::new("tomorrow")],
        ]);
        assert_eq!(output.text, "See you\ntomorrow");
        assert_eq!(output.tokens.len(), 3);
        assert_eq!(output.tokens[2].text, "tomorrow");
        assert!(output.warnings.is_empty());

        let empty = OcrOutput::from_lines(Vec::new());
        assert_eq!(empty.confidence, 0.0);
        assert_eq!(empty.warnings.len(), 1);
    }

    #[test]
    fn test_word_boxes_carried_into_tokens() {
        let bbox = BoundingBox {
            left: 12,
            top: 40,
            right: 96,
            bottom: 58,
        };
        let output = OcrOutput::from_lines(vec![vec![
            RecognizedWord::new("Running").with_bbox(bbox),
            RecognizedWord::new("late"),
        ]]);

        assert_eq!(output.tokens[0].bbox, Some(bbox));
        assert_eq!(output.tokens[1].bbox, None);

        let json = serde_json::to_value(&output.tokens).unwrap();
        assert_eq!(json[0]["bbox"]["right"], 96);
        assert!(json[1].get("bbox").is_none());
    }
}
