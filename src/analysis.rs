//! Turns raw completion text into a judgment, the prose analysis and a
//! confidence score.

use memchr::memchr_iter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::util::{ac_for, utf16_len};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Judgment {
    Yta,
    Nta,
    Esh,
    Inconclusive,
}

impl Judgment {
    pub const ALL: [Judgment; 4] = [
        Judgment::Yta,
        Judgment::Nta,
        Judgment::Esh,
        Judgment::Inconclusive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Judgment::Yta => "YTA",
            Judgment::Nta => "NTA",
            Judgment::Esh => "ESH",
            Judgment::Inconclusive => "INCONCLUSIVE",
        }
    }

    /// Ordered substring test on an already upper-cased verdict line.
    fn from_verdict_line(line: &str) -> Self {
        if line.contains("YTA") {
            Judgment::Yta
        } else if line.contains("NTA") {
            Judgment::Nta
        } else if line.contains("ESH") {
            Judgment::Esh
        } else {
            Judgment::Inconclusive
        }
    }
}

/// Body of a successful analysis response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub judgment: Judgment,
    pub analysis: String,
    pub confidence_score: u8,
    /// The analysis may contain markdown. Always true.
    pub formatted: bool,
}

/// Scores completion text on a 0..=100 scale. Not a probability.
pub trait ConfidenceHeuristic: Send + Sync {
    fn score(&self, raw: &str) -> u8;
}

static VERDICT_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(YTA|NTA|ESH)\s").unwrap());
static BALANCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\b(however|although|despite)\b|on (the )?one hand.*other hand").unwrap()
});

const STRUCTURE_KEYWORDS: [&str; 5] = ["Context", "Summary", "Analysis", "Assessment", "Reasoning"];

/// Which surface features a completion shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Indicators {
    pub verdict_prefix: bool,
    pub structure_keywords: bool,
    pub multi_line: bool,
    pub long_form: bool,
    pub balanced_view: bool,
}

impl Indicators {
    pub fn detect(raw: &str) -> Self {
        let structure_keywords = ac_for(&STRUCTURE_KEYWORDS)
            .map(|ac| ac.is_match(raw))
            .unwrap_or(false);
        // More than five '\n'-delimited lines means at least five newlines.
        let newlines = memchr_iter(b'\n', raw.as_bytes()).count();
        Self {
            verdict_prefix: VERDICT_PREFIX_RE.is_match(raw),
            structure_keywords,
            multi_line: newlines + 1 > 5,
            long_form: utf16_len(raw) > 500,
            balanced_view: BALANCE_RE.is_match(raw),
        }
    }
}

/// Fixed-weight sum over [`Indicators`], clamped to 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedIndicators {
    pub verdict_prefix: f64,
    pub structure_keywords: f64,
    pub multi_line: f64,
    pub long_form: f64,
    pub balanced_view: f64,
}

impl Default for WeightedIndicators {
    fn default() -> Self {
        Self {
            verdict_prefix: 30.0,
            structure_keywords: 20.0,
            multi_line: 20.0,
            long_form: 15.0,
            balanced_view: 15.0,
        }
    }
}

impl WeightedIndicators {
    pub fn weigh(&self, ind: &Indicators) -> u8 {
        let weighted = [
            (ind.verdict_prefix, self.verdict_prefix),
            (ind.structure_keywords, self.structure_keywords),
            (ind.multi_line, self.multi_line),
            (ind.long_form, self.long_form),
            (ind.balanced_view, self.balanced_view),
        ];
        let total: f64 = weighted
            .iter()
            .filter(|(hit, _)| *hit)
            .map(|(_, w)| *w)
            .sum();
        total.clamp(0.0, 100.0).round() as u8
    }
}

impl ConfidenceHeuristic for WeightedIndicators {
    fn score(&self, raw: &str) -> u8 {
        self.weigh(&Indicators::detect(raw))
    }
}

/// Split the verdict line off the completion and score it.
///
/// The verdict line is the first `'\n'`-delimited line, trimmed and
/// upper-cased. The analysis is the raw text with that many characters
/// skipped from the front, then trimmed. The skip is counted in characters of
/// the upper-cased line, which only matches the raw line while upper-casing
/// preserves length, as it does for the verdict tokens.
pub fn parse_completion(raw: &str, heuristic: &dyn ConfidenceHeuristic) -> AnalysisResult {
    let first_line = raw.split('\n').next().unwrap_or("").trim().to_uppercase();
    let judgment = Judgment::from_verdict_line(&first_line);

    let skip = first_line.chars().count();
    let analysis = match raw.char_indices().nth(skip) {
        Some((idx, _)) => raw[idx..].trim().to_string(),
        None => String::new(),
    };

    AnalysisResult {
        judgment,
        analysis,
        confidence_score: heuristic.score(raw),
        formatted: true,
    }
}
