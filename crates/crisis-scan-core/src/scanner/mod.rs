use std::collections::HashSet;

use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod default_scanner;
pub mod file_repository;
pub mod keywords;

/// Context captured on each side of a match, in characters.
pub const DEFAULT_CONTEXT_WINDOW: usize = 80;

/// Severity tag carried by every keyword in a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = KeywordValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            other => Err(KeywordValidationError::UnknownSeverity {
                value: other.to_string(),
            }),
        }
    }
}

/// Triage bucket derived from a scan result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single crisis-indicator phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    /// Lowercase literal matched by substring containment.
    pub phrase: String,
    pub severity: Severity,
}

impl Keyword {
    /// Build a keyword, normalizing the phrase to its trimmed lowercase form.
    pub fn new(
        phrase: impl AsRef<str>,
        severity: Severity,
    ) -> Result<Self, KeywordValidationError> {
        let phrase = fold_case(phrase.as_ref().trim());
        if phrase.is_empty() {
            return Err(KeywordValidationError::EmptyPhrase);
        }
        Ok(Self { phrase, severity })
    }
}

/// Per-character case fold shared by keyword phrases and the scanned
/// transcript. Context-free: `Σ`, `σ` and final `ς` all fold to `σ`.
pub(crate) fn fold_char(ch: char) -> impl Iterator<Item = char> {
    ch.to_lowercase()
        .map(|lower| if lower == 'ς' { 'σ' } else { lower })
}

pub(crate) fn fold_case(text: &str) -> String {
    text.chars().flat_map(fold_char).collect()
}

/// Ordered, immutable list of keywords a scanner matches against.
///
/// Order matters: keywords are reported in set order, and the first keyword
/// whose excerpt lands in the result wins overlap suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
}

impl KeywordSet {
    /// Validate and freeze a keyword list.
    pub fn new(keywords: Vec<Keyword>) -> Result<Self, KeywordValidationError> {
        let mut seen = HashSet::new();
        for keyword in &keywords {
            if keyword.phrase.trim().is_empty() {
                return Err(KeywordValidationError::EmptyPhrase);
            }
            if keyword.phrase != fold_case(&keyword.phrase) {
                return Err(KeywordValidationError::NotLowercase {
                    phrase: keyword.phrase.clone(),
                });
            }
            if !seen.insert(keyword.phrase.as_str()) {
                return Err(KeywordValidationError::DuplicatePhrase {
                    phrase: keyword.phrase.clone(),
                });
            }
        }
        Ok(Self { keywords })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn severity_of(&self, phrase: &str) -> Option<Severity> {
        self.keywords
            .iter()
            .find(|keyword| keyword.phrase == phrase)
            .map(|keyword| keyword.severity)
    }

    /// Bucket a scan result using this set's severity tags.
    ///
    /// Phrases unknown to the set (a blob produced with another pack) count as
    /// low severity.
    pub fn classify(&self, result: &ScanResult) -> RiskLevel {
        if !result.has_crisis_language {
            return RiskLevel::None;
        }
        let has_high = result
            .keywords
            .iter()
            .any(|phrase| self.severity_of(phrase) == Some(Severity::High));
        if has_high {
            RiskLevel::High
        } else {
            RiskLevel::Low
        }
    }
}

/// Errors emitted while building keyword sets.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeywordValidationError {
    #[error("keyword phrase must not be blank")]
    EmptyPhrase,
    #[error("keyword `{phrase}` must be lowercase")]
    NotLowercase { phrase: String },
    #[error("duplicate keyword `{phrase}`")]
    DuplicatePhrase { phrase: String },
    #[error("unknown severity `{value}` (expected `low` or `high`)")]
    UnknownSeverity { value: String },
}

/// Tunables for the keyword scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Characters of context kept on each side of a match.
    pub context_window: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<(), ScannerConfigError> {
        if self.context_window == 0 {
            return Err(ScannerConfigError::ZeroWindow);
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScannerConfigError {
    #[error("context window must be > 0")]
    ZeroWindow,
}

/// Outcome of scanning one transcript.
///
/// Serialized with the camelCase keys the surrounding application stores as
/// its risk flags blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub has_crisis_language: bool,
    pub keywords: Vec<String>,
    pub excerpts: Vec<String>,
}

impl ScanResult {
    /// Check the flag/keyword invariants of a result obtained from outside
    /// the scanner.
    pub fn validate(&self) -> Result<(), ScanResultValidationError> {
        if self.has_crisis_language == self.keywords.is_empty() {
            return Err(ScanResultValidationError::InconsistentFlag {
                has_crisis_language: self.has_crisis_language,
                keyword_count: self.keywords.len(),
            });
        }
        let mut seen = HashSet::new();
        for keyword in &self.keywords {
            if keyword.trim().is_empty() {
                return Err(ScanResultValidationError::BlankKeyword);
            }
            if !seen.insert(keyword.as_str()) {
                return Err(ScanResultValidationError::DuplicateKeyword {
                    keyword: keyword.clone(),
                });
            }
        }
        Ok(())
    }

    /// Parse a stored risk flags blob, rejecting payloads that break the
    /// result invariants.
    pub fn from_json(raw: &str) -> Result<Self, ScanResultValidationError> {
        let result: Self = serde_json::from_str(raw).map_err(|err| {
            ScanResultValidationError::Malformed {
                message: err.to_string(),
            }
        })?;
        result.validate()?;
        Ok(result)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Validation errors for risk flags blobs.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanResultValidationError {
    #[error("risk flags are not valid JSON: {message}")]
    Malformed { message: String },
    #[error("hasCrisisLanguage is {has_crisis_language} but {keyword_count} keyword(s) matched")]
    InconsistentFlag {
        has_crisis_language: bool,
        keyword_count: usize,
    },
    #[error("matched keyword must not be blank")]
    BlankKeyword,
    #[error("keyword `{keyword}` listed more than once")]
    DuplicateKeyword { keyword: String },
}

/// Source of the keyword set injected into a scanner.
pub trait KeywordRepository: Send + Sync {
    /// Retrieve the keyword set currently active.
    fn load_keywords(&self) -> AnyResult<KeywordSet>;
}

/// Text-analysis interface turning a transcript into a scan result.
pub trait Scanner: Send + Sync {
    /// Scan a transcript. Total: every input produces a result.
    fn scan(&self, transcript: &str) -> ScanResult;

    /// Bucket a result produced by this scanner.
    fn classify(&self, result: &ScanResult) -> RiskLevel;
}
