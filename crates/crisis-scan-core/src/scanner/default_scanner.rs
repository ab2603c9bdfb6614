use std::iter;

use aho_corasick::AhoCorasick;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use tracing::{debug, instrument, trace};

use super::{
    fold_char, keywords, KeywordRepository, KeywordSet, RiskLevel, ScanResult, Scanner,
    ScannerConfig,
};

static DEFAULT_SCANNER: Lazy<KeywordScanner> = Lazy::new(|| {
    KeywordScanner::new(keywords::builtin().clone())
        .expect("built-in keyword set must compile into a matcher")
});

/// Scan a transcript with the built-in keyword set.
pub fn scan(transcript: &str) -> ScanResult {
    DEFAULT_SCANNER.scan(transcript)
}

/// Classify a result against the built-in high-severity subset.
pub fn classify(result: &ScanResult) -> RiskLevel {
    keywords::builtin().classify(result)
}

/// Scanner matching a fixed keyword set by case-insensitive substring
/// containment.
pub struct KeywordScanner {
    keywords: KeywordSet,
    automaton: Option<AhoCorasick>,
    config: ScannerConfig,
}

impl KeywordScanner {
    pub fn new(keywords: KeywordSet) -> Result<Self> {
        Self::with_config(keywords, ScannerConfig::default())
    }

    pub fn with_config(keywords: KeywordSet, config: ScannerConfig) -> Result<Self> {
        config.validate()?;
        let automaton = Self::compile_automaton(&keywords)?;
        Ok(Self {
            keywords,
            automaton,
            config,
        })
    }

    /// Build a scanner from whatever set the repository currently serves.
    pub fn from_repository<R>(repo: &R, config: ScannerConfig) -> Result<Self>
    where
        R: KeywordRepository + ?Sized,
    {
        let keywords = repo.load_keywords()?;
        Self::with_config(keywords, config)
    }

    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    fn compile_automaton(keywords: &KeywordSet) -> Result<Option<AhoCorasick>> {
        if keywords.is_empty() {
            return Ok(None);
        }
        let patterns: Vec<_> = keywords
            .iter()
            .map(|keyword| keyword.phrase.as_str())
            .collect();
        let automaton =
            AhoCorasick::new(patterns).context("failed to build keyword automaton")?;
        Ok(Some(automaton))
    }
}

impl Scanner for KeywordScanner {
    #[instrument(
        name = "scan_transcript",
        skip(self, transcript),
        fields(input_len = transcript.len())
    )]
    fn scan(&self, transcript: &str) -> ScanResult {
        let Some(automaton) = &self.automaton else {
            return ScanResult::default();
        };
        let normalized = Normalized::new(transcript);

        // Overlapping matches arrive ordered by end offset, so the first hit
        // seen per pattern is its earliest occurrence.
        let mut first_hits: Vec<Option<(usize, usize)>> = vec![None; self.keywords.len()];
        for mat in automaton.find_overlapping_iter(normalized.text.as_str()) {
            let slot = &mut first_hits[mat.pattern().as_usize()];
            if slot.is_none() {
                *slot = Some((mat.start(), mat.end()));
            }
        }

        let char_offsets: Vec<usize> = transcript
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(iter::once(transcript.len()))
            .collect();

        let mut keywords: Vec<String> = Vec::new();
        let mut excerpts: Vec<String> = Vec::new();
        for (keyword, hit) in self.keywords.iter().zip(first_hits) {
            let Some((start, end)) = hit else {
                continue;
            };
            if !keywords.contains(&keyword.phrase) {
                keywords.push(keyword.phrase.clone());
            }
            let span = normalized.original_span(start, end);
            let excerpt =
                extract_excerpt(transcript, &char_offsets, span, self.config.context_window);
            let redundant = excerpts.iter().any(|existing| {
                existing.contains(excerpt) || excerpt.contains(existing.as_str())
            });
            if redundant {
                trace!(keyword = %keyword.phrase, "excerpt overlaps an earlier one; suppressed");
                continue;
            }
            excerpts.push(excerpt.to_string());
        }

        debug!(
            keywords = keywords.len(),
            excerpts = excerpts.len(),
            "scan completed"
        );
        ScanResult {
            has_crisis_language: !keywords.is_empty(),
            keywords,
            excerpts,
        }
    }

    fn classify(&self, result: &ScanResult) -> RiskLevel {
        self.keywords.classify(result)
    }
}

/// Lowercase comparison copy of a transcript.
struct Normalized {
    text: String,
    /// Original character index for every byte of `text`.
    origin: Vec<usize>,
}

impl Normalized {
    fn new(transcript: &str) -> Self {
        let mut text = String::with_capacity(transcript.len());
        let mut origin = Vec::with_capacity(transcript.len());
        for (char_idx, ch) in transcript.chars().enumerate() {
            for lower in fold_char(ch) {
                text.push(lower);
                origin.extend(iter::repeat(char_idx).take(lower.len_utf8()));
            }
        }
        Self { text, origin }
    }

    /// Map a non-empty byte range of the lowercase copy to a character range
    /// of the original transcript.
    fn original_span(&self, start: usize, end: usize) -> (usize, usize) {
        (self.origin[start], self.origin[end - 1] + 1)
    }
}

/// Slice `window` characters of context on each side of a character span,
/// clipped to the transcript bounds.
fn extract_excerpt<'a>(
    transcript: &'a str,
    char_offsets: &[usize],
    span: (usize, usize),
    window: usize,
) -> &'a str {
    let char_len = char_offsets.len() - 1;
    let start = span.0.saturating_sub(window);
    let end = span.1.saturating_add(window).min(char_len);
    &transcript[char_offsets[start]..char_offsets[end]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{fold_case, Keyword, Severity};
    use proptest::prelude::*;

    fn scanner_with_window(window: usize) -> KeywordScanner {
        KeywordScanner::with_config(
            keywords::builtin().clone(),
            ScannerConfig {
                context_window: window,
            },
        )
        .unwrap()
    }

    #[test]
    fn safe_transcript_has_no_findings() {
        let transcript = "
      THERAPIST: How have you been feeling this week?
      CLIENT: Better, actually. The breathing exercises have been helping.
      THERAPIST: That's wonderful to hear. What else has been going well?
      CLIENT: I've been sleeping better and feeling more motivated at work.
    ";
        let result = scan(transcript);
        assert!(!result.has_crisis_language);
        assert!(result.keywords.is_empty());
        assert!(result.excerpts.is_empty());
        assert_eq!(classify(&result), RiskLevel::None);
    }

    #[test]
    fn empty_transcript_is_a_valid_result() {
        let result = scan("");
        assert_eq!(result, ScanResult::default());
        assert_eq!(classify(&result), RiskLevel::None);
    }

    #[test]
    fn detects_kill_myself_end_to_end() {
        let transcript = "THERAPIST: How are you?\nCLIENT: I want to kill myself.";
        let result = scan(transcript);
        assert!(result.has_crisis_language);
        assert_eq!(result.keywords, vec!["kill myself"]);
        assert_eq!(result.excerpts.len(), 1);
        assert!(result.excerpts[0].contains("I want to kill myself."));
        assert_eq!(classify(&result), RiskLevel::High);
    }

    #[test]
    fn detects_harm_to_others_as_low_risk() {
        let result = scan("CLIENT: Sometimes I get so angry I want to hurt someone.");
        assert!(result.has_crisis_language);
        assert_eq!(result.keywords, vec!["hurt someone"]);
        assert_eq!(classify(&result), RiskLevel::Low);
    }

    #[test]
    fn detects_passive_ideation_phrase() {
        let transcript = "
      CLIENT: Not great. Sometimes I feel like I don't want to live anymore.
      THERAPIST: I hear that you're going through a really difficult time.
    ";
        let result = scan(transcript);
        assert!(result.keywords.contains(&"don't want to live".to_string()));
        assert!(!result.excerpts.is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let upper = scan("I'm thinking about SUICIDE");
        let lower = scan("i'm thinking about suicide");
        assert_eq!(upper.keywords, vec!["suicide"]);
        assert_eq!(upper.keywords, lower.keywords);
        assert!(upper.excerpts[0].contains("SUICIDE"));
    }

    #[test]
    fn repeated_phrase_is_listed_once() {
        let result = scan("CLIENT: I feel suicidal. I've felt suicidal for weeks.");
        assert_eq!(result.keywords, vec!["suicidal"]);
        assert_eq!(result.excerpts.len(), 1);
    }

    #[test]
    fn excerpt_follows_first_occurrence() {
        let transcript = format!("I feel suicidal.{} suicidal again", "z".repeat(200));
        let result = scan(&transcript);
        assert_eq!(result.keywords, vec!["suicidal"]);
        // "suicidal" starts at char 7; the window ends 80 chars after it.
        assert_eq!(result.excerpts, vec![transcript[..7 + 8 + 80].to_string()]);
    }

    #[test]
    fn detects_multiple_distinct_keywords() {
        let result = scan("CLIENT: I've been having suicidal thoughts and I want to hurt myself.");
        assert!(result.has_crisis_language);
        assert_eq!(result.keywords, vec!["suicidal", "hurt myself"]);
        assert_eq!(classify(&result), RiskLevel::High);
    }

    #[test]
    fn keywords_follow_set_order_not_text_order() {
        let result = scan("I want to hurt myself and sometimes I want to die.");
        assert_eq!(result.keywords, vec!["hurt myself", "want to die"]);
    }

    #[test]
    fn match_inside_larger_word_counts() {
        let result = scan("We discussed her suicidality screening.");
        assert_eq!(result.keywords, vec!["suicidal"]);
    }

    #[test]
    fn phrase_split_across_lines_does_not_match() {
        let result = scan("CLIENT: I want to kill\nmyself.");
        assert!(!result.keywords.contains(&"kill myself".to_string()));
        assert!(!result.has_crisis_language);
    }

    #[test]
    fn excerpt_spans_window_of_original_case_text() {
        let transcript = format!("{}Kill Myself{}", "a".repeat(100), "b".repeat(100));
        let result = scan(&transcript);
        assert_eq!(
            result.excerpts,
            vec![format!("{}Kill Myself{}", "a".repeat(80), "b".repeat(80))]
        );
    }

    #[test]
    fn excerpt_clips_to_transcript_bounds() {
        let transcript = format!("kill myself{}", "b".repeat(100));
        let result = scan(&transcript);
        assert_eq!(result.excerpts, vec![transcript[..11 + 80].to_string()]);
    }

    #[test]
    fn excerpt_window_counts_characters_not_bytes() {
        let transcript = format!("{}kill myself{}", "é".repeat(100), "ü".repeat(100));
        let result = scan(&transcript);
        assert_eq!(
            result.excerpts,
            vec![format!("{}kill myself{}", "é".repeat(80), "ü".repeat(80))]
        );
    }

    #[test]
    fn length_changing_case_mappings_keep_offsets_aligned() {
        // U+0130 lowercases to two chars; U+212A (Kelvin sign) lowercases to `k`.
        let transcript = format!("{}\u{0130}\u{0130} \u{212A}ILL MYSELF", "x".repeat(90));
        let result = scan(&transcript);
        assert_eq!(result.keywords, vec!["kill myself"]);
        let expected: String = transcript.chars().skip(92 + 1 - 80).collect();
        assert_eq!(result.excerpts, vec![expected]);
        assert!(result.excerpts[0].ends_with("\u{212A}ILL MYSELF"));
    }

    #[test]
    fn final_sigma_keyword_matches_uppercase_transcript() {
        let keywords = KeywordSet::new(vec![Keyword::new("ΠΟΝΟΣ", Severity::Low).unwrap()])
            .unwrap();
        assert_eq!(keywords.iter().next().unwrap().phrase, "πονοσ");
        assert_eq!(Keyword::new("πονος", Severity::Low).unwrap().phrase, "πονοσ");
        let scanner = KeywordScanner::new(keywords).unwrap();
        for transcript in [
            "Νιώθω ΠΟΝΟΣ σήμερα",
            "νιώθω πονος σήμερα",
            "νιώθω πονοσ σήμερα",
        ] {
            let result = scanner.scan(transcript);
            assert_eq!(result.keywords, vec!["πονοσ"], "transcript: {transcript}");
            assert_eq!(result.excerpts, vec![transcript]);
        }
    }

    #[test]
    fn closely_spaced_matches_share_one_excerpt() {
        let result = scan("CLIENT: I want to kill myself, I think about suicide.");
        assert_eq!(result.keywords, vec!["kill myself", "suicide"]);
        assert_eq!(result.excerpts.len(), 1);
        assert!(result.excerpts.len() < result.keywords.len());
        assert_eq!(classify(&result), RiskLevel::High);
    }

    // Known limitation: suppression only fires on substring containment, so
    // windows that overlap by position but not as strings are both kept.
    #[test]
    fn positionally_overlapping_windows_are_both_kept() {
        let transcript = format!(
            "{} kill myself {} suicide {}",
            "x".repeat(200),
            "y".repeat(30),
            "z".repeat(200)
        );
        let result = scan(&transcript);
        assert_eq!(result.keywords, vec!["kill myself", "suicide"]);
        assert_eq!(result.excerpts.len(), 2);
        assert!(result.excerpts[0].contains("suicide"));
        assert!(result.excerpts[1].contains("kill myself"));
    }

    #[test]
    fn custom_window_narrows_excerpts() {
        let scanner = scanner_with_window(5);
        let result = scanner.scan("aaaaaaaaaa suicide bbbbbbbbbb");
        assert_eq!(result.excerpts, vec!["aaaa suicide bbbb"]);
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = KeywordScanner::with_config(
            keywords::builtin().clone(),
            ScannerConfig { context_window: 0 },
        )
        .err()
        .expect("zero window should be rejected");
        assert!(err.to_string().contains("context window"));
    }

    #[test]
    fn empty_keyword_set_never_matches() {
        let scanner = KeywordScanner::new(KeywordSet::new(Vec::new()).unwrap()).unwrap();
        let result = scanner.scan("I want to kill myself");
        assert_eq!(result, ScanResult::default());
    }

    #[test]
    fn scanner_classifies_with_its_own_set() {
        let set = KeywordSet::new(vec![
            Keyword::new("hopeless", Severity::High).unwrap(),
            Keyword::new("tired", Severity::Low).unwrap(),
        ])
        .unwrap();
        let scanner = KeywordScanner::new(set).unwrap();
        let result = scanner.scan("I'm tired and HOPELESS.");
        assert_eq!(result.keywords, vec!["hopeless", "tired"]);
        assert_eq!(scanner.classify(&result), RiskLevel::High);
    }

    #[test]
    fn scanner_is_shareable_across_threads() {
        let scanner = scanner_with_window(80);
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| scanner.scan("I want to end it all.")))
                .collect();
            for handle in handles {
                let result = handle.join().unwrap();
                assert_eq!(result.keywords, vec!["end it all"]);
            }
        });
    }

    #[test]
    fn classify_buckets_by_highest_severity() {
        let kill = ScanResult {
            has_crisis_language: true,
            keywords: vec!["kill myself".into()],
            excerpts: vec!["...I want to kill myself...".into()],
        };
        let hurt = ScanResult {
            has_crisis_language: true,
            keywords: vec!["hurt myself".into()],
            excerpts: vec!["...thoughts about hurting myself...".into()],
        };
        let mixed = ScanResult {
            has_crisis_language: true,
            keywords: vec!["hurt myself".into(), "want to die".into()],
            excerpts: Vec::new(),
        };
        assert_eq!(classify(&kill), RiskLevel::High);
        assert_eq!(classify(&hurt), RiskLevel::Low);
        assert_eq!(classify(&mixed), RiskLevel::High);
        assert_eq!(classify(&ScanResult::default()), RiskLevel::None);
    }

    fn filler() -> impl Strategy<Value = String> {
        proptest::string::string_regex("[A-Za-z0-9 .,'\\n-]{0,300}").unwrap()
    }

    fn builtin_phrase() -> impl Strategy<Value = String> {
        proptest::sample::select(
            keywords::BUILTIN_KEYWORDS
                .iter()
                .map(|(phrase, _)| phrase.to_string())
                .collect::<Vec<_>>(),
        )
    }

    proptest! {
        #[test]
        fn result_invariants_hold(text in filler()) {
            let result = scan(&text);
            prop_assert_eq!(result.has_crisis_language, !result.keywords.is_empty());
            prop_assert!(result.validate().is_ok());
            prop_assert!(result.excerpts.len() <= result.keywords.len());
            let lower = fold_case(&text);
            for keyword in &result.keywords {
                prop_assert!(lower.contains(keyword.as_str()));
            }
            for (i, a) in result.excerpts.iter().enumerate() {
                for b in result.excerpts.iter().skip(i + 1) {
                    prop_assert!(!a.contains(b.as_str()) && !b.contains(a.as_str()));
                }
            }
        }

        #[test]
        fn embedded_phrase_is_always_found(
            before in filler(),
            phrase in builtin_phrase(),
            after in filler(),
        ) {
            let text = format!("{before}{}{after}", phrase.to_uppercase());
            let result = scan(&text);
            prop_assert!(result.keywords.contains(&phrase));
            prop_assert!(result.has_crisis_language);
            prop_assert_ne!(classify(&result), RiskLevel::None);
        }
    }
}
