use anyhow::Result;
use once_cell::sync::Lazy;

use super::{Keyword, KeywordRepository, KeywordSet, Severity};

/// Built-in crisis phrases in match order. `High` marks explicit suicidal
/// intent; everything else is self-harm or harm-to-others language.
pub const BUILTIN_KEYWORDS: &[(&str, Severity)] = &[
    ("kill myself", Severity::High),
    ("end my life", Severity::High),
    ("suicidal", Severity::High),
    ("suicide", Severity::High),
    ("self-harm", Severity::Low),
    ("hurt myself", Severity::Low),
    ("hurt someone", Severity::Low),
    ("harm others", Severity::Low),
    ("don't want to live", Severity::Low),
    ("want to die", Severity::High),
    ("better off dead", Severity::Low),
    ("no reason to live", Severity::Low),
    ("can't go on", Severity::Low),
    ("end it all", Severity::Low),
];

static BUILTIN_SET: Lazy<KeywordSet> = Lazy::new(|| KeywordSet {
    keywords: BUILTIN_KEYWORDS
        .iter()
        .map(|(phrase, severity)| Keyword {
            phrase: (*phrase).to_string(),
            severity: *severity,
        })
        .collect(),
});

/// The process-wide built-in keyword set.
pub fn builtin() -> &'static KeywordSet {
    &BUILTIN_SET
}

/// Repository serving the compiled-in keyword set.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinKeywords;

impl KeywordRepository for BuiltinKeywords {
    fn load_keywords(&self) -> Result<KeywordSet> {
        Ok(builtin().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_passes_validation() {
        let rebuilt = KeywordSet::new(builtin().iter().cloned().collect())
            .expect("built-in keywords must be lowercase and unique");
        assert_eq!(&rebuilt, builtin());
        assert_eq!(builtin().len(), 14);
    }

    #[test]
    fn high_severity_subset_is_explicit_suicidal_intent() {
        let high: Vec<_> = builtin()
            .iter()
            .filter(|keyword| keyword.severity == Severity::High)
            .map(|keyword| keyword.phrase.as_str())
            .collect();
        assert_eq!(
            high,
            vec!["kill myself", "end my life", "suicidal", "suicide", "want to die"]
        );
    }

    #[test]
    fn builtin_repository_returns_builtin_set() {
        let set = BuiltinKeywords.load_keywords().unwrap();
        assert_eq!(set.iter().next().map(|k| k.phrase.as_str()), Some("kill myself"));
        assert_eq!(set.severity_of("hurt myself"), Some(Severity::Low));
    }
}
