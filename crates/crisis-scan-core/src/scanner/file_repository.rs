use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing::debug;

use super::{Keyword, KeywordRepository, KeywordSet, Severity};

/// Loads a keyword pack from `keywords.txt` under a base directory.
///
/// One keyword per line as `severity|phrase`; blank lines and lines starting
/// with `#` are ignored. The pack is read once and cached.
pub struct FileKeywordRepository {
    base_path: PathBuf,
    cache: OnceCell<KeywordSet>,
}

impl FileKeywordRepository {
    /// Create a repository rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            cache: OnceCell::new(),
        }
    }

    pub fn keywords_path(&self) -> PathBuf {
        self.base_path.join("keywords.txt")
    }

    fn read_pack(&self) -> Result<KeywordSet> {
        let path = self.keywords_path();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read keyword pack at {}", path.display()))?;
        let mut keywords = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parts: Vec<_> = trimmed.splitn(2, '|').map(str::trim).collect();
            if parts.len() != 2 {
                return Err(anyhow::anyhow!(
                    "invalid keyword format at {}:{} (expected severity|phrase)",
                    path.display(),
                    idx + 1
                ));
            }
            let severity: Severity = parts[0]
                .parse()
                .with_context(|| format!("at {}:{}", path.display(), idx + 1))?;
            let keyword = Keyword::new(parts[1], severity)
                .with_context(|| format!("at {}:{}", path.display(), idx + 1))?;
            if keywords.iter().any(|k: &Keyword| k.phrase == keyword.phrase) {
                return Err(anyhow::anyhow!(
                    "duplicate keyword `{}` at {}:{}",
                    keyword.phrase,
                    path.display(),
                    idx + 1
                ));
            }
            keywords.push(keyword);
        }
        let set = KeywordSet::new(keywords)?;
        debug!(count = set.len(), path = %path.display(), "loaded keyword pack");
        Ok(set)
    }
}

impl KeywordRepository for FileKeywordRepository {
    fn load_keywords(&self) -> Result<KeywordSet> {
        let set = self.cache.get_or_try_init(|| self.read_pack())?;
        Ok(set.clone())
    }
}
