//! Exclude patterns for folder sync.
//!
//! `*` matches any run of characters (including `/`), `?` exactly one. A
//! pattern matches a path when it matches the whole relative path or just its
//! last component, so `*.tmp` excludes temp files at any depth and
//! `cache/*` excludes everything below a top-level `cache`.

#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<String>,
}

fn wildcard_matches(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();

    let mut p = 0usize;
    let mut t = 0usize;
    let mut star_pat: Option<usize> = None;
    let mut star_text = 0usize;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            while p < pattern.len() && pattern[p] == b'*' {
                p += 1;
            }
            star_pat = Some(p);
            star_text = t;
        } else if let Some(saved) = star_pat {
            star_text += 1;
            t = star_text;
            p = saved;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

impl ExcludeSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().replace('\\', "/").trim_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `relative` itself matches a pattern.
    pub fn matches(&self, relative: &str) -> bool {
        let basename = relative.rsplit('/').next().unwrap_or_default();
        self.patterns
            .iter()
            .any(|pat| wildcard_matches(pat, relative) || wildcard_matches(pat, basename))
    }

    /// Whether `relative` or any of its ancestors matches a pattern.
    pub fn excludes(&self, relative: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        relative
            .match_indices('/')
            .map(|(i, _)| &relative[..i])
            .chain(std::iter::once(relative))
            .any(|p| self.matches(p))
    }
}
