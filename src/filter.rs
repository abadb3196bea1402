//! Glob-style include/exclude filtering over page paths.
//!
//! Patterns are literal except for `*`, which matches any run of characters;
//! a pattern must match the whole path.

use regex::Regex;

use crate::config::TrackerConfig;
use crate::errors::{TrackerError, TrackerResult};

#[derive(Clone, Debug)]
pub struct PathPattern {
    regex: Regex,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> TrackerResult<Self> {
        let escaped = regex::escape(pattern).replace(r"\*", ".*");
        let regex = Regex::new(&format!("^{escaped}$")).map_err(|source| TrackerError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Compiled exclude/include lists. Exclusion always wins.
#[derive(Clone, Debug, Default)]
pub struct PathFilter {
    exclude: Vec<PathPattern>,
    include: Vec<PathPattern>,
}

impl PathFilter {
    pub fn new(exclude: &[String], include: &[String]) -> Self {
        Self {
            exclude: compile_all(exclude),
            include: compile_all(include),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(&config.exclude_pages, &config.include_pages)
    }

    pub fn allows(&self, path: &str) -> bool {
        if self.exclude.iter().any(|pattern| pattern.matches(path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|pattern| pattern.matches(path))
    }
}

fn compile_all(patterns: &[String]) -> Vec<PathPattern> {
    patterns
        .iter()
        .filter_map(|pattern| match PathPattern::compile(pattern) {
            Ok(compiled) => Some(compiled),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring path pattern");
                None
            }
        })
        .collect()
}

/// One-shot form of [`PathFilter::allows`].
pub fn should_track_path(path: &str, config: &TrackerConfig) -> bool {
    PathFilter::from_config(config).allows(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(exclude: &[&str], include: &[&str]) -> TrackerConfig {
        TrackerConfig {
            exclude_pages: exclude.iter().map(|s| s.to_string()).collect(),
            include_pages: include.iter().map(|s| s.to_string()).collect(),
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn include_list_restricts_paths() {
        let cfg = config(&[], &["/blog/*"]);
        assert!(should_track_path("/blog/post-1", &cfg));
        assert!(!should_track_path("/about", &cfg));
    }

    #[test]
    fn empty_lists_allow_everything() {
        assert!(should_track_path("/anything/at/all", &config(&[], &[])));
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let cfg = config(&["/blog/drafts/*"], &["/blog/*"]);
        assert!(should_track_path("/blog/post-1", &cfg));
        assert!(!should_track_path("/blog/drafts/wip", &cfg));
    }

    #[test]
    fn patterns_are_anchored_and_literal() {
        let pattern = PathPattern::compile("/docs/v1.2/*").unwrap();
        assert!(pattern.matches("/docs/v1.2/intro"));
        assert!(!pattern.matches("/docs/v1x2/intro"));
        assert!(!pattern.matches("/en/docs/v1.2/intro"));

        let exact = PathPattern::compile("/about").unwrap();
        assert!(exact.matches("/about"));
        assert!(!exact.matches("/about/team"));
    }

    #[test]
    fn star_matches_across_segments() {
        let pattern = PathPattern::compile("/shop/*/checkout").unwrap();
        assert!(pattern.matches("/shop/eu/de/checkout"));
        assert!(PathPattern::compile("*").unwrap().matches(""));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        let pattern = PathPattern::compile("/search(+)?[x]").unwrap();
        assert!(pattern.matches("/search(+)?[x]"));
        assert!(!pattern.matches("/search"));
    }
}
