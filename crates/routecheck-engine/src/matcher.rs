//! Expected-value matchers shared by the poller and the sampler

use std::fmt;

use regex::Regex;
use routecheck_common::{Error, Result};

/// How an observation is compared against the expected pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Whole-string equality
    Exact,
    /// Substring containment
    Contains,
    /// Regular expression search (unanchored unless the pattern anchors)
    Regex,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Exact => write!(f, "exact"),
            MatchMode::Contains => write!(f, "contains"),
            MatchMode::Regex => write!(f, "regex"),
        }
    }
}

/// An expected value together with its match mode
#[derive(Debug, Clone)]
pub struct Matcher {
    mode: MatchMode,
    pattern: String,
    regex: Option<Regex>,
}

impl Matcher {
    /// Build a matcher for the given mode.
    ///
    /// Fails only for [`MatchMode::Regex`] with an invalid pattern.
    pub fn new(mode: MatchMode, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let regex = match mode {
            MatchMode::Regex => Some(Regex::new(&pattern).map_err(|e| {
                Error::operation("matcher", format!("invalid regex {pattern:?}: {e}"))
            })?),
            MatchMode::Exact | MatchMode::Contains => None,
        };
        Ok(Self {
            mode,
            pattern,
            regex,
        })
    }

    /// Match the whole observation
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            mode: MatchMode::Exact,
            pattern: value.into(),
            regex: None,
        }
    }

    /// Match when the observation contains `needle`
    pub fn contains(needle: impl Into<String>) -> Self {
        Self {
            mode: MatchMode::Contains,
            pattern: needle.into(),
            regex: None,
        }
    }

    /// Match when `pattern` finds a match anywhere in the observation
    pub fn regex(pattern: impl Into<String>) -> Result<Self> {
        Self::new(MatchMode::Regex, pattern)
    }

    /// The match mode
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// The expected value or pattern as given
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether `observed` satisfies this matcher
    pub fn matches(&self, observed: &str) -> bool {
        match (&self.mode, &self.regex) {
            (MatchMode::Exact, _) => observed == self.pattern,
            (MatchMode::Contains, _) => observed.contains(&self.pattern),
            (MatchMode::Regex, Some(re)) => re.is_match(observed),
            (MatchMode::Regex, None) => false,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.mode, self.pattern)
    }
}

/// Index of the first matcher, in declaration order, that accepts `observed`
pub fn first_match(matchers: &[Matcher], observed: &str) -> Option<usize> {
    matchers.iter().position(|m| m.matches(observed))
}
