use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::Diagnostic;

/// Decides whether a piece of diagnostic text is the one a test is
/// waiting for.
pub trait MessageMatcher: fmt::Debug + Send + Sync {
    fn is_match(&self, text: &str) -> bool;
}

/// Matches text containing the given string. Permissive on purpose:
/// drivers decorate the same rule violation with different text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Substring(pub String);

impl MessageMatcher for Substring {
    fn is_match(&self, text: &str) -> bool {
        text.contains(&self.0[..])
    }
}

/// Matches text equal to the given string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Exact(pub String);

impl MessageMatcher for Exact {
    fn is_match(&self, text: &str) -> bool {
        text == self.0
    }
}

impl MessageMatcher for Regex {
    fn is_match(&self, text: &str) -> bool {
        Regex::is_match(self, text)
    }
}

/// A shareable matcher plus a description of it for failure reports.
#[derive(Clone)]
pub struct Pattern {
    matcher: Arc<dyn MessageMatcher>,
    desc: String,
}

impl Pattern {
    pub fn new(matcher: impl MessageMatcher + 'static) -> Self {
        let desc = format!("{:?}", matcher);
        Pattern { matcher: Arc::new(matcher), desc }
    }

    pub fn substring(text: impl Into<String>) -> Self {
        let text = text.into();
        let desc = format!("{:?}", text);
        Pattern { matcher: Arc::new(Substring(text)), desc }
    }

    pub fn exact(text: impl Into<String>) -> Self {
        let text = text.into();
        let desc = format!("={:?}", text);
        Pattern { matcher: Arc::new(Exact(text)), desc }
    }

    pub fn regex(re: Regex) -> Self {
        let desc = format!("/{}/", re.as_str());
        Pattern { matcher: Arc::new(re), desc }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    /// True if either the identifying code or the message text of the
    /// diagnostic matches.
    pub fn matches(&self, diagnostic: &Diagnostic) -> bool {
        diagnostic.texts().iter().any(|text| self.is_match(text))
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.matcher).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.desc)
    }
}

impl From<&str> for Pattern {
    fn from(text: &str) -> Self {
        Pattern::substring(text)
    }
}

impl From<String> for Pattern {
    fn from(text: String) -> Self {
        Pattern::substring(text)
    }
}

impl From<Substring> for Pattern {
    fn from(sub: Substring) -> Self {
        Pattern::substring(sub.0)
    }
}

impl From<Exact> for Pattern {
    fn from(exact: Exact) -> Self {
        Pattern::exact(exact.0)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::regex(re)
    }
}


#[cfg(test)]
unit::collect_tests![tests];
