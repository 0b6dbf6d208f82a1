use regex::Regex;

use crate::Test;

pub trait TestFilter<T>: std::fmt::Debug {
    fn is_match(&self, test: &T) -> bool;
}

impl<T, F: TestFilter<T>> TestFilter<T> for Option<F> {
    fn is_match(&self, test: &T) -> bool {
         self.as_ref().map_or(true, |filter| filter.is_match(test))
    }
}

/// Selects tests by their full path name.
#[derive(Clone, Debug)]
pub enum NameFilter {
    Pattern(Regex),
    /// Matches only the test with exactly this name.
    Exact(String),
}

impl<D> TestFilter<Test<D>> for NameFilter {
    fn is_match(&self, test: &Test<D>) -> bool {
        match self {
            NameFilter::Pattern(re) => re.is_match(test.name()),
            NameFilter::Exact(name) => test.name() == name,
        }
    }
}
