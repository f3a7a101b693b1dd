//! Term processors: pure functions that normalize a token or reject it.
//!
//! Every processor has a stable textual descriptor. Descriptors are stored in index
//! properties, and two indices can be combined only if their descriptors are equal.

use std::{borrow::Cow, sync::Arc};

use ahash::AHashSet;

/// Normalizes a token into a term, or rejects it.
pub trait TermProcessor: Send + Sync {
    /// Returns the normalized term, or `None` if the token must not be indexed.
    fn process<'a>(&self, token: &'a str) -> Option<Cow<'a, str>>;

    /// Stable textual description of this processor and its parameters.
    fn descriptor(&self) -> String;
}

impl<T: TermProcessor + ?Sized> TermProcessor for Arc<T> {
    fn process<'a>(&self, token: &'a str) -> Option<Cow<'a, str>> {
        (**self).process(token)
    }

    fn descriptor(&self) -> String {
        (**self).descriptor()
    }
}

/// Indexes every token as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProcessor;

impl TermProcessor for IdentityProcessor {
    fn process<'a>(&self, token: &'a str) -> Option<Cow<'a, str>> {
        Some(Cow::Borrowed(token))
    }

    fn descriptor(&self) -> String {
        "identity".to_string()
    }
}

/// Lowercases every token.
#[derive(Debug, Clone, Copy, Default)]
pub struct DowncaseProcessor;

impl TermProcessor for DowncaseProcessor {
    fn process<'a>(&self, token: &'a str) -> Option<Cow<'a, str>> {
        if token.chars().any(char::is_uppercase) {
            Some(Cow::Owned(token.to_lowercase()))
        } else {
            Some(Cow::Borrowed(token))
        }
    }

    fn descriptor(&self) -> String {
        "downcase".to_string()
    }
}

/// Rejects the terms of a stop list after applying an inner processor.
pub struct StopwordProcessor {
    inner: Arc<dyn TermProcessor>,
    stopwords: AHashSet<String>,
    fingerprint: u64,
}

impl StopwordProcessor {
    /// Creates a processor that applies `inner` and then rejects any resulting term
    /// contained in `stopwords`.
    pub fn new<I, S>(inner: Arc<dyn TermProcessor>, stopwords: I) -> StopwordProcessor
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stopwords = stopwords
            .into_iter()
            .map(Into::into)
            .collect::<AHashSet<String>>();
        let mut sorted = stopwords.iter().map(String::as_str).collect::<Vec<_>>();
        sorted.sort_unstable();
        StopwordProcessor {
            inner,
            fingerprint: fnv1a(sorted.iter().flat_map(|w| w.bytes().chain(Some(0)))),
            stopwords,
        }
    }

    pub fn len(&self) -> usize {
        self.stopwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stopwords.is_empty()
    }
}

impl TermProcessor for StopwordProcessor {
    fn process<'a>(&self, token: &'a str) -> Option<Cow<'a, str>> {
        let term = self.inner.process(token)?;
        if self.stopwords.contains(term.as_ref()) {
            None
        } else {
            Some(term)
        }
    }

    fn descriptor(&self) -> String {
        format!(
            "stopwords[{}:{:016x}]({})",
            self.stopwords.len(),
            self.fingerprint,
            self.inner.descriptor()
        )
    }
}

/// 64-bit FNV-1a. Unlike the map hashers it does not depend on a random seed, so
/// descriptors are stable across processes.
fn fnv1a(bytes: impl Iterator<Item = u8>) -> u64 {
    bytes.fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let processor = IdentityProcessor;
        assert_eq!(processor.process("Cat").as_deref(), Some("Cat"));
        assert_eq!(processor.descriptor(), "identity");
    }

    #[test]
    fn test_downcase_borrows_when_possible() {
        let processor = DowncaseProcessor;
        assert!(matches!(processor.process("cat"), Some(Cow::Borrowed("cat"))));
        assert_eq!(processor.process("ÉCOLE").as_deref(), Some("école"));
    }

    #[test]
    fn test_stopwords() {
        let processor = StopwordProcessor::new(Arc::new(DowncaseProcessor), ["the", "a"]);
        assert_eq!(processor.len(), 2);
        assert_eq!(processor.process("The"), None);
        assert_eq!(processor.process("Cat").as_deref(), Some("cat"));
    }

    #[test]
    fn test_stopword_descriptor_depends_on_list() {
        let a = StopwordProcessor::new(Arc::new(IdentityProcessor), ["the", "a"]);
        let b = StopwordProcessor::new(Arc::new(IdentityProcessor), ["a", "the"]);
        let c = StopwordProcessor::new(Arc::new(IdentityProcessor), ["an", "the"]);
        assert_eq!(a.descriptor(), b.descriptor());
        assert_ne!(a.descriptor(), c.descriptor());
        assert!(a.descriptor().ends_with("(identity)"));
    }
}
