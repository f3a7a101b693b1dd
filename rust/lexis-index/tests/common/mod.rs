#![allow(dead_code)]

use std::sync::Arc;

use lexis_index::{
    BuildSummary, IndexBuilder, IndexBuilderConfig, ScanMode, SourceDocument,
    VirtualDocumentResolver,
    term_processor::{IdentityProcessor, StopwordProcessor, TermProcessor},
};
use lexis_io::IndexStorage;

pub fn identity() -> Arc<dyn TermProcessor> {
    Arc::new(IdentityProcessor)
}

pub fn stopwords(words: &[&str]) -> Arc<dyn TermProcessor> {
    Arc::new(StopwordProcessor::new(identity(), words.iter().copied()))
}

/// Builds `basename` from whitespace-separated documents.
pub fn build_text(
    storage: Arc<dyn IndexStorage>,
    basename: &str,
    documents: &[&str],
    processor: Arc<dyn TermProcessor>,
    config: IndexBuilderConfig,
) -> BuildSummary {
    let builder = IndexBuilder::new(storage, processor, config).unwrap();
    let mut source = documents.iter().map(|text| SourceDocument::text(text));
    builder
        .build(basename, ScanMode::Standard, &mut source)
        .unwrap()
}

/// Resolves fragment specifiers by their index in a fixed list.
pub struct ListResolver(pub Vec<&'static str>);

impl VirtualDocumentResolver for ListResolver {
    fn resolve(&self, specifier: &str) -> Option<u64> {
        self.0
            .iter()
            .position(|&name| name == specifier)
            .map(|i| i as u64)
    }

    fn number_of_documents(&self) -> u64 {
        self.0.len() as u64
    }
}

/// Deterministic random corpus over a small vocabulary `w0..w{vocabulary}`.
pub fn random_corpus(seed: u64, documents: usize, vocabulary: usize) -> Vec<String> {
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..documents)
        .map(|_| {
            let len = rng.usize(1..40);
            (0..len)
                .map(|_| format!("w{}", rng.usize(0..vocabulary)))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}
