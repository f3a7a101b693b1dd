//! Memory-bounded accumulation of document streams into sorted batches.
//!
//! A [`Scanner`] consumes a [`DocumentSource`], feeds every accepted token to a
//! [`TermAccumulator`] and writes the accumulated postings as a batch named
//! `<basename>@<n>` whenever one of the batch budgets runs out:
//!
//! - the number of documents per batch is reached,
//! - the number of distinct terms exceeds its limit,
//! - the [`MemoryMonitor`] detects memory pressure that compaction cannot relieve,
//! - a posting buffer had to overcommit the memory budget.
//!
//! Closing the scanner writes the last batch and a cluster properties record that
//! lets the batch set be combined as a single logical index.

use std::sync::Arc;

use lexis_common::{Result, verify_arg};
use serde::{Deserialize, Serialize};

use crate::{
    features::{Completeness, PayloadSpec},
    properties::ClusterStrategy,
};

mod accumulator;
mod batch_writer;
mod memory_monitor;
mod posting_buffer;
mod scanner;

pub use accumulator::{AccumulatorMode, FrozenBatch, PAYLOAD_TERM, TermAccumulator};
pub use batch_writer::{BatchSummary, BatchWriter};
pub use memory_monitor::{MemoryMonitor, MemoryProbe, MemoryVerdict};
pub use scanner::{Scanner, cleanup_batches};

/// Configuration of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum number of documents per batch.
    pub documents_per_batch: usize,
    /// Maximum number of distinct terms per batch. A batch is flushed after the
    /// document that exceeds it.
    pub max_terms: usize,
    /// Memory ceiling, in bytes, of the posting buffers and the term map. `None`
    /// means unlimited.
    pub memory_budget: Option<u64>,
    /// Number of documents between two memory checks.
    pub memory_check_interval: usize,
    /// Available-memory fraction below which the accumulator is compacted.
    pub compaction_threshold: f64,
    /// Available-memory fraction below which a compacted accumulator is flushed.
    pub flush_threshold: f64,
    /// Positions inserted after each virtual fragment.
    pub virtual_gap: u32,
    pub completeness: Completeness,
    /// Type of the document payloads. Set exactly when `completeness` is
    /// [`Completeness::Payloads`].
    pub payload: Option<PayloadSpec>,
    /// Name of the indexed field, recorded in the properties.
    pub field: Option<String>,
    /// Number of new terms between two progress reports.
    pub term_report_interval: usize,
}

impl ScanConfig {
    pub const DEFAULT_DOCUMENTS_PER_BATCH: usize = 100_000;
    pub const DEFAULT_MAX_TERMS: usize = 10_000_000;
    pub const DEFAULT_MEMORY_CHECK_INTERVAL: usize = 256;
    pub const DEFAULT_VIRTUAL_GAP: u32 = 64;

    pub fn validate(&self) -> Result<()> {
        verify_arg!(documents_per_batch, self.documents_per_batch > 0);
        verify_arg!(max_terms, self.max_terms > 0);
        verify_arg!(memory_check_interval, self.memory_check_interval > 0);
        verify_arg!(
            compaction_threshold,
            (0.0..=1.0).contains(&self.compaction_threshold)
        );
        verify_arg!(flush_threshold, (0.0..=1.0).contains(&self.flush_threshold));
        verify_arg!(virtual_gap, self.virtual_gap > 0);
        verify_arg!(term_report_interval, self.term_report_interval > 0);
        verify_arg!(
            payload,
            self.payload.is_some() == (self.completeness == Completeness::Payloads)
        );
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            documents_per_batch: Self::DEFAULT_DOCUMENTS_PER_BATCH,
            max_terms: Self::DEFAULT_MAX_TERMS,
            memory_budget: None,
            memory_check_interval: Self::DEFAULT_MEMORY_CHECK_INTERVAL,
            compaction_threshold: 0.10,
            flush_threshold: 0.30,
            virtual_gap: Self::DEFAULT_VIRTUAL_GAP,
            completeness: Completeness::default(),
            payload: None,
            field: None,
            term_report_interval: 1_000_000,
        }
    }
}

/// Maps the ordinal of a document in the stream to its document pointer.
///
/// The map must be injective over the documents of a scan.
pub trait DocumentRemap: Send + Sync {
    /// Returns the pointer of the `ordinal`-th document, or `None` if the map does
    /// not cover it.
    fn pointer(&self, ordinal: u64) -> Option<u64>;
}

impl DocumentRemap for Vec<u64> {
    fn pointer(&self, ordinal: u64) -> Option<u64> {
        self.get(usize::try_from(ordinal).ok()?).copied()
    }
}

/// Resolves the specifier of a virtual fragment to a document pointer.
pub trait VirtualDocumentResolver: Send + Sync {
    /// Returns the pointer of the document `specifier` belongs to, or `None` if the
    /// fragment cannot be attributed.
    fn resolve(&self, specifier: &str) -> Option<u64>;

    /// Size of the pointer space; every resolved pointer is below it.
    fn number_of_documents(&self) -> u64;
}

/// Determines how stream documents are assigned document pointers.
#[derive(Clone)]
pub enum ScanMode {
    /// Pointers are the ordinals of the documents in the stream.
    Standard,
    /// Pointers are given by a caller-supplied map.
    Remapped(Arc<dyn DocumentRemap>),
    /// Documents are lists of fragments, each resolved to a pointer. Several
    /// fragments may contribute to the same pointer.
    Virtual(Arc<dyn VirtualDocumentResolver>),
}

impl ScanMode {
    /// Strategy that combines the batches of a scan in this mode, with the
    /// concatenation cut points left empty.
    pub fn cluster_strategy(&self) -> ClusterStrategy {
        match self {
            ScanMode::Standard => ClusterStrategy::Concatenate {
                cut_points: Vec::new(),
            },
            ScanMode::Remapped(_) => ClusterStrategy::Merge,
            ScanMode::Virtual(_) => ClusterStrategy::Paste,
        }
    }
}

impl std::fmt::Debug for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMode::Standard => f.write_str("Standard"),
            ScanMode::Remapped(_) => f.write_str("Remapped"),
            ScanMode::Virtual(resolver) => f
                .debug_struct("Virtual")
                .field("documents", &resolver.number_of_documents())
                .finish(),
        }
    }
}

/// A part of a virtual document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFragment {
    /// Passed to the [`VirtualDocumentResolver`].
    pub specifier: String,
    pub tokens: Vec<String>,
}

impl VirtualFragment {
    pub fn new<I, S>(specifier: impl Into<String>, tokens: I) -> VirtualFragment
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VirtualFragment {
            specifier: specifier.into(),
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentContent {
    /// Ordered token stream of a plain document.
    Tokens(Vec<String>),
    /// Fragments of a virtual document.
    Fragments(Vec<VirtualFragment>),
    /// The payload of a document in a payload scan.
    Payload(Vec<u8>),
}

/// A document produced by a [`DocumentSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Expected document pointer. When present it is checked against the pointer
    /// assigned by the scan mode.
    pub pointer: Option<u64>,
    pub content: DocumentContent,
}

impl SourceDocument {
    pub fn tokens<I, S>(tokens: I) -> SourceDocument
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SourceDocument {
            pointer: None,
            content: DocumentContent::Tokens(tokens.into_iter().map(Into::into).collect()),
        }
    }

    /// Splits `text` on whitespace.
    pub fn text(text: &str) -> SourceDocument {
        SourceDocument::tokens(text.split_whitespace())
    }

    pub fn fragments(fragments: Vec<VirtualFragment>) -> SourceDocument {
        SourceDocument {
            pointer: None,
            content: DocumentContent::Fragments(fragments),
        }
    }

    pub fn payload(payload: impl Into<Vec<u8>>) -> SourceDocument {
        SourceDocument {
            pointer: None,
            content: DocumentContent::Payload(payload.into()),
        }
    }

    pub fn with_pointer(mut self, pointer: u64) -> SourceDocument {
        self.pointer = Some(pointer);
        self
    }
}

/// A stream of documents. `Ok(None)` marks the end of the stream.
pub trait DocumentSource {
    fn next_document(&mut self) -> Result<Option<SourceDocument>>;
}

impl<I> DocumentSource for I
where
    I: Iterator<Item = SourceDocument>,
{
    fn next_document(&mut self) -> Result<Option<SourceDocument>> {
        Ok(self.next())
    }
}

/// Figures of a completed scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    /// Basenames of the batches, in order.
    pub batches: Vec<String>,
    /// Strategy to combine the batches with.
    pub strategy: ClusterStrategy,
    /// Size of the global pointer space.
    pub documents: u64,
    /// Number of documents read from the source.
    pub scanned_documents: u64,
    pub postings: u64,
    pub occurrences: u64,
    pub max_count: u32,
    pub max_document_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_validation() {
        let config = ScanConfig::default();
        config.validate().unwrap();
        assert_eq!(config.documents_per_batch, 100_000);
        assert_eq!(config.memory_check_interval, 256);

        let config = ScanConfig {
            virtual_gap: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ScanConfig {
            flush_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ScanConfig {
            completeness: Completeness::Payloads,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = ScanConfig {
            payload: Some(PayloadSpec::new("integer")),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = ScanConfig {
            completeness: Completeness::Payloads,
            payload: Some(PayloadSpec::new("integer")),
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_config_from_json() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"documents_per_batch": 10, "completeness": "counts"}"#)
                .unwrap();
        assert_eq!(config.documents_per_batch, 10);
        assert_eq!(config.completeness, Completeness::Counts);
        assert_eq!(config.max_terms, ScanConfig::DEFAULT_MAX_TERMS);
    }

    #[test]
    fn test_iterator_source() {
        let mut source = vec![SourceDocument::text("a b"), SourceDocument::text("c")].into_iter();
        assert_eq!(
            source.next_document().unwrap(),
            Some(SourceDocument::tokens(["a", "b"]))
        );
        assert!(source.next_document().unwrap().is_some());
        assert!(source.next_document().unwrap().is_none());
    }

    #[test]
    fn test_vec_remap() {
        let remap = vec![4u64, 0, 7];
        assert_eq!(remap.pointer(2), Some(7));
        assert_eq!(remap.pointer(3), None);
    }
}
