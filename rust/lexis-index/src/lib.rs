//! Offline inverted-index construction.
//!
//! The crate turns a stream of tokenized documents into an inverted index in two
//! phases:
//!
//! 1. **Scan** ([`scan`]): a memory-bounded [`scan::TermAccumulator`] collects
//!    postings for each term and is flushed into immutable, self-contained
//!    *batches* whenever a document, term or memory budget runs out.
//! 2. **Combine** ([`combine`]): a k-way merge over the sorted term lists of N
//!    batches (or previously built indices) produces a single index, delegating
//!    the combination of each term's postings to a [`combine::CombineStrategy`]
//!    (concatenate, merge or paste).
//!
//! [`builder::IndexBuilder`] chains both phases. All components write and read
//! through an explicitly passed [`lexis_io::IndexStorage`]; there is no global
//! state.
//!
//! # On-disk layout
//!
//! An index (or batch) with basename `B` consists of the streams named in
//! [`components`]: a sorted UTF-8 term list, gamma-coded frequency, occurrence and
//! size tables, the posting stream written by [`writer::BitStreamIndexWriter`], and
//! a JSON [`properties::IndexProperties`] record.

pub mod builder;
pub mod combine;
pub mod components;
pub mod features;
pub mod posting;
pub mod properties;
pub mod read;
pub mod scan;
pub mod tables;
pub mod term_processor;
pub mod writer;

pub use builder::{BuildSummary, IndexBuilder, IndexBuilderConfig};
pub use combine::{CombineConfig, CombineStrategyKind, CombineSummary, Combiner};
pub use features::{Completeness, Features, IndexLayout, PayloadSpec};
pub use posting::Posting;
pub use properties::{ClusterProperties, ClusterStrategy, IndexProperties};
pub use scan::{
    DocumentContent, DocumentSource, ScanConfig, ScanMode, ScanSummary, Scanner, SourceDocument,
    VirtualDocumentResolver, VirtualFragment,
};
pub use term_processor::TermProcessor;
