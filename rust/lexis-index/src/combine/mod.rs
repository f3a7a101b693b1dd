//! K-way combination of sorted indices.
//!
//! A [`Combiner`] scans the term lists of N inputs in lockstep through a priority
//! queue. For every distinct term it collects the inputs that contain it and hands
//! them to a [`CombineStrategy`], which emits exactly one inverted list into the
//! output writer. The strategy also decides the size of the output pointer space
//! and how the per-document size tables are combined:
//!
//! | Strategy | Inputs | Pointers | Documents | Sizes |
//! |---|---|---|---|---|
//! | concatenate | disjoint universes | offset by preceding inputs | sum | concatenated |
//! | merge | shared numbering, disjoint documents | unchanged, duplicates fail | max | at most one non-zero |
//! | paste | shared numbering, split documents | unchanged, fused per document | max | max, or sum when incremental |

use lexis_common::Result;
use serde::{Deserialize, Serialize};

use crate::{
    features::{Features, IndexLayout},
    properties::{ClusterStrategy, IndexProperties},
    tables::{NumberTableReader, NumberTableWriter},
    writer::IndexWriter,
};

mod concatenate;
mod engine;
mod merge;
mod paste;
mod unit;

pub use concatenate::ConcatenateStrategy;
pub use engine::{CombineSummary, Combiner};
pub use merge::MergeStrategy;
pub use paste::PasteStrategy;
pub use unit::{CombinationUnit, UnitStreams};

/// Selects the combination strategy of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineStrategyKind {
    Concatenate,
    Merge,
    Paste {
        /// Shift the positions of each input past the documents' sizes in the
        /// preceding inputs, and sum the sizes.
        #[serde(default)]
        incremental: bool,
    },
}

impl CombineStrategyKind {
    /// Strategy recorded in the cluster properties of a batch set.
    pub fn from_cluster(strategy: &ClusterStrategy) -> CombineStrategyKind {
        match strategy {
            ClusterStrategy::Concatenate { .. } => CombineStrategyKind::Concatenate,
            ClusterStrategy::Merge => CombineStrategyKind::Merge,
            ClusterStrategy::Paste => CombineStrategyKind::Paste { incremental: false },
        }
    }
}

impl std::fmt::Display for CombineStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombineStrategyKind::Concatenate => f.write_str("concatenate"),
            CombineStrategyKind::Merge => f.write_str("merge"),
            CombineStrategyKind::Paste { incremental: false } => f.write_str("paste"),
            CombineStrategyKind::Paste { incremental: true } => f.write_str("incremental paste"),
        }
    }
}

/// Configuration of a combine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Output features. `None` selects every feature shared by all inputs.
    pub features: Option<Features>,
    /// Requested output layout. Payloads force [`IndexLayout::Interleaved`].
    pub layout: IndexLayout,
    /// Write only the term list, the side tables and the properties.
    pub metadata_only: bool,
    /// Number of terms between two progress reports.
    pub log_interval: u64,
    /// Overrides the strategy recorded in cluster properties.
    pub strategy: Option<CombineStrategyKind>,
}

impl CombineConfig {
    pub const DEFAULT_LOG_INTERVAL: u64 = 100_000;

    pub fn validate(&self) -> Result<()> {
        if let Some(features) = self.features {
            features.validate()?;
        }
        lexis_common::verify_arg!(log_interval, self.log_interval > 0);
        Ok(())
    }
}

impl Default for CombineConfig {
    fn default() -> Self {
        CombineConfig {
            features: None,
            layout: IndexLayout::Interleaved,
            metadata_only: false,
            log_interval: Self::DEFAULT_LOG_INTERVAL,
            strategy: None,
        }
    }
}

/// What a strategy gets to combine one term.
pub struct TermContext<'a> {
    /// All inputs of the run, indexed by input position.
    pub units: &'a mut [CombinationUnit],
    /// Inputs whose current term is the term being combined, in input order.
    pub used: &'a [usize],
    /// Sum of the term's occurrences over `used`, if known.
    pub occurrence: Option<u64>,
    /// Output writer, absent when only metadata is combined.
    pub writer: Option<&'a mut dyn IndexWriter>,
}

impl TermContext<'_> {
    /// Sum of the table frequencies over the used inputs.
    pub fn table_frequency(&self) -> u64 {
        self.used.iter().map(|&i| self.units[i].frequency()).sum()
    }
}

/// Per-term and per-document combination logic of a combine run.
pub trait CombineStrategy {
    fn kind(&self) -> CombineStrategyKind;

    /// Size of the output pointer space.
    fn number_of_documents(&self) -> u64;

    /// Combines the input size tables (one reader per input, each holding that
    /// input's document count) into `output`, which receives
    /// [`CombineStrategy::number_of_documents`] values. Returns the maximum size.
    fn combine_sizes(
        &mut self,
        inputs: &mut [NumberTableReader],
        output: &mut NumberTableWriter,
    ) -> Result<u64>;

    /// Emits the combined inverted list of the current term and returns its
    /// frequency. Without a writer, only the frequency is computed.
    fn combine(&mut self, context: &mut TermContext<'_>) -> Result<u64>;

    /// Whether the frequency of a term can only be known by reading postings.
    fn needs_postings_for_metadata(&self) -> bool {
        false
    }

    fn supports_payloads(&self) -> bool {
        true
    }
}

/// Creates the strategy `kind` for inputs with the given properties.
pub fn create_strategy(
    kind: CombineStrategyKind,
    inputs: &[IndexProperties],
) -> Box<dyn CombineStrategy> {
    match kind {
        CombineStrategyKind::Concatenate => Box::new(ConcatenateStrategy::new(inputs)),
        CombineStrategyKind::Merge => Box::new(MergeStrategy::new(inputs)),
        CombineStrategyKind::Paste { incremental } => {
            Box::new(PasteStrategy::new(inputs, incremental))
        }
    }
}
