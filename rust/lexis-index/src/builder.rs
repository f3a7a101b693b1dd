//! One-call index construction: scan a document stream into batches, combine
//! the batches with the strategy matching the scan mode, and clean up.

use std::sync::Arc;

use lexis_common::Result;
use lexis_io::IndexStorage;
use serde::{Deserialize, Serialize};

use crate::{
    combine::{CombineConfig, CombineSummary, Combiner},
    scan::{
        DocumentSource, MemoryProbe, ScanConfig, ScanMode, ScanSummary, Scanner, cleanup_batches,
    },
    term_processor::TermProcessor,
};

/// Configuration of an [`IndexBuilder`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexBuilderConfig {
    pub scan: ScanConfig,
    pub combine: CombineConfig,
    /// Keep the batches and the cluster properties once the index is combined.
    pub keep_batches: bool,
}

impl IndexBuilderConfig {
    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        self.combine.validate()
    }
}

/// Outcome of [`IndexBuilder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSummary {
    pub scan: ScanSummary,
    pub combine: CombineSummary,
}

/// Builds an index from a document stream.
///
/// Standard scans are combined by concatenation, remapped scans by merging and
/// virtual scans by pasting, unless the combine configuration overrides the
/// strategy.
pub struct IndexBuilder {
    storage: Arc<dyn IndexStorage>,
    processor: Arc<dyn TermProcessor>,
    config: IndexBuilderConfig,
    probe: Option<Arc<dyn MemoryProbe>>,
}

impl IndexBuilder {
    pub fn new(
        storage: Arc<dyn IndexStorage>,
        processor: Arc<dyn TermProcessor>,
        config: IndexBuilderConfig,
    ) -> Result<IndexBuilder> {
        config.validate()?;
        Ok(IndexBuilder {
            storage,
            processor,
            config,
            probe: None,
        })
    }

    /// Overrides the memory probe consulted by the scan.
    pub fn with_probe(mut self, probe: Arc<dyn MemoryProbe>) -> IndexBuilder {
        self.probe = Some(probe);
        self
    }

    pub fn config(&self) -> &IndexBuilderConfig {
        &self.config
    }

    /// Indexes `source` and writes the combined index under `basename`.
    /// Batches are written as `<basename>@<n>`.
    pub fn build(
        &self,
        basename: &str,
        mode: ScanMode,
        source: &mut dyn DocumentSource,
    ) -> Result<BuildSummary> {
        let mut scanner = Scanner::new(
            Arc::clone(&self.storage),
            basename,
            Arc::clone(&self.processor),
            mode,
            self.config.scan.clone(),
        )?;
        if let Some(probe) = &self.probe {
            scanner = scanner.with_probe(Arc::clone(probe));
        }
        scanner.run(source)?;
        let scan = scanner.close()?;

        let combine = Combiner::from_cluster(
            Arc::clone(&self.storage),
            basename,
            basename,
            self.config.combine.clone(),
        )?
        .run()?;

        if !self.config.keep_batches {
            let deleted = cleanup_batches(self.storage.as_ref(), basename, &scan.batches)?;
            log::debug!("{basename}: deleted {deleted} batch streams");
        }
        Ok(BuildSummary { scan, combine })
    }
}
