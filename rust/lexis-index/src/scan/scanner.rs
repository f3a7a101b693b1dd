use std::sync::Arc;

use lexis_budget_tracker::Budget;
use lexis_common::{Result, error::Error};
use lexis_io::IndexStorage;

use crate::{
    components,
    properties::{ClusterProperties, ClusterStrategy},
    scan::{
        DocumentContent, DocumentSource, ScanConfig, ScanMode, ScanSummary, SourceDocument,
        VirtualDocumentResolver, VirtualFragment,
        accumulator::{AccumulatorMode, TermAccumulator},
        batch_writer::{BatchSummary, BatchWriter},
        memory_monitor::{MemoryMonitor, MemoryProbe, MemoryVerdict},
    },
    term_processor::TermProcessor,
};

/// Drives a [`TermAccumulator`] over a document stream and flushes it into
/// batches.
pub struct Scanner {
    /// Storage receiving the batches and the cluster properties.
    storage: Arc<dyn IndexStorage>,
    /// Basename of the scan; batch `n` is written as `<basename>@<n>`.
    basename: String,
    /// Applied to every token before it is accumulated.
    processor: Arc<dyn TermProcessor>,
    mode: ScanMode,
    config: ScanConfig,
    accumulator: TermAccumulator,
    monitor: MemoryMonitor,
    /// Batches written so far, in order.
    batches: Vec<BatchSummary>,
    /// Number of documents read from the stream.
    ordinal: u64,
    /// Ordinal of the first document of the current batch.
    batch_start: u64,
    next_term_report: usize,
}

impl Scanner {
    pub fn new(
        storage: Arc<dyn IndexStorage>,
        basename: impl Into<String>,
        processor: Arc<dyn TermProcessor>,
        mode: ScanMode,
        config: ScanConfig,
    ) -> Result<Scanner> {
        config.validate()?;
        let budget = config
            .memory_budget
            .map_or_else(Budget::unlimited, Budget::new);
        let accumulator_mode = match &mode {
            ScanMode::Standard => AccumulatorMode::Standard,
            ScanMode::Remapped(_) => AccumulatorMode::Remapped,
            ScanMode::Virtual(resolver) => AccumulatorMode::Virtual {
                documents: resolver.number_of_documents(),
            },
        };
        let accumulator =
            TermAccumulator::new(accumulator_mode, config.completeness, budget.clone())?;
        let monitor = MemoryMonitor::new(Arc::new(budget), &config);
        Ok(Scanner {
            storage,
            basename: basename.into(),
            processor,
            mode,
            next_term_report: config.term_report_interval,
            config,
            accumulator,
            monitor,
            batches: Vec::new(),
            ordinal: 0,
            batch_start: 0,
        })
    }

    /// Replaces the source of the available-memory fraction, which defaults to
    /// the accumulator's budget.
    pub fn with_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Scanner {
        self.monitor.set_probe(probe);
        self
    }

    /// Memory budget charged by the accumulator.
    pub fn budget(&self) -> &Budget {
        self.accumulator.budget()
    }

    /// Batches written so far.
    pub fn batches(&self) -> &[BatchSummary] {
        &self.batches
    }

    /// Number of documents read so far.
    pub fn documents(&self) -> u64 {
        self.ordinal
    }

    /// Indexes every document of `source`. Returns the number of documents read.
    pub fn run(&mut self, source: &mut dyn DocumentSource) -> Result<u64> {
        let start = self.ordinal;
        while let Some(document) = source.next_document()? {
            self.index_document(document)?;
        }
        Ok(self.ordinal - start)
    }

    pub fn index_document(&mut self, document: SourceDocument) -> Result<()> {
        let mode = self.mode.clone();
        match (&mode, document.content) {
            (ScanMode::Virtual(resolver), DocumentContent::Fragments(fragments)) => {
                self.index_fragments(resolver.as_ref(), fragments)?;
            }
            (ScanMode::Virtual(_), _) => {
                return Err(Error::invalid_arg(
                    "document",
                    "virtual scans expect fragmented documents",
                ));
            }
            (_, DocumentContent::Fragments(_)) => {
                return Err(Error::invalid_arg(
                    "document",
                    "fragmented documents require a virtual scan",
                ));
            }
            (_, DocumentContent::Tokens(tokens)) => {
                if self.accumulator.features().payloads {
                    return Err(Error::invalid_arg(
                        "document",
                        "payload scans expect payload documents",
                    ));
                }
                let pointer = self.assign_pointer(&mode, document.pointer)?;
                self.index_tokens(pointer, &tokens)?;
            }
            (_, DocumentContent::Payload(payload)) => {
                if !self.accumulator.features().payloads {
                    return Err(Error::invalid_arg(
                        "document",
                        "payload documents require a payload scan",
                    ));
                }
                let pointer = self.assign_pointer(&mode, document.pointer)?;
                self.accumulator.add_payload(pointer, &payload)?;
                self.accumulator.record_document_size(pointer, 0)?;
                self.accumulator.end_document()?;
            }
        }
        self.document_done()
    }

    /// Returns the accumulator pointer of the next stream document.
    fn assign_pointer(&self, mode: &ScanMode, hint: Option<u64>) -> Result<u64> {
        let (global, local) = match mode {
            ScanMode::Standard => (self.ordinal, self.ordinal - self.batch_start),
            ScanMode::Remapped(remap) => {
                let pointer = remap.pointer(self.ordinal).ok_or_else(|| {
                    Error::invalid_arg(
                        "remap",
                        format!("document {} is not covered by the map", self.ordinal),
                    )
                })?;
                (pointer, pointer)
            }
            ScanMode::Virtual(_) => {
                return Err(Error::invalid_operation("assign_pointer in virtual mode"));
            }
        };
        if let Some(hint) = hint {
            if hint != global {
                return Err(Error::invalid_arg(
                    "pointer",
                    format!("document {} was expected to be {hint}, got {global}", self.ordinal),
                ));
            }
        }
        Ok(local)
    }

    fn index_tokens(&mut self, pointer: u64, tokens: &[String]) -> Result<()> {
        let size = u32::try_from(tokens.len())
            .map_err(|_| Error::invalid_arg("document", "too many tokens"))?;
        for (position, token) in tokens.iter().enumerate() {
            if let Some(term) = self.processor.process(token) {
                self.accumulator
                    .add_occurrence(&term, pointer, position as u32)?;
            }
        }
        self.accumulator.record_document_size(pointer, size)?;
        self.accumulator.end_document()
    }

    fn index_fragments(
        &mut self,
        resolver: &dyn VirtualDocumentResolver,
        fragments: Vec<VirtualFragment>,
    ) -> Result<()> {
        for fragment in fragments {
            let Some(pointer) = resolver.resolve(&fragment.specifier) else {
                log::debug!("skipping unresolved fragment '{}'", fragment.specifier);
                continue;
            };
            let base = self.accumulator.virtual_size(pointer)?;
            let len = u32::try_from(fragment.tokens.len())
                .ok()
                .filter(|&len| base.checked_add(len).is_some())
                .ok_or_else(|| Error::invalid_arg("fragment", "virtual document is too long"))?;
            for (offset, token) in fragment.tokens.iter().enumerate() {
                if let Some(term) = self.processor.process(token) {
                    self.accumulator
                        .add_occurrence(&term, pointer, base + offset as u32)?;
                }
            }
            let grown = len.saturating_add(self.config.virtual_gap);
            self.accumulator.extend_virtual_size(pointer, grown)?;
        }
        self.accumulator.end_document()
    }

    /// Applies the batch budgets after a document.
    fn document_done(&mut self) -> Result<()> {
        self.ordinal += 1;

        let terms = self.accumulator.term_count();
        if terms >= self.next_term_report {
            log::info!("{terms} terms accumulated in batch {}", self.batches.len());
            self.next_term_report += self.config.term_report_interval;
        }

        let flush = if self.accumulator.documents() >= self.config.documents_per_batch as u64 {
            true
        } else if terms > self.config.max_terms {
            log::debug!("{terms} terms exceed the batch limit");
            true
        } else if self.accumulator.is_degraded() {
            log::info!(
                "memory budget overcommitted ({:?}), flushing",
                self.accumulator.budget()
            );
            true
        } else if self.monitor.document_done() {
            let accumulator = &mut self.accumulator;
            self.monitor.check(|| accumulator.compact()) == MemoryVerdict::Flush
        } else {
            false
        };

        if flush {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let basename = components::batch_basename(&self.basename, self.batches.len());
        let batch = self.accumulator.freeze()?;
        let writer = BatchWriter::new(
            self.storage.as_ref(),
            self.processor.descriptor(),
            self.config.field.clone(),
        )
        .with_payload(self.config.payload.clone());
        let summary = writer.write(&basename, batch)?;
        self.batches.push(summary);
        self.batch_start = self.ordinal;
        self.next_term_report = self.config.term_report_interval;
        Ok(())
    }

    /// Flushes the last batch (an empty one if nothing was ever flushed) and
    /// writes the cluster properties of the batch set.
    pub fn close(mut self) -> Result<ScanSummary> {
        if self.accumulator.documents() > 0 || self.batches.is_empty() {
            self.flush()?;
        }

        let documents = match &self.mode {
            ScanMode::Standard => self.ordinal,
            ScanMode::Remapped(_) => self.batches.iter().map(|b| b.documents).max().unwrap_or(0),
            ScanMode::Virtual(resolver) => resolver.number_of_documents(),
        };
        let strategy = match self.mode.cluster_strategy() {
            ClusterStrategy::Concatenate { .. } => {
                let mut cut_points = Vec::with_capacity(self.batches.len() + 1);
                let mut next = 0;
                cut_points.push(next);
                for batch in &self.batches {
                    next += batch.documents;
                    cut_points.push(next);
                }
                ClusterStrategy::Concatenate { cut_points }
            }
            strategy => strategy,
        };

        let summary = ScanSummary {
            batches: self.batches.iter().map(|b| b.basename.clone()).collect(),
            strategy,
            documents,
            scanned_documents: self.ordinal,
            postings: self.batches.iter().map(|b| b.postings).sum(),
            occurrences: self.batches.iter().map(|b| b.occurrences).sum(),
            max_count: self.batches.iter().map(|b| b.max_count).max().unwrap_or(0),
            max_document_size: self
                .batches
                .iter()
                .map(|b| b.max_document_size)
                .max()
                .unwrap_or(0),
        };

        ClusterProperties {
            local_indices: summary.batches.clone(),
            strategy: summary.strategy.clone(),
            documents,
            terms: None,
            postings: summary.postings,
            occurrences: self.config.payload.is_none().then_some(summary.occurrences),
            max_count: summary.max_count,
            max_document_size: summary.max_document_size,
            features: self.accumulator.features(),
            payload: self.config.payload.clone(),
            term_processor: self.processor.descriptor(),
            field: self.config.field.clone(),
        }
        .store(self.storage.as_ref(), &self.basename)?;

        log::info!(
            "scan of {} complete: {} documents in {} batches, {} occurrences",
            self.basename,
            summary.scanned_documents,
            summary.batches.len(),
            summary.occurrences
        );
        Ok(summary)
    }
}

/// Deletes every component of the given batches and the cluster properties of
/// `basename`. Returns the number of deleted streams.
pub fn cleanup_batches(
    storage: &dyn IndexStorage,
    basename: &str,
    batches: &[String],
) -> Result<usize> {
    let mut deleted = 0;
    let names = batches
        .iter()
        .flat_map(|batch| {
            components::BATCH_COMPONENTS
                .iter()
                .map(move |extension| components::name(batch, extension))
        })
        .chain(std::iter::once(components::name(
            basename,
            components::CLUSTER_PROPERTIES,
        )));
    for name in names {
        if storage.delete(&name).map_err(|e| Error::io(&name, e))? {
            deleted += 1;
        }
    }
    log::debug!("deleted {deleted} batch streams of {basename}");
    Ok(deleted)
}
