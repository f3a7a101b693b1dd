use ahash::AHashMap;
use lexis_budget_tracker::{Allocation, Budget};
use lexis_common::{Result, error::Error};

use crate::{
    features::{Completeness, Features},
    posting::Posting,
    scan::posting_buffer::{PointerCoding, PostingBuffer},
};

/// Bytes charged per distinct term on top of its text (map entry, buffer header).
const TERM_OVERHEAD: u64 = 96;

/// Bytes per entry of a dense document-size table.
const SIZE_BYTES: u64 = 4;

/// The single term of a payload index.
pub const PAYLOAD_TERM: &str = "#";

/// How the accumulator assigns document sizes and interprets pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorMode {
    /// Pointers are batch-local ordinals; sizes are implicit, in order.
    Standard,
    /// Pointers come in any order; sizes are `(pointer, size)` pairs.
    Remapped,
    /// Pointers are shared by fragments; sizes accumulate across fragments and
    /// batches.
    Virtual { documents: u64 },
}

enum DocumentSizes {
    Sequential(Vec<u32>),
    Pairs(Vec<(u64, u32)>),
    Cumulative(Vec<u32>),
}

/// Maps terms to growing posting buffers while a document stream is consumed.
///
/// All memory held by the posting buffers and the term map is charged to a
/// [`Budget`]. When the budget runs dry, buffers keep growing by exactly what they
/// need and the accumulator reports itself as degraded, asking for a flush.
pub struct TermAccumulator {
    mode: AccumulatorMode,
    features: Features,
    coding: PointerCoding,
    budget: Budget,
    term_ids: AHashMap<String, usize>,
    entries: Vec<(String, PostingBuffer)>,
    term_allocation: Allocation,
    /// Terms with an open posting in the current document.
    touched: Vec<usize>,
    degraded: bool,
    documents: u64,
    occurrences: u64,
    sizes: DocumentSizes,
}

impl TermAccumulator {
    pub fn new(
        mode: AccumulatorMode,
        completeness: Completeness,
        budget: Budget,
    ) -> Result<TermAccumulator> {
        if completeness == Completeness::Payloads
            && matches!(mode, AccumulatorMode::Virtual { .. })
        {
            return Err(Error::invalid_arg(
                "completeness",
                "payloads cannot be accumulated for virtual documents",
            ));
        }
        let (coding, sizes) = match mode {
            AccumulatorMode::Standard => (
                PointerCoding::Gaps,
                DocumentSizes::Sequential(Vec::new()),
            ),
            AccumulatorMode::Remapped => {
                (PointerCoding::Absolute, DocumentSizes::Pairs(Vec::new()))
            }
            AccumulatorMode::Virtual { documents } => {
                let documents = usize::try_from(documents).map_err(|_| {
                    Error::invalid_arg("documents", "virtual pointer space is too large")
                })?;
                (
                    PointerCoding::Absolute,
                    DocumentSizes::Cumulative(vec![0; documents]),
                )
            }
        };
        Ok(TermAccumulator {
            mode,
            features: completeness.features(),
            coding,
            term_allocation: budget.empty_allocation(),
            budget,
            term_ids: AHashMap::new(),
            entries: Vec::new(),
            touched: Vec::new(),
            degraded: false,
            documents: 0,
            occurrences: 0,
            sizes,
        })
    }

    pub fn mode(&self) -> AccumulatorMode {
        self.mode
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Number of distinct terms accumulated since the last flush.
    pub fn term_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of documents completed since the last flush.
    pub fn documents(&self) -> u64 {
        self.documents
    }

    pub fn occurrences(&self) -> u64 {
        self.occurrences
    }

    /// Returns `true` if an allocation failed since the last flush.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Records an occurrence of `term` at `position` of document `pointer`.
    pub fn add_occurrence(&mut self, term: &str, pointer: u64, position: u32) -> Result<()> {
        if self.features.payloads {
            return Err(Error::invalid_operation("term occurrence in a payload index"));
        }
        if pointer == u64::MAX {
            return Err(Error::invalid_arg(
                "pointer",
                "document pointer u64::MAX is out of range",
            ));
        }
        let id = match self.term_ids.get(term) {
            Some(&id) => id,
            None => self.insert_term(term),
        };
        let buffer = &mut self.entries[id].1;
        let opened = !buffer.is_open();
        if buffer.record(pointer, position, self.features, self.coding)? {
            self.degraded = true;
        }
        if opened {
            self.touched.push(id);
        }
        self.occurrences += 1;
        Ok(())
    }

    /// Records the payload of document `pointer` under [`PAYLOAD_TERM`].
    pub fn add_payload(&mut self, pointer: u64, payload: &[u8]) -> Result<()> {
        if !self.features.payloads {
            return Err(Error::invalid_operation("payload in an index without payloads"));
        }
        if pointer == u64::MAX {
            return Err(Error::invalid_arg(
                "pointer",
                "document pointer u64::MAX is out of range",
            ));
        }
        let id = match self.term_ids.get(PAYLOAD_TERM) {
            Some(&id) => id,
            None => self.insert_term(PAYLOAD_TERM),
        };
        let buffer = &mut self.entries[id].1;
        let opened = !buffer.is_open();
        if buffer.record_payload(pointer, payload, self.features, self.coding)? {
            self.degraded = true;
        }
        if opened {
            self.touched.push(id);
        }
        Ok(())
    }

    fn insert_term(&mut self, term: &str) -> usize {
        let charge = 2 * term.len() as u64 + TERM_OVERHEAD;
        if self.term_allocation.grow(charge).is_err() {
            self.term_allocation.grow_overcommit(charge);
            if !self.degraded {
                log::debug!("term map overcommits the memory budget ({:?})", self.budget);
            }
            self.degraded = true;
        }
        let id = self.entries.len();
        let buffer = PostingBuffer::new(&self.budget);
        self.degraded |= buffer.is_degraded();
        self.entries.push((term.to_string(), buffer));
        self.term_ids.insert(term.to_string(), id);
        id
    }

    /// Closes the postings of the current document.
    pub fn end_document(&mut self) -> Result<()> {
        for id in self.touched.drain(..) {
            if self.entries[id].1.close_posting(self.features, self.coding)? {
                self.degraded = true;
            }
        }
        self.documents += 1;
        Ok(())
    }

    /// Records the size of a document in standard or remapped mode. In standard
    /// mode, `pointer` must be the next batch-local ordinal.
    pub fn record_document_size(&mut self, pointer: u64, size: u32) -> Result<()> {
        match &mut self.sizes {
            DocumentSizes::Sequential(sizes) => {
                if pointer != sizes.len() as u64 {
                    return Err(Error::invalid_arg(
                        "pointer",
                        format!("expected document {}, got {pointer}", sizes.len()),
                    ));
                }
                sizes.push(size);
            }
            DocumentSizes::Pairs(pairs) => {
                let table_bytes = pointer
                    .checked_add(1)
                    .and_then(|documents| documents.checked_mul(SIZE_BYTES))
                    .filter(|&bytes| bytes <= self.budget.capacity());
                if table_bytes.is_none() {
                    return Err(Error::invalid_arg(
                        "pointer",
                        format!("remapped pointer {pointer} exceeds the memory budget"),
                    ));
                }
                pairs.push((pointer, size));
            }
            DocumentSizes::Cumulative(_) => {
                return Err(Error::invalid_operation(
                    "record_document_size in virtual mode",
                ));
            }
        }
        Ok(())
    }

    /// Current accumulated size of a virtual document, where its next fragment
    /// starts.
    pub fn virtual_size(&self, pointer: u64) -> Result<u32> {
        match &self.sizes {
            DocumentSizes::Cumulative(sizes) => usize::try_from(pointer)
                .ok()
                .and_then(|index| sizes.get(index).copied())
                .ok_or_else(|| {
                    Error::invalid_arg("pointer", format!("virtual pointer {pointer} out of range"))
                }),
            _ => Err(Error::invalid_operation("virtual_size outside virtual mode")),
        }
    }

    /// Grows the accumulated size of a virtual document by `by` positions.
    pub fn extend_virtual_size(&mut self, pointer: u64, by: u32) -> Result<()> {
        let current = self.virtual_size(pointer)?;
        let size = current
            .checked_add(by)
            .ok_or_else(|| Error::invalid_arg("size", "virtual document size exceeds u32"))?;
        if let DocumentSizes::Cumulative(sizes) = &mut self.sizes {
            sizes[pointer as usize] = size;
        }
        Ok(())
    }

    /// Trims every posting buffer to its length and shrinks the term map,
    /// releasing the slack back to the budget.
    pub fn compact(&mut self) {
        let before = self.budget.used();
        for (_, buffer) in &mut self.entries {
            buffer.compact();
        }
        self.entries.shrink_to_fit();
        self.term_ids.shrink_to_fit();
        self.touched.shrink_to_fit();
        log::debug!(
            "compacted {} posting buffers: {} -> {} bytes",
            self.entries.len(),
            before,
            self.budget.used()
        );
    }

    /// Moves the accumulated postings into a sorted, immutable batch and resets
    /// the accumulator. Accumulated virtual sizes are kept.
    pub fn freeze(&mut self) -> Result<FrozenBatch> {
        if !self.touched.is_empty() {
            return Err(Error::invalid_operation("freeze with an open document"));
        }

        let (sizes, documents) = match &mut self.sizes {
            DocumentSizes::Sequential(sizes) => {
                let sizes = std::mem::take(sizes);
                let documents = sizes.len() as u64;
                (sizes, documents)
            }
            DocumentSizes::Pairs(pairs) => {
                let mut pairs = std::mem::take(pairs);
                pairs.sort_unstable_by_key(|&(pointer, _)| pointer);
                if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
                    return Err(Error::invalid_arg(
                        "remap",
                        format!("document pointer {} is assigned twice", w[0].0),
                    ));
                }
                let documents = match pairs.last() {
                    Some(&(pointer, _)) => pointer.checked_add(1).ok_or_else(|| {
                        Error::invalid_arg("remap", "pointer space is too large")
                    })?,
                    None => 0,
                };
                let len = usize::try_from(documents)
                    .map_err(|_| Error::invalid_arg("remap", "pointer space is too large"))?;
                let mut sizes = vec![0; len];
                for (pointer, size) in pairs {
                    sizes[pointer as usize] = size;
                }
                (sizes, documents)
            }
            DocumentSizes::Cumulative(sizes) => (sizes.clone(), sizes.len() as u64),
        };

        let mut sizes_allocation = self.budget.empty_allocation();
        if sizes_allocation
            .grow(sizes.len() as u64 * SIZE_BYTES)
            .is_err()
        {
            sizes_allocation.grow_overcommit(sizes.len() as u64 * SIZE_BYTES);
        }

        let mut terms = std::mem::take(&mut self.entries);
        terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        self.term_ids = AHashMap::new();
        self.term_allocation.shrink_to(0);

        let batch = FrozenBatch {
            mode: self.mode,
            features: self.features,
            coding: self.coding,
            terms,
            sizes,
            _sizes_allocation: sizes_allocation,
            documents,
            scanned_documents: self.documents,
            occurrences: self.occurrences,
        };
        self.degraded = false;
        self.documents = 0;
        self.occurrences = 0;
        Ok(batch)
    }
}

/// The sorted content of an accumulator at flush time.
pub struct FrozenBatch {
    pub mode: AccumulatorMode,
    pub features: Features,
    coding: PointerCoding,
    terms: Vec<(String, PostingBuffer)>,
    /// Document sizes, indexed by pointer.
    pub sizes: Vec<u32>,
    _sizes_allocation: Allocation,
    /// Size of the batch's pointer space.
    pub documents: u64,
    /// Number of stream documents that went into the batch.
    pub scanned_documents: u64,
    pub occurrences: u64,
}

impl FrozenBatch {
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn max_document_size(&self) -> u32 {
        self.sizes.iter().copied().max().unwrap_or(0)
    }

    pub fn max_count(&self) -> u32 {
        self.terms
            .iter()
            .map(|(_, buffer)| buffer.max_count())
            .max()
            .unwrap_or(0)
    }

    /// Iterates over the terms in sorted order with their finalized postings
    /// (sorted by pointer, with postings of the same virtual document fused) and
    /// their number of occurrences.
    pub fn inverted_lists(
        &self,
    ) -> impl Iterator<Item = Result<(&str, Vec<Posting>, u64)>> + '_ {
        self.terms.iter().map(|(term, buffer)| {
            let postings = buffer.decode(self.features, self.coding)?;
            let postings = match self.coding {
                PointerCoding::Gaps => postings,
                PointerCoding::Absolute => self.finalize(postings)?,
            };
            Ok((term.as_str(), postings, buffer.occurrences()))
        })
    }

    fn finalize(&self, mut postings: Vec<Posting>) -> Result<Vec<Posting>> {
        postings.sort_by_key(|posting| posting.pointer);
        let mut fused: Vec<Posting> = Vec::with_capacity(postings.len());
        for posting in postings {
            match fused.last_mut() {
                Some(last) if last.pointer == posting.pointer => {
                    if !matches!(self.mode, AccumulatorMode::Virtual { .. }) {
                        return Err(Error::invalid_arg(
                            "remap",
                            format!("document pointer {} is assigned twice", posting.pointer),
                        ));
                    }
                    last.count = match (last.count, posting.count) {
                        (Some(a), Some(b)) => Some(a.checked_add(b).ok_or_else(|| {
                            Error::invalid_arg("count", "too many occurrences in a document")
                        })?),
                        _ => None,
                    };
                    last.positions.extend(posting.positions);
                }
                _ => fused.push(posting),
            }
        }
        Ok(fused)
    }
}
