//! Output index writers.
//!
//! An [`IndexWriter`] persists inverted lists through an ordered call contract:
//!
//! ```text
//! open
//! ( new_inverted_list write_frequency(n)
//!   ( new_document_record write_document_pointer
//!     [write_payload] [write_position_count [write_document_positions]] ){n} )*
//! close
//! ```
//!
//! Which optional calls are required is fixed by the writer's [`Features`]. Calls
//! out of order are reported as invalid-operation errors; the writer is unusable
//! afterwards. `close` consumes the writer, so it happens exactly once.

use lexis_common::{Result, error::Error};

use crate::{features::Features, posting::Posting};

mod bitstream;

pub use bitstream::BitStreamIndexWriter;

/// Figures collected by a writer over its whole lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStatistics {
    pub terms: u64,
    pub postings: u64,
    pub occurrences: u64,
    pub max_count: u32,
    /// Bits written to the posting stream.
    pub index_bits: u64,
    /// Bits spent on positions, wherever they were written.
    pub position_bits: u64,
    /// Bits written to the offset table.
    pub offset_bits: u64,
}

/// Consumer of an ordered sequence of inverted lists.
pub trait IndexWriter {
    /// Components this writer expects for every posting.
    fn features(&self) -> Features;

    /// Starts a new inverted list. The previous list, if any, must be complete.
    fn new_inverted_list(&mut self) -> Result<()>;

    /// Declares the number of postings of the current list. Must be positive.
    fn write_frequency(&mut self, frequency: u64) -> Result<()>;

    /// Starts a new posting of the current list.
    fn new_document_record(&mut self) -> Result<()>;

    /// Writes the document pointer of the current posting. Pointers must be
    /// strictly increasing within a list.
    fn write_document_pointer(&mut self, pointer: u64) -> Result<()>;

    fn write_payload(&mut self, payload: &[u8]) -> Result<()>;

    /// Writes the count of the current posting. Must be positive.
    fn write_position_count(&mut self, count: u32) -> Result<()>;

    /// Writes the positions of the current posting; their number must match the
    /// count just written.
    fn write_document_positions(&mut self, positions: &[u32]) -> Result<()>;

    /// Completes the index and returns its statistics.
    fn close(self: Box<Self>) -> Result<WriterStatistics>;

    /// Writes a complete posting, emitting the components required by
    /// [`IndexWriter::features`].
    fn write_posting(&mut self, posting: &Posting) -> Result<()> {
        let features = self.features();
        self.new_document_record()?;
        self.write_document_pointer(posting.pointer)?;
        if features.payloads {
            let payload = posting
                .payload
                .as_deref()
                .ok_or_else(|| Error::invalid_arg("posting", "missing payload"))?;
            self.write_payload(payload)?;
        }
        if features.counts {
            let count = posting
                .count
                .ok_or_else(|| Error::invalid_arg("posting", "missing count"))?;
            self.write_position_count(count)?;
        }
        if features.positions {
            self.write_document_positions(&posting.positions)?;
        }
        Ok(())
    }

    /// Writes a complete inverted list.
    fn write_inverted_list(&mut self, postings: &[Posting]) -> Result<()> {
        self.new_inverted_list()?;
        self.write_frequency(postings.len() as u64)?;
        for posting in postings {
            self.write_posting(posting)?;
        }
        Ok(())
    }
}
