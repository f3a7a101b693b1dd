use lexis_common::{Result, error::Error};

use crate::{
    combine::{CombineStrategy, CombineStrategyKind, TermContext},
    properties::IndexProperties,
    tables::{NumberTableReader, NumberTableWriter},
};

/// Lays inputs with disjoint document universes end to end.
///
/// The pointers of input `i` are offset by the number of documents of inputs
/// `0..i`. Counts, positions and payloads pass through unchanged.
pub struct ConcatenateStrategy {
    offsets: Vec<u64>,
    documents: u64,
}

impl ConcatenateStrategy {
    pub fn new(inputs: &[IndexProperties]) -> ConcatenateStrategy {
        let mut offsets = Vec::with_capacity(inputs.len());
        let mut documents = 0;
        for input in inputs {
            offsets.push(documents);
            documents += input.documents;
        }
        ConcatenateStrategy { offsets, documents }
    }

    /// First output pointer of every input, followed by the output document count.
    pub fn cut_points(&self) -> Vec<u64> {
        let mut cut_points = self.offsets.clone();
        cut_points.push(self.documents);
        cut_points
    }
}

impl CombineStrategy for ConcatenateStrategy {
    fn kind(&self) -> CombineStrategyKind {
        CombineStrategyKind::Concatenate
    }

    fn number_of_documents(&self) -> u64 {
        self.documents
    }

    fn combine_sizes(
        &mut self,
        inputs: &mut [NumberTableReader],
        output: &mut NumberTableWriter,
    ) -> Result<u64> {
        let mut max = 0;
        for input in inputs {
            while input.remaining() != 0 {
                let size = input.next_value()?;
                max = max.max(size);
                output.push(size)?;
            }
        }
        Ok(max)
    }

    fn combine(&mut self, context: &mut TermContext<'_>) -> Result<u64> {
        let frequency = context.table_frequency();
        let Some(writer) = context.writer.as_deref_mut() else {
            return Ok(frequency);
        };

        writer.new_inverted_list()?;
        writer.write_frequency(frequency)?;
        for &i in context.used {
            let offset = self.offsets[i];
            let unit = &mut context.units[i];
            unit.start_postings()?;
            while let Some(posting) = unit.next_posting() {
                let mut posting = posting?;
                posting.pointer = posting.pointer.checked_add(offset).ok_or_else(|| {
                    Error::invalid_format_with(unit.basename(), "document pointer overflow")
                })?;
                writer.write_posting(&posting)?;
            }
        }
        Ok(frequency)
    }
}
