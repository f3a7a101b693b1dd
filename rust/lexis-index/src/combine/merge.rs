use std::{cmp::Reverse, collections::BinaryHeap};

use lexis_common::{Result, error::Error};

use crate::{
    combine::{CombineStrategy, CombineStrategyKind, TermContext},
    posting::Posting,
    properties::IndexProperties,
    tables::{NumberTableReader, NumberTableWriter},
};

/// Merges inputs that share one document numbering and are expected to hold
/// disjoint sets of documents.
///
/// A document pointer defined by two inputs, in a posting list or in the size
/// tables, is a fatal duplicate-document error.
pub struct MergeStrategy {
    documents: u64,
}

impl MergeStrategy {
    pub fn new(inputs: &[IndexProperties]) -> MergeStrategy {
        MergeStrategy {
            documents: inputs.iter().map(|input| input.documents).max().unwrap_or(0),
        }
    }
}

impl CombineStrategy for MergeStrategy {
    fn kind(&self) -> CombineStrategyKind {
        CombineStrategyKind::Merge
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
        for document in 0..self.documents {
            let mut owner: Option<(usize, u64)> = None;
            for (input, sizes) in inputs.iter_mut().enumerate() {
                if sizes.remaining() == 0 {
                    continue;
                }
                let size = sizes.next_value()?;
                if size == 0 {
                    continue;
                }
                if let Some((first, _)) = owner {
                    return Err(Error::duplicate_document(document, first, input));
                }
                owner = Some((input, size));
            }
            let size = owner.map_or(0, |(_, size)| size);
            max = max.max(size);
            output.push(size)?;
        }
        Ok(max)
    }

    fn combine(&mut self, context: &mut TermContext<'_>) -> Result<u64> {
        let frequency = context.table_frequency();
        if context.writer.is_none() {
            return Ok(frequency);
        }

        // Smallest pointer first; input order breaks ties so that the reported
        // pair of inputs is deterministic.
        let mut heads: Vec<Option<Posting>> = vec![None; context.units.len()];
        let mut queue = BinaryHeap::with_capacity(context.used.len());
        for &i in context.used {
            let unit = &mut context.units[i];
            unit.start_postings()?;
            if let Some(posting) = unit.next_posting() {
                let posting = posting?;
                queue.push(Reverse((posting.pointer, i)));
                heads[i] = Some(posting);
            }
        }

        // Duplicates must surface before the frequency reaches the writer.
        let mut list: Vec<Posting> = Vec::with_capacity(frequency.min(1 << 16) as usize);
        let mut last: Option<(u64, usize)> = None;
        while let Some(Reverse((pointer, i))) = queue.pop() {
            if let Some((previous, first)) = last {
                if previous == pointer {
                    return Err(Error::duplicate_document(pointer, first, i));
                }
            }
            if let Some(posting) = heads[i].take() {
                list.push(posting);
            }
            last = Some((pointer, i));
            if let Some(posting) = context.units[i].next_posting() {
                let posting = posting?;
                queue.push(Reverse((posting.pointer, i)));
                heads[i] = Some(posting);
            }
        }

        if let Some(writer) = context.writer.as_deref_mut() {
            writer.write_inverted_list(&list)?;
        }
        Ok(list.len() as u64)
    }
}
