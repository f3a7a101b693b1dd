use std::{cmp::Reverse, collections::BinaryHeap};

use lexis_common::{Result, error::Error};

use crate::{
    combine::{CombineStrategy, CombineStrategyKind, TermContext},
    posting::Posting,
    properties::IndexProperties,
    tables::{NumberTableReader, NumberTableWriter},
};

/// Pastes inputs that share one document numbering and may each hold a part of
/// the same document.
///
/// Postings for the same pointer are fused: counts are summed and positions are
/// concatenated in input order. In incremental mode the positions of input `j`
/// are first shifted by the document's sizes in inputs `0..j`, and the output
/// size of a document is the sum of its input sizes instead of their maximum.
///
/// The output frequency of a term is only known after fusion, so the inverted
/// list is buffered and postings are read even when only metadata is combined.
pub struct PasteStrategy {
    documents: u64,
    incremental: bool,
    /// Per-input document sizes, kept for incremental position shifts.
    sizes: Vec<Vec<u64>>,
}

impl PasteStrategy {
    pub fn new(inputs: &[IndexProperties], incremental: bool) -> PasteStrategy {
        PasteStrategy {
            documents: inputs.iter().map(|input| input.documents).max().unwrap_or(0),
            incremental,
            sizes: Vec::new(),
        }
    }

    fn shift(&self, input: usize, pointer: u64) -> u64 {
        if !self.incremental {
            return 0;
        }
        self.sizes[..input]
            .iter()
            .filter_map(|sizes| usize::try_from(pointer).ok().and_then(|p| sizes.get(p)))
            .sum()
    }

    fn fuse(&self, into: &mut Posting, from: Posting, input: usize, basename: &str) -> Result<()> {
        let count = match (into.count, from.count) {
            (Some(a), Some(b)) => Some(a.checked_add(b).ok_or_else(|| {
                Error::invalid_format_with(basename, "fused count overflows u32")
            })?),
            _ => None,
        };
        into.count = count;
        let shift = self.shift(input, from.pointer);
        for position in from.positions {
            let position = u32::try_from(position as u64 + shift).map_err(|_| {
                Error::invalid_format_with(basename, "shifted position overflows u32")
            })?;
            if into.positions.last().is_some_and(|&last| last >= position) {
                return Err(Error::invalid_format_with(
                    basename,
                    format!(
                        "positions of document {} are not increasing across inputs",
                        into.pointer
                    ),
                ));
            }
            into.positions.push(position);
        }
        Ok(())
    }
}

impl CombineStrategy for PasteStrategy {
    fn kind(&self) -> CombineStrategyKind {
        CombineStrategyKind::Paste {
            incremental: self.incremental,
        }
    }

    fn number_of_documents(&self) -> u64 {
        self.documents
    }

    fn combine_sizes(
        &mut self,
        inputs: &mut [NumberTableReader],
        output: &mut NumberTableWriter,
    ) -> Result<u64> {
        if self.incremental {
            self.sizes = inputs
                .iter_mut()
                .map(|sizes| (0..sizes.remaining()).map(|_| sizes.next_value()).collect())
                .collect::<Result<_>>()?;
        }
        let mut max = 0;
        for document in 0..self.documents {
            let size = if self.incremental {
                let d = document as usize;
                self.sizes.iter().filter_map(|sizes| sizes.get(d)).sum()
            } else {
                let mut size = 0;
                for sizes in inputs.iter_mut() {
                    if sizes.remaining() != 0 {
                        size = size.max(sizes.next_value()?);
                    }
                }
                size
            };
            max = max.max(size);
            output.push(size)?;
        }
        Ok(max)
    }

    fn combine(&mut self, context: &mut TermContext<'_>) -> Result<u64> {
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

        let mut list: Vec<Posting> = Vec::new();
        while let Some(Reverse((pointer, i))) = queue.pop() {
            if let Some(mut posting) = heads[i].take() {
                let shift = self.shift(i, pointer);
                match list.last_mut() {
                    Some(last) if last.pointer == pointer => {
                        self.fuse(last, posting, i, context.units[i].basename())?;
                    }
                    _ => {
                        if shift != 0 {
                            for position in posting.positions.iter_mut() {
                                *position = u32::try_from(*position as u64 + shift).map_err(
                                    |_| {
                                        Error::invalid_format_with(
                                            context.units[i].basename(),
                                            "shifted position overflows u32",
                                        )
                                    },
                                )?;
                            }
                        }
                        list.push(posting);
                    }
                }
            }
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

    fn needs_postings_for_metadata(&self) -> bool {
        true
    }

    fn supports_payloads(&self) -> bool {
        false
    }
}
