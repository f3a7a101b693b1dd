use std::io::Read;

use lexis_common::{Result, error::Error, try_or_ret_some_err, verify_data};
use lexis_io::{
    IndexStorage,
    bits::{BitRead, InputBitStream},
};

use crate::{
    components,
    features::{Features, IndexLayout},
    posting::Posting,
    properties::IndexProperties,
};

type BitSource = InputBitStream<Box<dyn Read + Send>>;

/// Upper bound on capacities reserved from counts read off the stream.
pub(crate) const MAX_RESERVED: usize = 1 << 16;

/// Read-once cursor over the posting stream of an index.
///
/// Lists are consumed in term order: [`PostingStreamReader::next_list`] reads the
/// frequency of the next list, after which exactly that many postings must be read
/// before the following list can be started.
pub struct PostingStreamReader {
    name: String,
    features: Features,
    number_of_documents: u64,
    index: BitSource,
    positions: Option<BitSource>,
    remaining: u64,
    last_pointer: Option<u64>,
}

impl PostingStreamReader {
    pub fn open(
        storage: &dyn IndexStorage,
        basename: &str,
        properties: &IndexProperties,
    ) -> Result<PostingStreamReader> {
        let open = |extension: &str| -> Result<BitSource> {
            let name = components::name(basename, extension);
            let reader = storage.open(&name).map_err(|e| Error::io(&name, e))?;
            Ok(InputBitStream::new(reader))
        };
        let index = open(components::INDEX)?;
        let positions = match properties.layout {
            IndexLayout::HighPerformance => Some(open(components::POSITIONS)?),
            IndexLayout::Interleaved => None,
        };
        Ok(PostingStreamReader {
            name: components::name(basename, components::INDEX),
            features: properties.features,
            number_of_documents: properties.documents,
            index,
            positions,
            remaining: 0,
            last_pointer: None,
        })
    }

    pub fn features(&self) -> Features {
        self.features
    }

    /// Postings of the current list that were not read yet.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Starts the next inverted list and returns its frequency.
    pub fn next_list(&mut self) -> Result<u64> {
        if self.remaining != 0 {
            return Err(Error::invalid_operation(format!(
                "next_list with {} unread postings",
                self.remaining
            )));
        }
        let frequency = self.index.read_gamma().map_err(|e| self.io_error(e))? + 1;
        verify_data!(frequency, frequency <= self.number_of_documents);
        self.remaining = frequency;
        self.last_pointer = None;
        Ok(frequency)
    }

    /// Reads the next posting of the current list, or `None` at its end.
    pub fn next_posting(&mut self) -> Option<Result<Posting>> {
        if self.remaining == 0 {
            return None;
        }
        let posting = try_or_ret_some_err!(self.read_posting());
        self.remaining -= 1;
        Some(Ok(posting))
    }

    /// Iterates over the rest of the current list.
    pub fn postings(&mut self) -> Postings<'_> {
        Postings { reader: self }
    }

    fn read_posting(&mut self) -> Result<Posting> {
        let gap = self.index.read_gamma().map_err(|e| self.io_error(e))?;
        let pointer = match self.last_pointer {
            Some(last) => gap.checked_add(1).and_then(|step| last.checked_add(step)),
            None => Some(gap),
        }
        .filter(|&p| p < self.number_of_documents)
        .ok_or_else(|| Error::invalid_format_with(&self.name, "document pointer out of range"))?;
        self.last_pointer = Some(pointer);

        let mut posting = Posting::new(pointer);
        if self.features.payloads {
            let len = self.index.read_gamma().map_err(|e| self.io_error(e))?;
            let payload = self
                .index
                .read_bytes(len as usize)
                .map_err(|e| self.io_error(e))?;
            posting.payload = Some(payload);
        }
        if self.features.counts {
            let count = self.index.read_gamma().map_err(|e| self.io_error(e))? + 1;
            let count = u32::try_from(count)
                .map_err(|_| Error::invalid_format_with(&self.name, "count exceeds u32"))?;
            posting.count = Some(count);
            if self.features.positions {
                posting.positions = self.read_positions(count)?;
            }
        }
        Ok(posting)
    }

    fn read_positions(&mut self, count: u32) -> Result<Vec<u32>> {
        let stream = match self.positions.as_mut() {
            Some(stream) => stream,
            None => &mut self.index,
        };
        let mut positions = Vec::with_capacity((count as usize).min(MAX_RESERVED));
        let mut next = 0u64;
        for _ in 0..count {
            let gap = stream
                .read_delta()
                .map_err(|e| Error::io(&self.name, e))?;
            next += gap;
            let position = u32::try_from(next)
                .map_err(|_| Error::invalid_format_with(&self.name, "position exceeds u32"))?;
            positions.push(position);
            next += 1;
        }
        Ok(positions)
    }

    fn io_error(&self, e: std::io::Error) -> Error {
        Error::io(&self.name, e)
    }
}

/// Iterator over the unread postings of the current list of a
/// [`PostingStreamReader`].
pub struct Postings<'a> {
    reader: &'a mut PostingStreamReader,
}

impl Iterator for Postings<'_> {
    type Item = Result<Posting>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_posting()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.reader.remaining as usize;
        (remaining, Some(remaining))
    }
}
