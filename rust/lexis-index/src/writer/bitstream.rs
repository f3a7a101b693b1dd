use lexis_common::{Result, error::Error, verify_arg};
use lexis_io::{
    IndexStorage, SealingWrite,
    bits::{BitWrite, OutputBitStream},
};

use crate::{
    components,
    features::{Features, IndexLayout},
    tables::{Coding, NumberTableWriter},
    writer::{IndexWriter, WriterStatistics},
};

type BitSink = OutputBitStream<Box<dyn SealingWrite>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first list, or after the last posting of a list.
    ListBoundary,
    Frequency,
    DocumentRecord,
    Pointer,
    Payload,
    Count,
    Positions,
}

/// Writes inverted lists as instantaneous codes.
///
/// Per list, the posting stream (`.index`) holds gamma(`frequency - 1`) followed by
/// the postings. Per posting it holds:
///
/// - gamma(`pointer - previous - 1`), the first pointer of a list being coded as is,
/// - for payloads, gamma(byte length) followed by the bytes,
/// - for counts, gamma(`count - 1`),
/// - for positions, delta(first) and then delta(`gap - 1`) for the others.
///
/// In the high-performance layout positions go to a separate `.positions` stream in
/// the same order. The per-list bit lengths go to `.offsets` and, with positions,
/// the bits spent on positions go to `.posnumbits` and the sum of the last
/// position of each posting goes to `.sumsmaxpos`.
pub struct BitStreamIndexWriter {
    basename: String,
    features: Features,
    number_of_documents: u64,
    index: BitSink,
    positions: Option<BitSink>,
    offsets: NumberTableWriter,
    position_bits: Option<NumberTableWriter>,
    sums_max_position: Option<NumberTableWriter>,
    state: State,
    frequency: u64,
    records: u64,
    last_pointer: Option<u64>,
    count: u32,
    list_start: u64,
    list_position_bits: u64,
    list_sum_max_position: u64,
    stats: WriterStatistics,
}

impl BitStreamIndexWriter {
    /// Opens a writer for an index of `number_of_documents` documents.
    pub fn open(
        storage: &dyn IndexStorage,
        basename: &str,
        number_of_documents: u64,
        features: Features,
        layout: IndexLayout,
    ) -> Result<BitStreamIndexWriter> {
        features.validate()?;
        if layout == IndexLayout::HighPerformance {
            verify_arg!(layout, features.positions);
            verify_arg!(layout, !features.payloads);
        }

        let create = |extension: &str| -> Result<BitSink> {
            let name = components::name(basename, extension);
            let out = storage.create(&name).map_err(|e| Error::io(&name, e))?;
            Ok(OutputBitStream::new(out))
        };

        let index = create(components::INDEX)?;
        let positions = match layout {
            IndexLayout::HighPerformance => Some(create(components::POSITIONS)?),
            IndexLayout::Interleaved => None,
        };
        let offsets = NumberTableWriter::create(
            storage,
            components::name(basename, components::OFFSETS),
            Coding::Gamma,
        )?;
        let side_table = |extension: &str, coding: Coding| -> Result<_> {
            if features.positions {
                let name = components::name(basename, extension);
                Ok(Some(NumberTableWriter::create(storage, name, coding)?))
            } else {
                Ok(None)
            }
        };
        let position_bits = side_table(components::POSITIONS_NUMBER_OF_BITS, Coding::Gamma)?;
        let sums_max_position = side_table(components::SUMS_MAX_POSITION, Coding::Delta)?;

        Ok(BitStreamIndexWriter {
            basename: basename.to_string(),
            features,
            number_of_documents,
            index,
            positions,
            offsets,
            position_bits,
            sums_max_position,
            state: State::ListBoundary,
            frequency: 0,
            records: 0,
            last_pointer: None,
            count: 0,
            list_start: 0,
            list_position_bits: 0,
            list_sum_max_position: 0,
            stats: WriterStatistics::default(),
        })
    }

    fn expect_state(&self, expected: State, call: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::invalid_operation(format!(
                "{call} called in state {:?} (expected {expected:?})",
                self.state
            )))
        }
    }

    fn io_error(&self, e: std::io::Error) -> Error {
        Error::io(&self.basename, e)
    }

    /// Moves past the current posting, closing the list after its last posting.
    fn complete_record(&mut self) -> Result<()> {
        self.records += 1;
        if self.records < self.frequency {
            self.state = State::DocumentRecord;
            return Ok(());
        }
        self.state = State::ListBoundary;
        let list_bits = self.index.bits_written() - self.list_start;
        self.offsets.push(list_bits)?;
        if let Some(position_bits) = self.position_bits.as_mut() {
            position_bits.push(self.list_position_bits)?;
        }
        if let Some(sums) = self.sums_max_position.as_mut() {
            sums.push(self.list_sum_max_position)?;
        }
        Ok(())
    }
}

impl IndexWriter for BitStreamIndexWriter {
    fn features(&self) -> Features {
        self.features
    }

    fn new_inverted_list(&mut self) -> Result<()> {
        self.expect_state(State::ListBoundary, "new_inverted_list")?;
        self.state = State::Frequency;
        self.list_start = self.index.bits_written();
        self.list_position_bits = 0;
        self.list_sum_max_position = 0;
        self.stats.terms += 1;
        Ok(())
    }

    fn write_frequency(&mut self, frequency: u64) -> Result<()> {
        self.expect_state(State::Frequency, "write_frequency")?;
        verify_arg!(frequency, frequency > 0);
        verify_arg!(frequency, frequency <= self.number_of_documents);
        self.index
            .write_gamma(frequency - 1)
            .map_err(|e| self.io_error(e))?;
        self.frequency = frequency;
        self.records = 0;
        self.last_pointer = None;
        self.state = State::DocumentRecord;
        Ok(())
    }

    fn new_document_record(&mut self) -> Result<()> {
        self.expect_state(State::DocumentRecord, "new_document_record")?;
        self.state = State::Pointer;
        Ok(())
    }

    fn write_document_pointer(&mut self, pointer: u64) -> Result<()> {
        self.expect_state(State::Pointer, "write_document_pointer")?;
        verify_arg!(pointer, pointer < self.number_of_documents);
        let gap = match self.last_pointer {
            Some(last) if pointer <= last => {
                return Err(Error::invalid_arg(
                    "pointer",
                    format!("document pointer {pointer} does not follow {last}"),
                ));
            }
            Some(last) => pointer - last - 1,
            None => pointer,
        };
        self.index.write_gamma(gap).map_err(|e| self.io_error(e))?;
        self.last_pointer = Some(pointer);
        self.stats.postings += 1;

        if self.features.payloads {
            self.state = State::Payload;
            Ok(())
        } else if self.features.counts {
            self.state = State::Count;
            Ok(())
        } else {
            self.complete_record()
        }
    }

    fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        self.expect_state(State::Payload, "write_payload")?;
        self.index
            .write_gamma(payload.len() as u64)
            .and_then(|_| self.index.write_bytes(payload))
            .map_err(|e| self.io_error(e))?;
        if self.features.counts {
            self.state = State::Count;
            Ok(())
        } else {
            self.complete_record()
        }
    }

    fn write_position_count(&mut self, count: u32) -> Result<()> {
        self.expect_state(State::Count, "write_position_count")?;
        verify_arg!(count, count > 0);
        self.index
            .write_gamma(count as u64 - 1)
            .map_err(|e| self.io_error(e))?;
        self.count = count;
        self.stats.occurrences += count as u64;
        self.stats.max_count = self.stats.max_count.max(count);
        if self.features.positions {
            self.state = State::Positions;
            Ok(())
        } else {
            self.complete_record()
        }
    }

    fn write_document_positions(&mut self, positions: &[u32]) -> Result<()> {
        self.expect_state(State::Positions, "write_document_positions")?;
        verify_arg!(positions, positions.len() == self.count as usize);
        verify_arg!(positions, positions.windows(2).all(|w| w[0] < w[1]));

        let stream = match self.positions.as_mut() {
            Some(stream) => stream,
            None => &mut self.index,
        };
        let before = stream.bits_written();
        let result = positions.iter().enumerate().try_for_each(|(i, &p)| {
            let gap = if i == 0 { p } else { p - positions[i - 1] - 1 };
            stream.write_delta(gap as u64)
        });
        let bits = stream.bits_written() - before;
        result.map_err(|e| self.io_error(e))?;

        self.list_position_bits += bits;
        self.list_sum_max_position += positions.last().copied().unwrap_or(0) as u64;
        self.stats.position_bits += bits;
        self.complete_record()
    }

    fn close(self: Box<Self>) -> Result<WriterStatistics> {
        self.expect_state(State::ListBoundary, "close")?;
        let this = *self;
        let mut stats = this.stats;
        let basename = this.basename;
        let io_error = |e| Error::io(&basename, e);

        stats.index_bits = this.index.bits_written();
        this.index
            .finish()
            .and_then(|mut out| out.seal())
            .map_err(io_error)?;
        if let Some(positions) = this.positions {
            positions
                .finish()
                .and_then(|mut out| out.seal())
                .map_err(io_error)?;
        }
        stats.offset_bits = this.offsets.finish()?;
        if let Some(position_bits) = this.position_bits {
            position_bits.finish()?;
        }
        if let Some(sums) = this.sums_max_position {
            sums.finish()?;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use lexis_io::InMemoryStorage;

    use super::*;
    use crate::posting::Posting;

    fn open(storage: &InMemoryStorage, features: Features) -> Box<dyn IndexWriter> {
        Box::new(
            BitStreamIndexWriter::open(storage, "w", 10, features, IndexLayout::Interleaved)
                .unwrap(),
        )
    }

    #[test]
    fn test_write_lists() {
        let storage = InMemoryStorage::new();
        let mut writer = open(&storage, Features::POSITIONS);
        writer
            .write_inverted_list(&[
                Posting::with_positions(0, vec![1, 3]),
                Posting::with_positions(4, vec![0]),
            ])
            .unwrap();
        writer
            .write_inverted_list(&[Posting::with_positions(9, vec![2, 5, 6])])
            .unwrap();
        let stats = writer.close().unwrap();
        assert_eq!(stats.terms, 2);
        assert_eq!(stats.postings, 3);
        assert_eq!(stats.occurrences, 6);
        assert_eq!(stats.max_count, 3);
        assert!(stats.position_bits > 0);
        for ext in [".index", ".offsets", ".posnumbits", ".sumsmaxpos"] {
            assert!(storage.exists(&format!("w{ext}")), "{ext}");
        }
        assert!(!storage.exists("w.positions"));
    }

    #[test]
    fn test_call_order_violations() {
        let storage = InMemoryStorage::new();
        let mut writer = open(&storage, Features::COUNTS);
        assert!(writer.write_frequency(1).is_err());

        let mut writer = open(&storage, Features::COUNTS);
        writer.new_inverted_list().unwrap();
        writer.write_frequency(2).unwrap();
        writer.write_posting(&Posting::with_count(1, 1)).unwrap();
        // The list announced two postings.
        assert!(writer.new_inverted_list().is_err());
    }

    #[test]
    fn test_close_with_incomplete_list() {
        let storage = InMemoryStorage::new();
        let mut writer = open(&storage, Features::POINTERS);
        writer.new_inverted_list().unwrap();
        writer.write_frequency(1).unwrap();
        assert!(writer.close().is_err());
    }

    #[test]
    fn test_pointer_checks() {
        let storage = InMemoryStorage::new();
        let mut writer = open(&storage, Features::POINTERS);
        writer.new_inverted_list().unwrap();
        writer.write_frequency(3).unwrap();
        writer.write_posting(&Posting::new(2)).unwrap();
        assert!(writer.write_posting(&Posting::new(2)).is_err());

        let mut writer = open(&storage, Features::POINTERS);
        writer.new_inverted_list().unwrap();
        writer.write_frequency(1).unwrap();
        assert!(writer.write_posting(&Posting::new(10)).is_err());
    }

    #[test]
    fn test_frequency_bounds() {
        let storage = InMemoryStorage::new();
        let mut writer = open(&storage, Features::POINTERS);
        writer.new_inverted_list().unwrap();
        assert!(writer.write_frequency(0).is_err());

        let mut writer = open(&storage, Features::POINTERS);
        writer.new_inverted_list().unwrap();
        assert!(writer.write_frequency(11).is_err());
    }

    #[test]
    fn test_position_count_mismatch() {
        let storage = InMemoryStorage::new();
        let mut writer = open(&storage, Features::POSITIONS);
        writer.new_inverted_list().unwrap();
        writer.write_frequency(1).unwrap();
        writer.new_document_record().unwrap();
        writer.write_document_pointer(0).unwrap();
        writer.write_position_count(2).unwrap();
        assert!(writer.write_document_positions(&[4]).is_err());
    }

    #[test]
    fn test_missing_payload() {
        let storage = InMemoryStorage::new();
        let mut writer = open(&storage, Features::COUNTS.with_payloads());
        writer.new_inverted_list().unwrap();
        writer.write_frequency(1).unwrap();
        assert!(writer.write_posting(&Posting::with_count(0, 1)).is_err());
    }

    #[test]
    fn test_high_performance_layout_constraints() {
        let storage = InMemoryStorage::new();
        assert!(
            BitStreamIndexWriter::open(
                &storage,
                "hp",
                1,
                Features::COUNTS,
                IndexLayout::HighPerformance
            )
            .is_err()
        );
        assert!(
            BitStreamIndexWriter::open(
                &storage,
                "hp",
                1,
                Features::POSITIONS.with_payloads(),
                IndexLayout::HighPerformance
            )
            .is_err()
        );
        let mut writer: Box<dyn IndexWriter> = Box::new(
            BitStreamIndexWriter::open(
                &storage,
                "hp",
                1,
                Features::POSITIONS,
                IndexLayout::HighPerformance,
            )
            .unwrap(),
        );
        writer
            .write_inverted_list(&[Posting::with_positions(0, vec![7])])
            .unwrap();
        writer.close().unwrap();
        assert!(storage.exists("hp.positions"));
    }
}
