use lexis_budget_tracker::{Allocation, Budget};
use lexis_common::{Result, error::Error};
use lexis_io::bits::{BitBuffer, BitRead, BitWrite};

use crate::{features::Features, posting::Posting};

/// Capacity of a freshly created posting buffer, in bytes.
pub const INITIAL_CAPACITY: usize = 8;

/// How document pointers are written into a posting buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerCoding {
    /// Gaps from the previous pointer. Pointers arrive strictly increasing.
    Gaps,
    /// Absolute pointers, in arrival order.
    Absolute,
}

/// The growing posting list of one term.
///
/// Postings are encoded into a [`BitBuffer`] whose capacity is charged to the
/// accumulator's memory budget. The posting of the document being scanned stays
/// open (pointer, count and pending positions) until [`PostingBuffer::close_posting`].
pub struct PostingBuffer {
    bits: BitBuffer,
    allocation: Allocation,
    degraded: bool,
    open: Option<u64>,
    last_pointer: Option<u64>,
    count: u32,
    positions: Vec<u32>,
    payload: Vec<u8>,
    postings: u64,
    occurrences: u64,
    max_count: u32,
}

impl PostingBuffer {
    pub fn new(budget: &Budget) -> PostingBuffer {
        let mut allocation = budget.empty_allocation();
        let degraded = allocation.grow(INITIAL_CAPACITY as u64).is_err();
        if degraded {
            allocation.grow_overcommit(INITIAL_CAPACITY as u64);
        }
        PostingBuffer {
            bits: BitBuffer::with_capacity(INITIAL_CAPACITY),
            allocation,
            degraded,
            open: None,
            last_pointer: None,
            count: 0,
            positions: Vec::new(),
            payload: Vec::new(),
            postings: 0,
            occurrences: 0,
            max_count: 0,
        }
    }

    /// Records one occurrence in document `pointer`. An open posting for another
    /// document is closed first.
    ///
    /// Returns `true` if the buffer had to overcommit the budget to grow.
    pub fn record(
        &mut self,
        pointer: u64,
        position: u32,
        features: Features,
        coding: PointerCoding,
    ) -> Result<bool> {
        self.check_pointer(pointer, coding)?;
        let mut overcommitted = false;
        if self.open.is_some_and(|open| open != pointer) {
            overcommitted = self.close_posting(features, coding)?;
        }
        if self.open.is_none() {
            self.open = Some(pointer);
            self.count = 0;
            self.positions.clear();
        }
        self.count = self
            .count
            .checked_add(1)
            .ok_or_else(|| Error::invalid_arg("count", "too many occurrences in a document"))?;
        if features.positions {
            if self.positions.last().is_some_and(|&last| last >= position) {
                return Err(Error::invalid_arg(
                    "position",
                    format!("position {position} does not follow the previous occurrence"),
                ));
            }
            self.positions.push(position);
        }
        Ok(overcommitted)
    }

    /// Opens the posting of document `pointer` with its payload. A document
    /// carries at most one payload.
    ///
    /// Returns `true` if the buffer had to overcommit the budget to grow.
    pub fn record_payload(
        &mut self,
        pointer: u64,
        payload: &[u8],
        features: Features,
        coding: PointerCoding,
    ) -> Result<bool> {
        if !features.payloads {
            return Err(Error::invalid_operation("payload without the payload feature"));
        }
        if self.open == Some(pointer) {
            return Err(Error::invalid_arg(
                "payload",
                format!("document {pointer} already has a payload"),
            ));
        }
        self.check_pointer(pointer, coding)?;
        let overcommitted = self.close_posting(features, coding)?;
        self.open = Some(pointer);
        self.count = 0;
        self.payload.clear();
        self.payload.extend_from_slice(payload);
        Ok(overcommitted)
    }

    fn check_pointer(&self, pointer: u64, coding: PointerCoding) -> Result<()> {
        if pointer == u64::MAX {
            return Err(Error::invalid_arg(
                "pointer",
                "document pointer u64::MAX is out of range",
            ));
        }
        if coding == PointerCoding::Gaps && self.open != Some(pointer) {
            if let Some(previous) = self.open.or(self.last_pointer) {
                if pointer <= previous {
                    return Err(Error::invalid_arg(
                        "pointer",
                        format!("document pointer {pointer} does not follow {previous}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Encodes the open posting, if any.
    ///
    /// Returns `true` if the buffer had to overcommit the budget to grow.
    pub fn close_posting(&mut self, features: Features, coding: PointerCoding) -> Result<bool> {
        let Some(pointer) = self.open.take() else {
            return Ok(false);
        };
        let pointer_code = match (coding, self.last_pointer) {
            (PointerCoding::Gaps, Some(last)) if pointer <= last => {
                return Err(Error::invalid_arg(
                    "pointer",
                    format!("document pointer {pointer} does not follow {last}"),
                ));
            }
            (PointerCoding::Gaps, Some(last)) => pointer - last - 1,
            _ => pointer,
        };

        let mut record_bits = gamma_bits(pointer_code);
        if features.payloads {
            record_bits += gamma_bits(self.payload.len() as u64) + 8 * self.payload.len() as u64;
        }
        if features.counts {
            record_bits += gamma_bits(self.count as u64 - 1);
        }
        if features.positions {
            record_bits += position_bits(&self.positions);
        }
        let overcommitted = self.ensure_capacity(self.bits.len_bits() + record_bits);

        self.bits.write_gamma(pointer_code)?;
        if features.payloads {
            self.bits.write_gamma(self.payload.len() as u64)?;
            self.bits.write_bytes(&self.payload)?;
        }
        if features.counts {
            self.bits.write_gamma(self.count as u64 - 1)?;
        }
        if features.positions {
            write_positions(&mut self.bits, &self.positions)?;
        }

        self.last_pointer = Some(pointer);
        self.postings += 1;
        self.occurrences += self.count as u64;
        self.max_count = self.max_count.max(self.count);
        self.positions.clear();
        self.payload.clear();
        Ok(overcommitted)
    }

    /// Grows the charged capacity so that `total_bits` fit. Growth doubles the
    /// capacity until an allocation fails; from then on the buffer is degraded and
    /// grows by exactly what it needs, beyond the budget if necessary.
    fn ensure_capacity(&mut self, total_bits: u64) -> bool {
        let required = total_bits.div_ceil(8);
        let capacity = self.allocation.amount();
        if required <= capacity {
            return false;
        }
        let mut overcommitted = false;
        let target = if self.degraded {
            overcommitted = self.allocation.grow_overcommit(required - capacity) != 0;
            required
        } else {
            let doubled = required.max(capacity * 2);
            if self.allocation.grow(doubled - capacity).is_ok() {
                doubled
            } else {
                self.degraded = true;
                overcommitted = self.allocation.grow_overcommit(required - capacity) != 0;
                required
            }
        };
        self.bits.reserve_bytes(target as usize);
        overcommitted
    }

    /// Releases unused capacity back to the budget.
    pub fn compact(&mut self) {
        self.bits.shrink_to_fit();
        self.positions.shrink_to_fit();
        self.payload.shrink_to_fit();
        self.allocation.shrink_to(self.bits.len_bytes() as u64);
    }

    /// Returns `true` while a posting is being accumulated.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Number of closed postings.
    #[cfg(test)]
    pub fn postings(&self) -> u64 {
        self.postings
    }

    /// Number of occurrences in closed postings.
    pub fn occurrences(&self) -> u64 {
        self.occurrences
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    /// Bytes charged to the budget.
    #[cfg(test)]
    pub fn charged(&self) -> u64 {
        self.allocation.amount()
    }

    /// Decodes the closed postings, in arrival order.
    pub fn decode(&self, features: Features, coding: PointerCoding) -> Result<Vec<Posting>> {
        let mut reader = self.bits.reader();
        let mut postings = Vec::with_capacity(self.postings as usize);
        let mut last: Option<u64> = None;
        for _ in 0..self.postings {
            let code = reader.read_gamma()?;
            let pointer = match (coding, last) {
                (PointerCoding::Gaps, Some(last)) => last + code + 1,
                _ => code,
            };
            last = Some(pointer);
            let mut posting = Posting::new(pointer);
            if features.payloads {
                let len = reader.read_gamma()? as usize;
                posting.payload = Some(reader.read_bytes(len)?);
            }
            if features.counts {
                let count = reader.read_gamma()? as u32 + 1;
                posting.count = Some(count);
                if features.positions {
                    let mut positions = Vec::with_capacity(count as usize);
                    let mut next = 0u64;
                    for _ in 0..count {
                        next += reader.read_delta()?;
                        positions.push(next as u32);
                        next += 1;
                    }
                    posting.positions = positions;
                }
            }
            postings.push(posting);
        }
        Ok(postings)
    }
}

fn gamma_bits(x: u64) -> u64 {
    let n = (x as u128 + 1).ilog2() as u64;
    2 * n + 1
}

fn delta_bits(x: u64) -> u64 {
    let n = (x as u128 + 1).ilog2() as u64;
    gamma_bits(n) + n
}

fn position_bits(positions: &[u32]) -> u64 {
    let mut previous: Option<u32> = None;
    positions
        .iter()
        .map(|&p| {
            let gap = previous.map_or(p, |prev| p - prev - 1);
            previous = Some(p);
            delta_bits(gap as u64)
        })
        .sum()
}

fn write_positions(bits: &mut BitBuffer, positions: &[u32]) -> std::io::Result<()> {
    let mut previous: Option<u32> = None;
    for &p in positions {
        let gap = previous.map_or(p, |prev| p - prev - 1);
        bits.write_delta(gap as u64)?;
        previous = Some(p);
    }
    Ok(())
}
