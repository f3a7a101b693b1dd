//! Bit-level streams with the instantaneous codes used by index components.
//!
//! Bits are written most-significant first. Three codes are provided on top of
//! raw fixed-width fields, all of them for non-negative integers:
//!
//! - **unary**: `n` is written as `n` zeros followed by a one.
//! - **gamma**: `x + 1` is split into its bit length `n + 1` and the `n` bits below
//!   the leading one; `n` is written in unary, then the `n` low bits.
//! - **delta**: like gamma, but `n` itself is gamma-coded. Better for the larger
//!   values found in position gaps and sums.
//!
//! [`OutputBitStream`] and [`InputBitStream`] adapt `std::io` writers and readers;
//! [`BitBuffer`] is an owned, growable in-memory arena addressed by a bit cursor,
//! read back with [`BitSliceReader`].

use std::io::{Read, Write};

#[inline]
fn low_bits(value: u64, width: u32) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

#[inline]
fn bit_length_minus_one(value: u64) -> u32 {
    debug_assert!(value != 0);
    63 - value.leading_zeros()
}

fn overflow(code: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("value too large for {code} code"),
    )
}

fn corrupt(code: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("malformed {code} code"),
    )
}

/// A sink of bits.
pub trait BitWrite {
    /// Writes the `width` low bits of `value`, most significant first.
    /// `width` must not exceed 64.
    fn write_bits(&mut self, value: u64, width: u32) -> std::io::Result<()>;

    /// Total number of bits written so far.
    fn bits_written(&self) -> u64;

    fn write_unary(&mut self, mut n: u64) -> std::io::Result<()> {
        while n >= 64 {
            self.write_bits(0, 64)?;
            n -= 64;
        }
        self.write_bits(1, n as u32 + 1)
    }

    fn write_gamma(&mut self, x: u64) -> std::io::Result<()> {
        let value = x.checked_add(1).ok_or_else(|| overflow("gamma"))?;
        let n = bit_length_minus_one(value);
        self.write_unary(n as u64)?;
        self.write_bits(low_bits(value, n), n)
    }

    fn write_delta(&mut self, x: u64) -> std::io::Result<()> {
        let value = x.checked_add(1).ok_or_else(|| overflow("delta"))?;
        let n = bit_length_minus_one(value);
        self.write_gamma(n as u64)?;
        self.write_bits(low_bits(value, n), n)
    }

    fn write_bytes(&mut self, data: &[u8]) -> std::io::Result<()> {
        for &byte in data {
            self.write_bits(byte as u64, 8)?;
        }
        Ok(())
    }
}

/// A source of bits.
pub trait BitRead {
    /// Reads `width` bits (at most 64) as an unsigned integer.
    fn read_bits(&mut self, width: u32) -> std::io::Result<u64>;

    /// Total number of bits consumed so far.
    fn bits_read(&self) -> u64;

    fn read_unary(&mut self) -> std::io::Result<u64> {
        let mut n = 0u64;
        while self.read_bits(1)? == 0 {
            n += 1;
            if n > 64 * 64 {
                return Err(corrupt("unary"));
            }
        }
        Ok(n)
    }

    fn read_gamma(&mut self) -> std::io::Result<u64> {
        let n = self.read_unary()?;
        if n > 63 {
            return Err(corrupt("gamma"));
        }
        let n = n as u32;
        Ok(((1u64 << n) | self.read_bits(n)?) - 1)
    }

    fn read_delta(&mut self) -> std::io::Result<u64> {
        let n = self.read_gamma()?;
        if n > 63 {
            return Err(corrupt("delta"));
        }
        let n = n as u32;
        Ok(((1u64 << n) | self.read_bits(n)?) - 1)
    }

    fn read_bytes(&mut self, len: usize) -> std::io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            data.push(self.read_bits(8)? as u8);
        }
        Ok(data)
    }
}

/// Writes bits to an underlying `std::io::Write`.
///
/// The trailing partial byte is padded with zeros by [`OutputBitStream::finish`].
pub struct OutputBitStream<W: Write> {
    inner: W,
    current: u8,
    filled: u32,
    written: u64,
}

impl<W: Write> OutputBitStream<W> {
    pub fn new(inner: W) -> Self {
        OutputBitStream {
            inner,
            current: 0,
            filled: 0,
            written: 0,
        }
    }

    /// Pads the current byte with zeros, so that the next write starts on a
    /// byte boundary. Padding is not counted in `bits_written`.
    pub fn align(&mut self) -> std::io::Result<()> {
        if self.filled != 0 {
            self.inner.write_all(&[self.current])?;
            self.current = 0;
            self.filled = 0;
        }
        Ok(())
    }

    /// Aligns and flushes the stream, returning the underlying writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.align()?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> BitWrite for OutputBitStream<W> {
    fn write_bits(&mut self, value: u64, width: u32) -> std::io::Result<()> {
        debug_assert!(width <= 64);
        let mut remaining = width;
        while remaining > 0 {
            let space = 8 - self.filled;
            let take = space.min(remaining);
            let chunk = low_bits(value >> (remaining - take), take) as u8;
            self.current |= chunk << (space - take);
            self.filled += take;
            remaining -= take;
            if self.filled == 8 {
                self.inner.write_all(&[self.current])?;
                self.current = 0;
                self.filled = 0;
            }
        }
        self.written += width as u64;
        Ok(())
    }

    fn bits_written(&self) -> u64 {
        self.written
    }
}

/// Reads bits from an underlying `std::io::Read`, strictly sequentially.
pub struct InputBitStream<R: Read> {
    inner: R,
    current: u8,
    available: u32,
    read: u64,
}

impl<R: Read> InputBitStream<R> {
    pub fn new(inner: R) -> Self {
        InputBitStream {
            inner,
            current: 0,
            available: 0,
            read: 0,
        }
    }

    /// Skips the remaining bits of the current byte.
    pub fn align(&mut self) {
        self.read += self.available as u64;
        self.available = 0;
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> BitRead for InputBitStream<R> {
    fn read_bits(&mut self, width: u32) -> std::io::Result<u64> {
        debug_assert!(width <= 64);
        let mut value = 0u64;
        let mut remaining = width;
        while remaining > 0 {
            if self.available == 0 {
                let mut byte = [0u8];
                self.inner.read_exact(&mut byte)?;
                self.current = byte[0];
                self.available = 8;
            }
            let take = self.available.min(remaining);
            let chunk = low_bits((self.current >> (self.available - take)) as u64, take);
            value = if take == 64 { chunk } else { (value << take) | chunk };
            self.available -= take;
            remaining -= take;
        }
        self.read += width as u64;
        Ok(value)
    }

    fn bits_read(&self) -> u64 {
        self.read
    }
}

/// An owned, growable bit arena with an explicit write cursor.
///
/// Capacity management is left to the owner (see [`BitBuffer::reserve_bytes`] and
/// [`BitBuffer::shrink_to_fit`]); writes never move already written bits.
#[derive(Clone, Default)]
pub struct BitBuffer {
    bytes: Vec<u8>,
    len_bits: u64,
}

impl BitBuffer {
    pub fn new() -> BitBuffer {
        Default::default()
    }

    pub fn with_capacity(bytes: usize) -> BitBuffer {
        BitBuffer {
            bytes: Vec::with_capacity(bytes),
            len_bits: 0,
        }
    }

    /// Number of bits written.
    pub fn len_bits(&self) -> u64 {
        self.len_bits
    }

    /// Number of bytes occupied by the written bits.
    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len_bits == 0
    }

    pub fn capacity_bytes(&self) -> usize {
        self.bytes.capacity()
    }

    /// Ensures the buffer can hold `total` bytes without reallocating.
    pub fn reserve_bytes(&mut self, total: usize) {
        if total > self.bytes.len() {
            self.bytes.reserve_exact(total - self.bytes.len());
        }
    }

    pub fn shrink_to_fit(&mut self) {
        self.bytes.shrink_to_fit();
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.len_bits = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns a reader positioned at the first bit.
    pub fn reader(&self) -> BitSliceReader<'_> {
        BitSliceReader::new(&self.bytes, self.len_bits)
    }
}

impl BitWrite for BitBuffer {
    fn write_bits(&mut self, value: u64, width: u32) -> std::io::Result<()> {
        debug_assert!(width <= 64);
        let mut remaining = width;
        while remaining > 0 {
            let used = (self.len_bits % 8) as u32;
            if used == 0 {
                self.bytes.push(0);
            }
            let space = 8 - used;
            let take = space.min(remaining);
            let chunk = low_bits(value >> (remaining - take), take) as u8;
            let last = self.bytes.len() - 1;
            self.bytes[last] |= chunk << (space - take);
            self.len_bits += take as u64;
            remaining -= take;
        }
        Ok(())
    }

    fn bits_written(&self) -> u64 {
        self.len_bits
    }
}

/// Reads bits from a byte slice through an explicit bit cursor.
pub struct BitSliceReader<'a> {
    bytes: &'a [u8],
    position: u64,
    limit: u64,
}

impl<'a> BitSliceReader<'a> {
    /// Creates a reader over the first `limit` bits of `bytes`.
    pub fn new(bytes: &'a [u8], limit: u64) -> Self {
        BitSliceReader {
            bytes,
            position: 0,
            limit: limit.min(bytes.len() as u64 * 8),
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.position
    }
}

impl BitRead for BitSliceReader<'_> {
    fn read_bits(&mut self, width: u32) -> std::io::Result<u64> {
        debug_assert!(width <= 64);
        if self.remaining() < width as u64 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        let mut value = 0u64;
        let mut remaining = width;
        while remaining > 0 {
            let byte = self.bytes[(self.position / 8) as usize];
            let offset = (self.position % 8) as u32;
            let available = 8 - offset;
            let take = available.min(remaining);
            let chunk = low_bits((byte >> (available - take)) as u64, take);
            value = if take == 64 { chunk } else { (value << take) | chunk };
            self.position += take as u64;
            remaining -= take;
        }
        Ok(value)
    }

    fn bits_read(&self) -> u64 {
        self.position
    }
}
