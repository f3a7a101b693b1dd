//! Sequential writers and read-once readers for the term list and the
//! per-term/per-document numeric side tables.

use std::io::{BufRead, BufReader, Read, Write};

use lexis_common::{Result, error::Error};
use lexis_io::{
    IndexStorage, SealingWrite,
    bits::{BitRead, BitWrite, InputBitStream, OutputBitStream},
};

/// Instantaneous code used by a numeric table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    Gamma,
    Delta,
}

/// Writes a sorted term list, one UTF-8 term per line.
pub struct TermListWriter {
    name: String,
    out: Box<dyn SealingWrite>,
    last: Option<String>,
    count: u64,
}

impl TermListWriter {
    pub fn create(storage: &dyn IndexStorage, name: String) -> Result<TermListWriter> {
        let out = storage.create(&name).map_err(|e| Error::io(&name, e))?;
        Ok(TermListWriter {
            name,
            out,
            last: None,
            count: 0,
        })
    }

    /// Appends a term. Terms must be written in strictly increasing order and
    /// must not contain line breaks.
    pub fn write_term(&mut self, term: &str) -> Result<()> {
        if term.contains(['\n', '\r']) {
            return Err(Error::invalid_arg("term", "terms cannot contain line breaks"));
        }
        if let Some(last) = &self.last {
            if last.as_str() >= term {
                return Err(Error::invalid_arg(
                    "term",
                    format!("term '{term}' is not greater than '{last}'"),
                ));
            }
        }
        self.out
            .write_all(term.as_bytes())
            .and_then(|_| self.out.write_all(b"\n"))
            .map_err(|e| Error::io(&self.name, e))?;
        match &mut self.last {
            Some(last) => {
                last.clear();
                last.push_str(term);
            }
            None => self.last = Some(term.to_string()),
        }
        self.count += 1;
        Ok(())
    }

    /// Seals the stream and returns the number of terms written.
    pub fn finish(mut self) -> Result<u64> {
        self.out.seal().map_err(|e| Error::io(&self.name, e))?;
        Ok(self.count)
    }
}

/// Read-once cursor over a term list.
pub struct TermListReader {
    name: String,
    lines: BufReader<Box<dyn Read + Send>>,
    term: String,
}

impl TermListReader {
    pub fn open(storage: &dyn IndexStorage, name: String) -> Result<TermListReader> {
        let reader = storage.open(&name).map_err(|e| Error::io(&name, e))?;
        Ok(TermListReader {
            name,
            lines: BufReader::new(reader),
            term: String::new(),
        })
    }

    /// Advances to the next term. Returns `false` at the end of the list.
    pub fn next_term(&mut self) -> Result<bool> {
        self.term.clear();
        let read = self
            .lines
            .read_line(&mut self.term)
            .map_err(|e| Error::io(&self.name, e))?;
        if read == 0 {
            return Ok(false);
        }
        if self.term.ends_with('\n') {
            self.term.pop();
        }
        Ok(true)
    }

    /// The current term.
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Moves the current term out of the cursor.
    pub fn take_term(&mut self) -> String {
        std::mem::take(&mut self.term)
    }
}

/// Writes a sequence of non-negative integers with an instantaneous code.
pub struct NumberTableWriter {
    name: String,
    stream: OutputBitStream<Box<dyn SealingWrite>>,
    coding: Coding,
    count: u64,
}

impl NumberTableWriter {
    pub fn create(
        storage: &dyn IndexStorage,
        name: String,
        coding: Coding,
    ) -> Result<NumberTableWriter> {
        let out = storage.create(&name).map_err(|e| Error::io(&name, e))?;
        Ok(NumberTableWriter {
            name,
            stream: OutputBitStream::new(out),
            coding,
            count: 0,
        })
    }

    pub fn push(&mut self, value: u64) -> Result<()> {
        match self.coding {
            Coding::Gamma => self.stream.write_gamma(value),
            Coding::Delta => self.stream.write_delta(value),
        }
        .map_err(|e| Error::io(&self.name, e))?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Seals the stream and returns the number of bits written.
    pub fn finish(self) -> Result<u64> {
        let bits = self.stream.bits_written();
        let mut out = self
            .stream
            .finish()
            .map_err(|e| Error::io(&self.name, e))?;
        out.seal().map_err(|e| Error::io(&self.name, e))?;
        Ok(bits)
    }
}

/// Read-once cursor over a numeric table of known length.
pub struct NumberTableReader {
    name: String,
    stream: InputBitStream<Box<dyn Read + Send>>,
    coding: Coding,
    remaining: u64,
}

impl NumberTableReader {
    pub fn open(
        storage: &dyn IndexStorage,
        name: String,
        coding: Coding,
        len: u64,
    ) -> Result<NumberTableReader> {
        let reader = storage.open(&name).map_err(|e| Error::io(&name, e))?;
        Ok(NumberTableReader {
            name,
            stream: InputBitStream::new(reader),
            coding,
            remaining: len,
        })
    }

    /// Number of values not read yet.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Reads the next value. Reading past the declared length is an error.
    pub fn next_value(&mut self) -> Result<u64> {
        if self.remaining == 0 {
            return Err(Error::invalid_format_with(
                &self.name,
                "read past the end of the table",
            ));
        }
        let value = match self.coding {
            Coding::Gamma => self.stream.read_gamma(),
            Coding::Delta => self.stream.read_delta(),
        }
        .map_err(|e| Error::io(&self.name, e))?;
        self.remaining -= 1;
        Ok(value)
    }

    /// Reads the next value as a `u32`, failing if it does not fit.
    pub fn next_u32(&mut self) -> Result<u32> {
        let value = self.next_value()?;
        u32::try_from(value)
            .map_err(|_| Error::invalid_format_with(&self.name, format!("{value} exceeds u32")))
    }
}

/// Writes `values` as a complete gamma-coded table.
pub fn write_gamma_table(
    storage: &dyn IndexStorage,
    name: String,
    values: impl IntoIterator<Item = u64>,
) -> Result<u64> {
    let mut writer = NumberTableWriter::create(storage, name, Coding::Gamma)?;
    for value in values {
        writer.push(value)?;
    }
    writer.finish()
}

/// Reads a complete table of `len` values.
pub fn read_table(
    storage: &dyn IndexStorage,
    name: String,
    coding: Coding,
    len: u64,
) -> Result<Vec<u64>> {
    let mut reader = NumberTableReader::open(storage, name, coding, len)?;
    (0..len).map(|_| reader.next_value()).collect()
}

/// Reads a complete term list.
pub fn read_terms(storage: &dyn IndexStorage, name: String) -> Result<Vec<String>> {
    let mut reader = TermListReader::open(storage, name)?;
    let mut terms = Vec::new();
    while reader.next_term()? {
        terms.push(reader.take_term());
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use lexis_io::InMemoryStorage;

    use super::*;

    #[test]
    fn test_term_list() {
        let storage = InMemoryStorage::new();
        let mut writer = TermListWriter::create(&storage, "x.terms".into()).unwrap();
        for term in ["apple", "banana", "été"] {
            writer.write_term(term).unwrap();
        }
        assert!(writer.write_term("banana").is_err());
        assert!(writer.write_term("zz\nzz").is_err());
        assert_eq!(writer.finish().unwrap(), 3);

        assert_eq!(
            read_terms(&storage, "x.terms".into()).unwrap(),
            vec!["apple", "banana", "été"]
        );
    }

    #[test]
    fn test_number_tables() {
        let storage = InMemoryStorage::new();
        let mut writer =
            NumberTableWriter::create(&storage, "x.sums".into(), Coding::Delta).unwrap();
        for v in [0, 5, 1_000_000] {
            writer.push(v).unwrap();
        }
        assert_eq!(writer.count(), 3);
        writer.finish().unwrap();

        let mut reader =
            NumberTableReader::open(&storage, "x.sums".into(), Coding::Delta, 3).unwrap();
        assert_eq!(reader.next_value().unwrap(), 0);
        assert_eq!(reader.next_u32().unwrap(), 5);
        assert_eq!(reader.next_value().unwrap(), 1_000_000);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.next_value().is_err());
    }

    #[test]
    fn test_gamma_table_helpers() {
        let storage = InMemoryStorage::new();
        write_gamma_table(&storage, "x.sizes".into(), [3, 0, 7]).unwrap();
        assert_eq!(
            read_table(&storage, "x.sizes".into(), Coding::Gamma, 3).unwrap(),
            vec![3, 0, 7]
        );
    }

    #[test]
    fn test_empty_term_list() {
        let storage = InMemoryStorage::new();
        TermListWriter::create(&storage, "e.terms".into())
            .unwrap()
            .finish()
            .unwrap();
        let mut reader = TermListReader::open(&storage, "e.terms".into()).unwrap();
        assert!(!reader.next_term().unwrap());
    }
}
