use lexis_common::{Result, error::Error};
use lexis_io::IndexStorage;

use crate::{
    components,
    posting::Posting,
    properties::IndexProperties,
    read::PostingStreamReader,
    tables::{Coding, NumberTableReader, TermListReader},
};

/// Which optional streams of an input a combine run reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitStreams {
    pub postings: bool,
    pub occurrences: bool,
    pub sums_max_position: bool,
}

/// One input of a combine run: a read-once cursor over its terms, the per-term
/// side tables and, unless only metadata is combined, its posting stream.
pub struct CombinationUnit {
    index: usize,
    basename: String,
    properties: IndexProperties,
    terms: TermListReader,
    frequencies: NumberTableReader,
    occurrences: Option<NumberTableReader>,
    sums_max_position: Option<NumberTableReader>,
    postings: Option<PostingStreamReader>,
    previous: Option<String>,
    frequency: u64,
    occurrence: u64,
    sum_max_position: u64,
}

impl CombinationUnit {
    pub fn open(
        storage: &dyn IndexStorage,
        index: usize,
        basename: &str,
        properties: IndexProperties,
        streams: UnitStreams,
    ) -> Result<CombinationUnit> {
        let table = |extension: &str, coding: Coding| {
            NumberTableReader::open(
                storage,
                components::name(basename, extension),
                coding,
                properties.terms,
            )
        };
        let terms = TermListReader::open(storage, components::name(basename, components::TERMS))?;
        let frequencies = table(components::FREQUENCIES, Coding::Gamma)?;
        let occurrences = streams
            .occurrences
            .then(|| table(components::OCCURRENCES, Coding::Gamma))
            .transpose()?;
        let sums_max_position = streams
            .sums_max_position
            .then(|| table(components::SUMS_MAX_POSITION, Coding::Delta))
            .transpose()?;
        let postings = streams
            .postings
            .then(|| PostingStreamReader::open(storage, basename, &properties))
            .transpose()?;
        Ok(CombinationUnit {
            index,
            basename: basename.to_string(),
            properties,
            terms,
            frequencies,
            occurrences,
            sums_max_position,
            postings,
            previous: None,
            frequency: 0,
            occurrence: 0,
            sum_max_position: 0,
        })
    }

    /// Position of this input in the combine run.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn properties(&self) -> &IndexProperties {
        &self.properties
    }

    /// Moves to the next term and returns it, or `None` once the input is
    /// exhausted. The posting list of the current term must have been read, if
    /// postings are read at all.
    pub fn advance(&mut self) -> Result<Option<String>> {
        if self.postings.as_ref().is_some_and(|p| p.remaining() != 0) {
            return Err(Error::invalid_operation(format!(
                "advancing {} with unread postings",
                self.basename
            )));
        }
        if !self.terms.next_term()? {
            if self.frequencies.remaining() != 0 {
                return Err(Error::invalid_format_with(
                    &self.basename,
                    "fewer terms than declared",
                ));
            }
            return Ok(None);
        }
        let term = self.terms.take_term();
        if self.previous.as_ref().is_some_and(|previous| *previous >= term) {
            return Err(Error::invalid_format_with(
                components::name(&self.basename, components::TERMS),
                format!("term '{term}' is out of order"),
            ));
        }
        self.frequency = self.frequencies.next_value()?;
        if let Some(occurrences) = self.occurrences.as_mut() {
            self.occurrence = occurrences.next_value()?;
        }
        if let Some(sums) = self.sums_max_position.as_mut() {
            self.sum_max_position = sums.next_value()?;
        }
        self.previous = Some(term.clone());
        Ok(Some(term))
    }

    /// Frequency of the current term, from the frequency table.
    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    /// Occurrences of the current term, if the occurrence table is read.
    pub fn occurrence(&self) -> Option<u64> {
        self.occurrences.as_ref().map(|_| self.occurrence)
    }

    pub fn sum_max_position(&self) -> Option<u64> {
        self.sums_max_position.as_ref().map(|_| self.sum_max_position)
    }

    /// Starts reading the posting list of the current term, checking its
    /// frequency against the frequency table.
    pub fn start_postings(&mut self) -> Result<()> {
        let postings = self.postings.as_mut().ok_or_else(|| {
            Error::invalid_operation(format!("postings of {} are not open", self.basename))
        })?;
        let frequency = postings.next_list()?;
        if frequency != self.frequency {
            return Err(Error::invalid_format_with(
                components::name(&self.basename, components::INDEX),
                format!(
                    "posting list has {frequency} postings, the frequency table {}",
                    self.frequency
                ),
            ));
        }
        Ok(())
    }

    /// Reads the next posting of the current term.
    pub fn next_posting(&mut self) -> Option<Result<Posting>> {
        self.postings.as_mut()?.next_posting()
    }
}
