//! Sequential readers for persisted indices.

use lexis_common::{Result, verify_data};
use lexis_io::IndexStorage;

use crate::{
    components,
    posting::Posting,
    properties::IndexProperties,
    tables::{Coding, NumberTableReader, TermListReader},
};

mod postings;

pub use postings::{PostingStreamReader, Postings};

use postings::MAX_RESERVED;

/// Reads a whole index into memory as `(term, postings)` pairs, in term order.
///
/// The posting frequencies are checked against the frequency table.
pub fn read_inverted_lists(
    storage: &dyn IndexStorage,
    basename: &str,
) -> Result<Vec<(String, Vec<Posting>)>> {
    let properties = IndexProperties::load(storage, basename)?;
    let mut terms = TermListReader::open(storage, components::name(basename, components::TERMS))?;
    let mut frequencies = NumberTableReader::open(
        storage,
        components::name(basename, components::FREQUENCIES),
        Coding::Gamma,
        properties.terms,
    )?;
    let mut postings = PostingStreamReader::open(storage, basename, &properties)?;

    let mut lists = Vec::with_capacity((properties.terms as usize).min(MAX_RESERVED));
    while terms.next_term()? {
        let frequency = frequencies.next_value()?;
        verify_data!(frequency, postings.next_list()? == frequency);
        let list = postings.postings().collect::<Result<Vec<_>>>()?;
        lists.push((terms.take_term(), list));
    }
    verify_data!(terms, lists.len() as u64 == properties.terms);
    Ok(lists)
}

/// Reads the document-size table of an index.
pub fn read_sizes(storage: &dyn IndexStorage, basename: &str) -> Result<Vec<u64>> {
    let properties = IndexProperties::load(storage, basename)?;
    crate::tables::read_table(
        storage,
        components::name(basename, components::SIZES),
        Coding::Gamma,
        properties.documents,
    )
}
