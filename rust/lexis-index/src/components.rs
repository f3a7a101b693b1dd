//! Names of the streams making up an index or a batch.
//!
//! A component is addressed as `<basename><extension>`. Batches produced by a scan
//! of `<basename>` are named `<basename>@<n>`.

/// Sorted UTF-8 term list, one term per line.
pub const TERMS: &str = ".terms";
/// Gamma-coded number of postings per term.
pub const FREQUENCIES: &str = ".frequencies";
/// Gamma-coded number of occurrences per term.
pub const OCCURRENCES: &str = ".occurrences";
/// Gamma-coded document sizes, one per document.
pub const SIZES: &str = ".sizes";
/// Posting stream.
pub const INDEX: &str = ".index";
/// Position stream of high-performance indices.
pub const POSITIONS: &str = ".positions";
/// Gamma-coded bit length of each inverted list in the posting stream.
pub const OFFSETS: &str = ".offsets";
/// Gamma-coded number of bits spent on the positions of each inverted list.
pub const POSITIONS_NUMBER_OF_BITS: &str = ".posnumbits";
/// Delta-coded sum of the maximum position of each posting, per term.
pub const SUMS_MAX_POSITION: &str = ".sumsmaxpos";
/// JSON index properties.
pub const PROPERTIES: &str = ".properties";
/// JSON description of a batch set.
pub const CLUSTER_PROPERTIES: &str = ".cluster.properties";
/// Plain-text statistics of a combine run.
pub const STATS: &str = ".stats";

/// Every component a batch may consist of.
pub const BATCH_COMPONENTS: &[&str] = &[
    TERMS,
    FREQUENCIES,
    OCCURRENCES,
    SIZES,
    INDEX,
    POSITIONS,
    OFFSETS,
    POSITIONS_NUMBER_OF_BITS,
    SUMS_MAX_POSITION,
    PROPERTIES,
    STATS,
];

pub fn name(basename: &str, extension: &str) -> String {
    format!("{basename}{extension}")
}

pub fn batch_basename(basename: &str, batch: usize) -> String {
    format!("{basename}@{batch}")
}
