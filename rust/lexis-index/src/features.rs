//! Optional posting components and physical layouts.

use lexis_common::{Result, error::Error};
use serde::{Deserialize, Serialize};

/// The optional components recorded for each posting of an index.
///
/// Document pointers are always present. Positions imply counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Features {
    pub counts: bool,
    pub positions: bool,
    pub payloads: bool,
}

impl Features {
    pub const POINTERS: Features = Features {
        counts: false,
        positions: false,
        payloads: false,
    };

    pub const COUNTS: Features = Features {
        counts: true,
        positions: false,
        payloads: false,
    };

    pub const POSITIONS: Features = Features {
        counts: true,
        positions: true,
        payloads: false,
    };

    /// Returns the same feature set with payloads enabled.
    pub fn with_payloads(mut self) -> Features {
        self.payloads = true;
        self
    }

    /// Component-wise logical AND.
    pub fn intersect(self, other: Features) -> Features {
        Features {
            counts: self.counts && other.counts,
            positions: self.positions && other.positions,
            payloads: self.payloads && other.payloads,
        }
    }

    /// Returns `true` if every component enabled in `other` is enabled in `self`.
    pub fn dominates(self, other: Features) -> bool {
        self.intersect(other) == other
    }

    pub fn validate(self) -> Result<()> {
        if self.positions && !self.counts {
            return Err(Error::invalid_arg("features", "positions require counts"));
        }
        Ok(())
    }
}

impl std::fmt::Display for Features {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("pointers")?;
        if self.counts {
            f.write_str("+counts")?;
        }
        if self.positions {
            f.write_str("+positions")?;
        }
        if self.payloads {
            f.write_str("+payloads")?;
        }
        Ok(())
    }
}

/// How much of each occurrence the accumulator records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    Pointers,
    Counts,
    #[default]
    Positions,
    /// One payload per document under a single term, with no counts or positions.
    Payloads,
}

impl Completeness {
    pub fn features(self) -> Features {
        match self {
            Completeness::Pointers => Features::POINTERS,
            Completeness::Counts => Features::COUNTS,
            Completeness::Positions => Features::POSITIONS,
            Completeness::Payloads => Features::POINTERS.with_payloads(),
        }
    }
}

/// Physical organization of the posting stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLayout {
    /// Positions (and payloads) are written inline, after each document record.
    #[default]
    Interleaved,
    /// Positions are written to a separate stream. Requires positions and
    /// does not support payloads.
    HighPerformance,
}

/// Describes the payloads attached to postings. Two indices can be combined only
/// if their payload specs are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadSpec {
    /// Name of the payload type (e.g. `date`, `integer`).
    pub kind: String,
}

impl PayloadSpec {
    pub fn new(kind: impl Into<String>) -> PayloadSpec {
        PayloadSpec { kind: kind.into() }
    }

    pub fn is_compatible(&self, other: &PayloadSpec) -> bool {
        self.kind == other.kind
    }
}
