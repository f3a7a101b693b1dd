use lexis_common::{Result, verify_data};

use crate::features::Features;

/// One term's occurrence record in one document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Posting {
    /// Document pointer.
    pub pointer: u64,
    /// Number of occurrences of the term in the document, if recorded.
    pub count: Option<u32>,
    /// Strictly increasing occurrence positions, empty if not recorded.
    pub positions: Vec<u32>,
    /// Optional opaque payload.
    pub payload: Option<Vec<u8>>,
}

impl Posting {
    pub fn new(pointer: u64) -> Posting {
        Posting {
            pointer,
            ..Default::default()
        }
    }

    pub fn with_count(pointer: u64, count: u32) -> Posting {
        Posting {
            pointer,
            count: Some(count),
            ..Default::default()
        }
    }

    /// Creates a posting whose count is the number of positions.
    pub fn with_positions(pointer: u64, positions: Vec<u32>) -> Posting {
        Posting {
            pointer,
            count: Some(positions.len() as u32),
            positions,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Posting {
        self.payload = Some(payload);
        self
    }

    /// Last (largest) position, if any.
    pub fn max_position(&self) -> Option<u32> {
        self.positions.last().copied()
    }

    /// Checks the posting invariants for the given feature set: positions are
    /// strictly increasing, the count matches the number of positions, and every
    /// enabled component is present.
    pub fn validate(&self, features: Features) -> Result<()> {
        if features.counts {
            verify_data!(count, self.count.is_some_and(|c| c > 0));
        }
        if features.positions {
            verify_data!(
                positions,
                self.count == Some(self.positions.len() as u32)
            );
            verify_data!(positions, self.positions.windows(2).all(|w| w[0] < w[1]));
        }
        if features.payloads {
            verify_data!(payload, self.payload.is_some());
        }
        Ok(())
    }
}
