//! Metadata records stored next to indices and batch sets.

use lexis_common::{Result, error::Error};
use lexis_io::IndexStorage;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    components,
    features::{Features, IndexLayout, PayloadSpec},
};

/// Global figures and schema of an index or a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexProperties {
    /// Size of the document pointer space (pointers are below this value).
    pub documents: u64,
    /// Number of distinct terms.
    pub terms: u64,
    /// Number of postings (sum of the frequencies).
    pub postings: u64,
    /// Total number of occurrences, if known.
    pub occurrences: Option<u64>,
    /// Maximum count of a single posting.
    pub max_count: u32,
    /// Maximum document size, in tokens.
    pub max_document_size: u32,
    pub features: Features,
    #[serde(default)]
    pub payload: Option<PayloadSpec>,
    #[serde(default)]
    pub layout: IndexLayout,
    /// Descriptor of the term processor used to build the index.
    pub term_processor: String,
    #[serde(default)]
    pub field: Option<String>,
    /// Number of batches (or inputs) the index was built from.
    #[serde(default = "default_batches")]
    pub batches: usize,
}

fn default_batches() -> usize {
    1
}

impl IndexProperties {
    pub fn load(storage: &dyn IndexStorage, basename: &str) -> Result<IndexProperties> {
        load_json(storage, &components::name(basename, components::PROPERTIES))
    }

    pub fn store(&self, storage: &dyn IndexStorage, basename: &str) -> Result<()> {
        store_json(
            storage,
            &components::name(basename, components::PROPERTIES),
            self,
        )
    }
}

/// How the batches of a set relate to each other, and therefore how they must be
/// combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusterStrategy {
    /// Disjoint, contiguous document ranges. `cut_points[i]` is the first global
    /// pointer of batch `i`, and the last element is the total document count.
    Concatenate { cut_points: Vec<u64> },
    /// Disjoint documents sharing one global numbering.
    Merge,
    /// Shared global numbering where a document may span several batches.
    Paste,
}

/// Describes a set of batches so that it can be treated as one logical index, and
/// carries the global figures of the scan that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProperties {
    /// Basenames of the batches, in order.
    pub local_indices: Vec<String>,
    pub strategy: ClusterStrategy,
    /// Number of documents of the whole set.
    pub documents: u64,
    /// Number of distinct terms, unknown until the set is combined.
    pub terms: Option<u64>,
    /// Number of postings over all batches.
    pub postings: u64,
    pub occurrences: Option<u64>,
    pub max_count: u32,
    pub max_document_size: u32,
    pub features: Features,
    #[serde(default)]
    pub payload: Option<PayloadSpec>,
    pub term_processor: String,
    #[serde(default)]
    pub field: Option<String>,
}

impl ClusterProperties {
    pub fn load(storage: &dyn IndexStorage, basename: &str) -> Result<ClusterProperties> {
        load_json(
            storage,
            &components::name(basename, components::CLUSTER_PROPERTIES),
        )
    }

    pub fn store(&self, storage: &dyn IndexStorage, basename: &str) -> Result<()> {
        store_json(
            storage,
            &components::name(basename, components::CLUSTER_PROPERTIES),
            self,
        )
    }
}

fn load_json<T: DeserializeOwned>(storage: &dyn IndexStorage, name: &str) -> Result<T> {
    let text = storage
        .read_to_string(name)
        .map_err(|e| Error::io(name, e))?;
    serde_json::from_str(&text).map_err(|e| Error::serialization(name, e))
}

fn store_json<T: Serialize>(storage: &dyn IndexStorage, name: &str, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    storage
        .write_all(name, &data)
        .map_err(|e| Error::io(name, e))
}
