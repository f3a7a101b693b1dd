use lexis_common::{Result, error::Error};
use lexis_io::IndexStorage;

use crate::{
    components,
    features::{IndexLayout, PayloadSpec},
    properties::IndexProperties,
    scan::accumulator::FrozenBatch,
    tables::{Coding, NumberTableWriter, TermListWriter, write_gamma_table},
    writer::{BitStreamIndexWriter, IndexWriter},
};

/// Figures of one written batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub basename: String,
    pub documents: u64,
    pub scanned_documents: u64,
    pub terms: u64,
    pub postings: u64,
    pub occurrences: u64,
    pub max_count: u32,
    pub max_document_size: u32,
}

/// Serializes frozen accumulators as self-contained batches.
pub struct BatchWriter<'a> {
    storage: &'a dyn IndexStorage,
    term_processor: String,
    field: Option<String>,
    payload: Option<PayloadSpec>,
}

impl<'a> BatchWriter<'a> {
    pub fn new(
        storage: &'a dyn IndexStorage,
        term_processor: String,
        field: Option<String>,
    ) -> BatchWriter<'a> {
        BatchWriter {
            storage,
            term_processor,
            field,
            payload: None,
        }
    }

    /// Sets the payload type recorded in the properties of payload batches.
    pub fn with_payload(mut self, payload: Option<PayloadSpec>) -> BatchWriter<'a> {
        self.payload = payload;
        self
    }

    /// Writes `batch` under `basename`: term list, posting stream, frequency,
    /// occurrence and size tables, and properties. Payload batches have neither
    /// occurrences nor sizes.
    pub fn write(&self, basename: &str, batch: FrozenBatch) -> Result<BatchSummary> {
        let storage = self.storage;
        let payload = match (batch.features.payloads, &self.payload) {
            (true, Some(spec)) => Some(spec.clone()),
            (true, None) => {
                return Err(Error::invalid_operation("payload batch without a payload type"));
            }
            (false, _) => None,
        };
        let with_occurrences = payload.is_none();
        let mut terms =
            TermListWriter::create(storage, components::name(basename, components::TERMS))?;
        let mut frequencies = NumberTableWriter::create(
            storage,
            components::name(basename, components::FREQUENCIES),
            Coding::Gamma,
        )?;
        let mut occurrences = if with_occurrences {
            Some(NumberTableWriter::create(
                storage,
                components::name(basename, components::OCCURRENCES),
                Coding::Gamma,
            )?)
        } else {
            None
        };
        let mut writer: Box<dyn IndexWriter> = Box::new(BitStreamIndexWriter::open(
            storage,
            basename,
            batch.documents,
            batch.features,
            IndexLayout::Interleaved,
        )?);

        for list in batch.inverted_lists() {
            let (term, postings, occurrence) = list?;
            terms.write_term(term)?;
            frequencies.push(postings.len() as u64)?;
            if let Some(occurrences) = occurrences.as_mut() {
                occurrences.push(occurrence)?;
            }
            writer.write_inverted_list(&postings)?;
        }

        let term_count = terms.finish()?;
        frequencies.finish()?;
        if let Some(occurrences) = occurrences {
            occurrences.finish()?;
        }
        let stats = writer.close()?;
        if with_occurrences {
            write_gamma_table(
                storage,
                components::name(basename, components::SIZES),
                batch.sizes.iter().map(|&size| size as u64),
            )?;
        }

        let properties = IndexProperties {
            documents: batch.documents,
            terms: term_count,
            postings: stats.postings,
            occurrences: with_occurrences.then_some(batch.occurrences),
            max_count: batch.max_count(),
            max_document_size: batch.max_document_size(),
            features: batch.features,
            payload,
            layout: IndexLayout::Interleaved,
            term_processor: self.term_processor.clone(),
            field: self.field.clone(),
            batches: 1,
        };
        properties.store(storage, basename)?;

        log::info!(
            "batch {basename}: {} documents, {term_count} terms, {} postings, {} occurrences",
            batch.scanned_documents,
            stats.postings,
            batch.occurrences
        );

        Ok(BatchSummary {
            basename: basename.to_string(),
            documents: batch.documents,
            scanned_documents: batch.scanned_documents,
            terms: term_count,
            postings: stats.postings,
            occurrences: batch.occurrences,
            max_count: properties.max_count,
            max_document_size: properties.max_document_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use lexis_budget_tracker::Budget;
    use lexis_io::InMemoryStorage;

    use super::*;
    use crate::{
        features::Completeness,
        posting::Posting,
        read::{read_inverted_lists, read_sizes},
        scan::accumulator::{AccumulatorMode, TermAccumulator},
        tables::read_table,
    };

    #[test]
    fn test_write_batch() {
        let storage = InMemoryStorage::new();
        let mut acc = TermAccumulator::new(
            AccumulatorMode::Standard,
            Completeness::Positions,
            Budget::unlimited(),
        )
        .unwrap();
        for (pointer, text) in ["cat dog cat", "dog"].iter().enumerate() {
            for (position, token) in text.split(' ').enumerate() {
                acc.add_occurrence(token, pointer as u64, position as u32)
                    .unwrap();
            }
            acc.record_document_size(pointer as u64, text.split(' ').count() as u32)
                .unwrap();
            acc.end_document().unwrap();
        }
        let batch = acc.freeze().unwrap();
        let summary = BatchWriter::new(&storage, "identity".into(), Some("body".into()))
            .write("b@0", batch)
            .unwrap();
        assert_eq!(summary.terms, 2);
        assert_eq!(summary.postings, 3);
        assert_eq!(summary.occurrences, 4);
        assert_eq!(summary.max_count, 2);
        assert_eq!(summary.max_document_size, 3);

        let lists = read_inverted_lists(&storage, "b@0").unwrap();
        assert_eq!(lists[0].0, "cat");
        assert_eq!(lists[0].1, vec![Posting::with_positions(0, vec![0, 2])]);
        assert_eq!(lists[1].0, "dog");
        assert_eq!(lists[1].1.len(), 2);
        assert_eq!(read_sizes(&storage, "b@0").unwrap(), vec![3, 1]);
        assert_eq!(
            read_table(&storage, "b@0.occurrences".into(), Coding::Gamma, 2).unwrap(),
            vec![2, 2]
        );

        let properties = IndexProperties::load(&storage, "b@0").unwrap();
        assert_eq!(properties.field.as_deref(), Some("body"));
        assert_eq!(properties.occurrences, Some(4));
    }

    #[test]
    fn test_write_payload_batch() {
        let storage = InMemoryStorage::new();
        let mut acc = TermAccumulator::new(
            AccumulatorMode::Remapped,
            Completeness::Payloads,
            Budget::unlimited(),
        )
        .unwrap();
        for (pointer, payload) in [(3u64, &b"c"[..]), (1, b"a")] {
            acc.add_payload(pointer, payload).unwrap();
            acc.record_document_size(pointer, 0).unwrap();
            acc.end_document().unwrap();
        }
        let writer = BatchWriter::new(&storage, "identity".into(), None);
        let batch = acc.freeze().unwrap();
        assert!(writer.write("p@0", batch).is_err());

        acc.add_payload(1, b"a").unwrap();
        acc.record_document_size(1, 0).unwrap();
        acc.end_document().unwrap();
        acc.add_payload(3, b"c").unwrap();
        acc.record_document_size(3, 0).unwrap();
        acc.end_document().unwrap();
        let summary = writer
            .with_payload(Some(PayloadSpec::new("bytes")))
            .write("p@1", acc.freeze().unwrap())
            .unwrap();
        assert_eq!(summary.terms, 1);
        assert_eq!(summary.documents, 4);
        assert_eq!(summary.occurrences, 0);

        assert!(!storage.exists("p@1.occurrences"));
        assert!(!storage.exists("p@1.sizes"));
        let lists = read_inverted_lists(&storage, "p@1").unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].0, "#");
        assert_eq!(
            lists[0].1,
            vec![
                Posting::new(1).with_payload(b"a".to_vec()),
                Posting::new(3).with_payload(b"c".to_vec()),
            ]
        );
        let properties = IndexProperties::load(&storage, "p@1").unwrap();
        assert_eq!(properties.payload, Some(PayloadSpec::new("bytes")));
        assert_eq!(properties.occurrences, None);
        assert!(properties.features.payloads);
    }

    #[test]
    fn test_write_empty_batch() {
        let storage = InMemoryStorage::new();
        let mut acc = TermAccumulator::new(
            AccumulatorMode::Standard,
            Completeness::Counts,
            Budget::unlimited(),
        )
        .unwrap();
        let summary = BatchWriter::new(&storage, "identity".into(), None)
            .write("e@0", acc.freeze().unwrap())
            .unwrap();
        assert_eq!(summary.terms, 0);
        assert_eq!(summary.documents, 0);
        assert!(read_inverted_lists(&storage, "e@0").unwrap().is_empty());
    }
}
