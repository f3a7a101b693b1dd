use std::{cmp::Ordering, collections::BinaryHeap, fmt::Write as _, sync::Arc};

use lexis_common::{Result, error::Error, verify_arg};
use lexis_io::{COMBINE_BUFFER_SIZE, IndexStorage};

use crate::{
    combine::{
        CombinationUnit, CombineConfig, CombineStrategy, CombineStrategyKind, TermContext,
        UnitStreams, create_strategy,
    },
    components,
    features::{Features, IndexLayout, PayloadSpec},
    properties::{ClusterProperties, ClusterStrategy, IndexProperties},
    tables::{Coding, NumberTableReader, NumberTableWriter, TermListWriter},
    writer::{BitStreamIndexWriter, IndexWriter, WriterStatistics},
};

/// Outcome of a combine run.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineSummary {
    pub basename: String,
    pub strategy: CombineStrategyKind,
    /// Properties stored with the output index.
    pub properties: IndexProperties,
    /// Statistics of the posting writer, absent in metadata-only runs.
    pub statistics: Option<WriterStatistics>,
}

/// Input cursor in the term queue.
struct HeapEntry {
    term: String,
    input: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &HeapEntry) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &HeapEntry) -> Ordering {
        // The heap is a max-heap, but the smallest term (then the smallest
        // input) must be on top.
        (&self.term, self.input)
            .cmp(&(&other.term, other.input))
            .reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &HeapEntry) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Combines N sorted indices into one.
///
/// Construction performs every schema check and fails before any output stream
/// is created; [`Combiner::run`] then streams the inputs once.
pub struct Combiner {
    storage: Arc<dyn IndexStorage>,
    output: String,
    inputs: Vec<String>,
    properties: Vec<IndexProperties>,
    strategy: Box<dyn CombineStrategy>,
    config: CombineConfig,
    features: Features,
    layout: IndexLayout,
    payload: Option<PayloadSpec>,
    term_processor: String,
    field: Option<String>,
    with_occurrences: bool,
    with_sums_max_position: bool,
    with_sizes: bool,
}

impl Combiner {
    pub fn new(
        storage: Arc<dyn IndexStorage>,
        output: impl Into<String>,
        inputs: Vec<String>,
        kind: CombineStrategyKind,
        config: CombineConfig,
    ) -> Result<Combiner> {
        let output = output.into();
        config.validate()?;
        verify_arg!(inputs, !inputs.is_empty());
        if inputs.contains(&output) {
            return Err(Error::invalid_arg(
                "output",
                format!("{output} is also an input"),
            ));
        }

        let properties = inputs
            .iter()
            .map(|input| IndexProperties::load(storage.as_ref(), input))
            .collect::<Result<Vec<_>>>()?;
        let first = &properties[0];

        for (i, p) in properties.iter().enumerate().skip(1) {
            if p.term_processor != first.term_processor {
                return Err(Error::incompatible(format!(
                    "{} uses term processor '{}', {} uses '{}'",
                    inputs[i], p.term_processor, inputs[0], first.term_processor
                )));
            }
            let payloads_agree = match (&first.payload, &p.payload) {
                (None, None) => true,
                (Some(a), Some(b)) => a.is_compatible(b),
                _ => false,
            };
            if !payloads_agree {
                return Err(Error::incompatible(format!(
                    "payloads of {} ({:?}) and {} ({:?}) differ",
                    inputs[0], first.payload, inputs[i], p.payload
                )));
            }
            if p.field != first.field {
                log::warn!(
                    "field of {} ({:?}) differs from field of {} ({:?})",
                    inputs[i],
                    p.field,
                    inputs[0],
                    first.field
                );
            }
        }

        let available = properties
            .iter()
            .map(|p| p.features)
            .reduce(Features::intersect)
            .unwrap_or(Features::POINTERS);
        let features = config.features.unwrap_or(available);
        features.validate()?;
        if !available.dominates(features) {
            return Err(Error::invalid_arg(
                "features",
                format!("requested {features}, but the inputs only provide {available}"),
            ));
        }

        let strategy = create_strategy(kind, &properties);
        if features.payloads && !strategy.supports_payloads() {
            return Err(Error::invalid_arg(
                "features",
                format!("the {kind} strategy does not support payloads"),
            ));
        }

        let layout = match config.layout {
            IndexLayout::HighPerformance if features.payloads => {
                log::warn!("payloads force the interleaved layout for {output}");
                IndexLayout::Interleaved
            }
            IndexLayout::HighPerformance if !features.positions => {
                return Err(Error::invalid_arg(
                    "layout",
                    "the high-performance layout requires positions",
                ));
            }
            layout => layout,
        };

        let with_occurrences =
            all_inputs_have(storage.as_ref(), &inputs, components::OCCURRENCES, "occurrence");
        let with_sums_max_position = features.positions
            && all_inputs_have(
                storage.as_ref(),
                &inputs,
                components::SUMS_MAX_POSITION,
                "sum-of-max-position",
            );
        let with_sizes = all_inputs_have(storage.as_ref(), &inputs, components::SIZES, "size");
        if matches!(kind, CombineStrategyKind::Paste { incremental: true }) && !with_sizes {
            return Err(Error::invalid_arg(
                "inputs",
                "incremental paste requires a size table on every input",
            ));
        }

        let storage = storage
            .with_io_buffer(COMBINE_BUFFER_SIZE)
            .unwrap_or(storage);
        let payload = first.payload.clone().filter(|_| features.payloads);
        let term_processor = first.term_processor.clone();
        let field = first.field.clone();
        Ok(Combiner {
            payload,
            term_processor,
            field,
            storage,
            output,
            inputs,
            properties,
            strategy,
            config,
            features,
            layout,
            with_occurrences,
            with_sums_max_position,
            with_sizes,
        })
    }

    /// Prepares the combination of the batch set described by the cluster
    /// properties of `cluster`. The strategy recorded in the set is used unless
    /// `config` overrides it.
    pub fn from_cluster(
        storage: Arc<dyn IndexStorage>,
        output: impl Into<String>,
        cluster: &str,
        config: CombineConfig,
    ) -> Result<Combiner> {
        let record = ClusterProperties::load(storage.as_ref(), cluster)?;
        let kind = config
            .strategy
            .unwrap_or_else(|| CombineStrategyKind::from_cluster(&record.strategy));
        let combiner = Combiner::new(storage, output, record.local_indices, kind, config)?;

        if let ClusterStrategy::Concatenate { cut_points } = &record.strategy {
            let consistent = cut_points.len() == combiner.properties.len() + 1
                && cut_points.first() == Some(&0)
                && cut_points
                    .windows(2)
                    .zip(&combiner.properties)
                    .all(|(w, p)| w[1].checked_sub(w[0]) == Some(p.documents));
            if !consistent {
                return Err(Error::invalid_format_with(
                    components::name(cluster, components::CLUSTER_PROPERTIES),
                    "cut points do not match the batch document counts",
                ));
            }
        }
        Ok(combiner)
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn layout(&self) -> IndexLayout {
        self.layout
    }

    pub fn strategy(&self) -> CombineStrategyKind {
        self.strategy.kind()
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Writes the combined index.
    pub fn run(mut self) -> Result<CombineSummary> {
        let storage = Arc::clone(&self.storage);
        let storage = storage.as_ref();
        let output = self.output.clone();
        let kind = self.strategy.kind();
        let metadata_only = self.config.metadata_only;
        log::info!(
            "combining {} inputs into {output} ({kind}, {})",
            self.inputs.len(),
            self.features
        );

        let max_document_size = if self.with_sizes {
            self.combine_sizes()?
        } else {
            self.properties
                .iter()
                .map(|p| p.max_document_size)
                .max()
                .unwrap_or(0)
        };

        let streams = UnitStreams {
            postings: !metadata_only || self.strategy.needs_postings_for_metadata(),
            occurrences: self.with_occurrences,
            sums_max_position: self.with_sums_max_position,
        };
        let mut units = self
            .inputs
            .iter()
            .zip(&self.properties)
            .enumerate()
            .map(|(i, (input, p))| CombinationUnit::open(storage, i, input, p.clone(), streams))
            .collect::<Result<Vec<_>>>()?;

        let mut terms =
            TermListWriter::create(storage, components::name(&output, components::TERMS))?;
        let mut frequencies = NumberTableWriter::create(
            storage,
            components::name(&output, components::FREQUENCIES),
            Coding::Gamma,
        )?;
        let mut occurrences = self
            .with_occurrences
            .then(|| {
                NumberTableWriter::create(
                    storage,
                    components::name(&output, components::OCCURRENCES),
                    Coding::Gamma,
                )
            })
            .transpose()?;
        // With postings, the index writer derives the sums itself.
        let mut sums_max_position = (metadata_only
            && self.with_sums_max_position
            && !matches!(kind, CombineStrategyKind::Paste { .. }))
        .then(|| {
            NumberTableWriter::create(
                storage,
                components::name(&output, components::SUMS_MAX_POSITION),
                Coding::Delta,
            )
        })
        .transpose()?;
        let mut writer: Option<Box<dyn IndexWriter>> = if metadata_only {
            None
        } else {
            Some(Box::new(BitStreamIndexWriter::open(
                storage,
                &output,
                self.strategy.number_of_documents(),
                self.features,
                self.layout,
            )?))
        };

        let mut queue = BinaryHeap::with_capacity(units.len());
        for unit in units.iter_mut() {
            if let Some(term) = unit.advance()? {
                queue.push(HeapEntry {
                    term,
                    input: unit.index(),
                });
            }
        }

        let mut used = Vec::with_capacity(units.len());
        let mut term_count = 0u64;
        let mut postings = 0u64;
        while let Some(head) = queue.pop() {
            // Entries with equal terms pop in input order.
            used.clear();
            used.push(head.input);
            while queue.peek().is_some_and(|next| next.term == head.term) {
                if let Some(next) = queue.pop() {
                    used.push(next.input);
                }
            }

            let occurrence = self
                .with_occurrences
                .then(|| used.iter().filter_map(|&i| units[i].occurrence()).sum::<u64>());
            let sum_max_position: u64 = used
                .iter()
                .filter_map(|&i| units[i].sum_max_position())
                .sum();

            let frequency = self.strategy.combine(&mut TermContext {
                units: &mut units,
                used: &used,
                occurrence,
                writer: writer
                    .as_mut()
                    .map(|writer| writer.as_mut() as &mut dyn IndexWriter),
            })?;

            terms.write_term(&head.term)?;
            frequencies.push(frequency)?;
            if let (Some(table), Some(occurrence)) = (occurrences.as_mut(), occurrence) {
                table.push(occurrence)?;
            }
            if let Some(table) = sums_max_position.as_mut() {
                table.push(sum_max_position)?;
            }
            term_count += 1;
            postings += frequency;
            if term_count % self.config.log_interval == 0 {
                log::info!("{output}: {term_count} terms, {postings} postings combined");
            }

            for &i in &used {
                if let Some(term) = units[i].advance()? {
                    queue.push(HeapEntry { term, input: i });
                }
            }
        }

        terms.finish()?;
        frequencies.finish()?;
        if let Some(table) = occurrences {
            table.finish()?;
        }
        if let Some(table) = sums_max_position {
            table.finish()?;
        }
        let statistics = writer.map(|writer| writer.close()).transpose()?;

        let input_max_count = self.properties.iter().map(|p| p.max_count).max().unwrap_or(0);
        let properties = IndexProperties {
            documents: self.strategy.number_of_documents(),
            terms: term_count,
            postings,
            occurrences: self
                .properties
                .iter()
                .map(|p| p.occurrences)
                .sum::<Option<u64>>(),
            max_count: statistics
                .as_ref()
                .map_or(input_max_count, |s| s.max_count.max(input_max_count)),
            max_document_size,
            features: self.features,
            payload: self.payload.clone(),
            layout: self.layout,
            term_processor: self.term_processor.clone(),
            field: self.field.clone(),
            batches: self.inputs.len(),
        };
        properties.store(storage, &output)?;
        self.write_stats(&properties, statistics.as_ref())?;

        log::info!(
            "{output}: {} documents, {term_count} terms, {postings} postings from {} inputs",
            properties.documents,
            self.inputs.len()
        );
        Ok(CombineSummary {
            basename: self.output.clone(),
            strategy: kind,
            properties,
            statistics,
        })
    }

    fn combine_sizes(&mut self) -> Result<u32> {
        let storage = self.storage.as_ref();
        let mut inputs = self
            .inputs
            .iter()
            .zip(&self.properties)
            .map(|(input, p)| {
                NumberTableReader::open(
                    storage,
                    components::name(input, components::SIZES),
                    Coding::Gamma,
                    p.documents,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let name = components::name(&self.output, components::SIZES);
        let mut output = NumberTableWriter::create(storage, name.clone(), Coding::Gamma)?;
        let max = self.strategy.combine_sizes(&mut inputs, &mut output)?;
        output.finish()?;
        u32::try_from(max)
            .map_err(|_| Error::invalid_format_with(name, format!("document size {max} exceeds u32")))
    }

    fn write_stats(
        &self,
        properties: &IndexProperties,
        statistics: Option<&WriterStatistics>,
    ) -> Result<()> {
        let mut text = String::new();
        let _ = writeln!(text, "strategy={}", self.strategy.kind());
        let _ = writeln!(text, "inputs={}", self.inputs.len());
        let _ = writeln!(text, "documents={}", properties.documents);
        let _ = writeln!(text, "terms={}", properties.terms);
        let _ = writeln!(text, "postings={}", properties.postings);
        if let Some(occurrences) = properties.occurrences {
            let _ = writeln!(text, "occurrences={occurrences}");
        }
        if let Some(s) = statistics {
            let _ = writeln!(text, "index_bits={}", s.index_bits);
            let _ = writeln!(text, "position_bits={}", s.position_bits);
            let _ = writeln!(text, "offset_bits={}", s.offset_bits);
            if properties.postings > 0 {
                let _ = writeln!(
                    text,
                    "bits_per_posting={:.3}",
                    s.index_bits as f64 / properties.postings as f64
                );
            }
        }
        let name = components::name(&self.output, components::STATS);
        self.storage
            .write_all(&name, text.as_bytes())
            .map_err(|e| Error::io(name, e))
    }
}

/// Whether every input has the `extension` component. Warns when only some do.
fn all_inputs_have(
    storage: &dyn IndexStorage,
    inputs: &[String],
    extension: &str,
    what: &str,
) -> bool {
    let missing = inputs
        .iter()
        .filter(|input| !storage.exists(&components::name(input, extension)))
        .count();
    if missing != 0 && missing != inputs.len() {
        log::warn!(
            "{missing} of {} inputs have no {what} table; the output will not have one",
            inputs.len()
        );
    }
    missing == 0
}

#[cfg(test)]
mod tests {
    use lexis_io::InMemoryStorage;

    use super::*;
    use crate::{
        features::Completeness,
        posting::Posting,
        read::{read_inverted_lists, read_sizes},
        tables::write_gamma_table,
    };

    /// Writes a small index directly, bypassing the scanner.
    fn write_index(
        storage: &dyn IndexStorage,
        basename: &str,
        documents: u64,
        lists: &[(&str, Vec<Posting>)],
        sizes: &[u64],
    ) {
        let features = Completeness::Positions.features();
        let mut terms =
            TermListWriter::create(storage, components::name(basename, components::TERMS))
                .unwrap();
        let mut frequencies = NumberTableWriter::create(
            storage,
            components::name(basename, components::FREQUENCIES),
            Coding::Gamma,
        )
        .unwrap();
        let mut occurrences = NumberTableWriter::create(
            storage,
            components::name(basename, components::OCCURRENCES),
            Coding::Gamma,
        )
        .unwrap();
        let mut writer: Box<dyn IndexWriter> = Box::new(
            BitStreamIndexWriter::open(
                storage,
                basename,
                documents,
                features,
                IndexLayout::Interleaved,
            )
            .unwrap(),
        );
        let mut total = 0;
        let mut max_count = 0;
        for (term, postings) in lists {
            terms.write_term(term).unwrap();
            frequencies.push(postings.len() as u64).unwrap();
            let occurrence: u64 = postings.iter().map(|p| p.positions.len() as u64).sum();
            occurrences.push(occurrence).unwrap();
            total += occurrence;
            max_count = postings
                .iter()
                .filter_map(|p| p.count)
                .fold(max_count, u32::max);
            writer.write_inverted_list(postings).unwrap();
        }
        terms.finish().unwrap();
        frequencies.finish().unwrap();
        occurrences.finish().unwrap();
        let stats = writer.close().unwrap();
        write_gamma_table(
            storage,
            components::name(basename, components::SIZES),
            sizes.iter().copied(),
        )
        .unwrap();
        IndexProperties {
            documents,
            terms: lists.len() as u64,
            postings: stats.postings,
            occurrences: Some(total),
            max_count,
            max_document_size: sizes.iter().copied().max().unwrap_or(0) as u32,
            features,
            payload: None,
            layout: IndexLayout::Interleaved,
            term_processor: "identity".to_string(),
            field: None,
            batches: 1,
        }
        .store(storage, basename)
        .unwrap();
    }

    /// Writes a payload index: one list under `#`, with neither sizes nor
    /// occurrences.
    fn write_payload_index(
        storage: &dyn IndexStorage,
        basename: &str,
        documents: u64,
        payloads: &[(u64, &[u8])],
        kind: Option<&str>,
    ) {
        let features = Completeness::Payloads.features();
        let mut terms =
            TermListWriter::create(storage, components::name(basename, components::TERMS))
                .unwrap();
        let mut frequencies = NumberTableWriter::create(
            storage,
            components::name(basename, components::FREQUENCIES),
            Coding::Gamma,
        )
        .unwrap();
        let mut writer: Box<dyn IndexWriter> = Box::new(
            BitStreamIndexWriter::open(
                storage,
                basename,
                documents,
                features,
                IndexLayout::Interleaved,
            )
            .unwrap(),
        );
        let postings = payloads
            .iter()
            .map(|&(pointer, payload)| Posting::new(pointer).with_payload(payload.to_vec()))
            .collect::<Vec<_>>();
        terms.write_term("#").unwrap();
        frequencies.push(postings.len() as u64).unwrap();
        writer.write_inverted_list(&postings).unwrap();
        terms.finish().unwrap();
        frequencies.finish().unwrap();
        let stats = writer.close().unwrap();
        IndexProperties {
            documents,
            terms: 1,
            postings: stats.postings,
            occurrences: None,
            max_count: 0,
            max_document_size: 0,
            features,
            payload: kind.map(PayloadSpec::new),
            layout: IndexLayout::Interleaved,
            term_processor: "identity".to_string(),
            field: None,
            batches: 1,
        }
        .store(storage, basename)
        .unwrap();
    }

    fn cat_dog(storage: &dyn IndexStorage) {
        write_index(
            storage,
            "a",
            1,
            &[
                ("cat", vec![Posting::with_positions(0, vec![0])]),
                ("dog", vec![Posting::with_positions(0, vec![1])]),
            ],
            &[2],
        );
        write_index(
            storage,
            "b",
            1,
            &[("cat", vec![Posting::with_positions(0, vec![0])])],
            &[1],
        );
    }

    fn combiner(
        storage: &InMemoryStorage,
        kind: CombineStrategyKind,
        config: CombineConfig,
    ) -> Result<Combiner> {
        Combiner::new(
            Arc::new(storage.clone()),
            "out",
            vec!["a".to_string(), "b".to_string()],
            kind,
            config,
        )
    }

    #[test]
    fn test_heap_entry_order() {
        let mut queue = BinaryHeap::new();
        for (term, input) in [("b", 0), ("a", 2), ("a", 1), ("c", 0)] {
            queue.push(HeapEntry {
                term: term.to_string(),
                input,
            });
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|e| (e.term, e.input))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 1),
                ("a".to_string(), 2),
                ("b".to_string(), 0),
                ("c".to_string(), 0)
            ]
        );
    }

    #[test]
    fn test_concatenate() {
        let storage = InMemoryStorage::new();
        cat_dog(&storage);
        let summary = combiner(&storage, CombineStrategyKind::Concatenate, Default::default())
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.properties.documents, 2);
        assert_eq!(summary.properties.terms, 2);
        assert_eq!(summary.properties.postings, 3);
        assert_eq!(summary.properties.occurrences, Some(3));
        assert_eq!(summary.properties.batches, 2);

        let lists = read_inverted_lists(&storage, "out").unwrap();
        assert_eq!(lists[0].0, "cat");
        assert_eq!(
            lists[0].1,
            vec![
                Posting::with_positions(0, vec![0]),
                Posting::with_positions(1, vec![0])
            ]
        );
        assert_eq!(lists[1].0, "dog");
        assert_eq!(lists[1].1, vec![Posting::with_positions(0, vec![1])]);
        assert_eq!(read_sizes(&storage, "out").unwrap(), vec![2, 1]);

        let stats = storage.read_to_string("out.stats").unwrap();
        assert!(stats.contains("terms=2"));
        assert!(stats.contains("index_bits="));
    }

    #[test]
    fn test_merge_duplicate_document() {
        let storage = InMemoryStorage::new();
        cat_dog(&storage);
        let err = combiner(&storage, CombineStrategyKind::Merge, Default::default())
            .unwrap()
            .run()
            .unwrap_err();
        assert!(err.is_duplicate_document());
    }

    #[test]
    fn test_merge_duplicate_posting_without_sizes() {
        let storage = InMemoryStorage::new();
        write_index(
            &storage,
            "a",
            1,
            &[("cat", vec![Posting::with_positions(0, vec![0])])],
            &[1],
        );
        write_index(
            &storage,
            "b",
            1,
            &[("cat", vec![Posting::with_positions(0, vec![0])])],
            &[1],
        );
        storage.delete("b.sizes").unwrap();
        let err = combiner(&storage, CombineStrategyKind::Merge, Default::default())
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            lexis_common::error::ErrorKind::DuplicateDocument {
                document: 0,
                first_input: 0,
                second_input: 1
            }
        ));
        assert!(!storage.exists("out.sizes"));
    }

    #[test]
    fn test_merge_disjoint() {
        let storage = InMemoryStorage::new();
        write_index(
            &storage,
            "a",
            3,
            &[("x", vec![Posting::with_positions(0, vec![0, 2])])],
            &[3, 0, 0],
        );
        write_index(
            &storage,
            "b",
            3,
            &[
                ("x", vec![Posting::with_positions(2, vec![1])]),
                ("y", vec![Posting::with_positions(2, vec![0])]),
            ],
            &[0, 0, 2],
        );
        let summary = combiner(&storage, CombineStrategyKind::Merge, Default::default())
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.properties.documents, 3);
        assert_eq!(summary.properties.max_count, 2);
        let lists = read_inverted_lists(&storage, "out").unwrap();
        assert_eq!(
            lists[0].1,
            vec![
                Posting::with_positions(0, vec![0, 2]),
                Posting::with_positions(2, vec![1])
            ]
        );
        assert_eq!(read_sizes(&storage, "out").unwrap(), vec![3, 0, 2]);
    }

    #[test]
    fn test_paste_fuses_documents() {
        let storage = InMemoryStorage::new();
        write_index(
            &storage,
            "a",
            2,
            &[("x", vec![Posting::with_positions(1, vec![0])])],
            &[0, 4],
        );
        write_index(
            &storage,
            "b",
            2,
            &[("x", vec![Posting::with_positions(1, vec![6, 8])])],
            &[0, 9],
        );
        let summary = combiner(
            &storage,
            CombineStrategyKind::Paste { incremental: false },
            Default::default(),
        )
        .unwrap()
        .run()
        .unwrap();
        assert_eq!(summary.properties.postings, 1);
        let lists = read_inverted_lists(&storage, "out").unwrap();
        assert_eq!(lists[0].1, vec![Posting::with_positions(1, vec![0, 6, 8])]);
        assert_eq!(read_sizes(&storage, "out").unwrap(), vec![0, 9]);
    }

    #[test]
    fn test_incremental_paste() {
        let storage = InMemoryStorage::new();
        write_index(
            &storage,
            "a",
            1,
            &[("x", vec![Posting::with_positions(0, vec![1])])],
            &[3],
        );
        write_index(
            &storage,
            "b",
            1,
            &[("x", vec![Posting::with_positions(0, vec![0])])],
            &[2],
        );
        combiner(
            &storage,
            CombineStrategyKind::Paste { incremental: true },
            Default::default(),
        )
        .unwrap()
        .run()
        .unwrap();
        let lists = read_inverted_lists(&storage, "out").unwrap();
        assert_eq!(lists[0].1, vec![Posting::with_positions(0, vec![1, 3])]);
        assert_eq!(read_sizes(&storage, "out").unwrap(), vec![5]);
    }

    #[test]
    fn test_preflight_term_processor() {
        let storage = InMemoryStorage::new();
        cat_dog(&storage);
        let mut properties = IndexProperties::load(&storage, "b").unwrap();
        properties.term_processor = "downcase".to_string();
        properties.store(&storage, "b").unwrap();

        let err = combiner(&storage, CombineStrategyKind::Concatenate, Default::default())
            .err()
            .unwrap();
        assert!(matches!(
            err.kind(),
            lexis_common::error::ErrorKind::IncompatibleInputs { .. }
        ));
        assert!(!storage.exists("out.terms"));
    }

    #[test]
    fn test_preflight_features() {
        let storage = InMemoryStorage::new();
        cat_dog(&storage);
        let config = CombineConfig {
            features: Some(Features::POSITIONS.with_payloads()),
            ..Default::default()
        };
        assert!(combiner(&storage, CombineStrategyKind::Concatenate, config).is_err());

        let config = CombineConfig {
            features: Some(Features::POINTERS),
            layout: IndexLayout::HighPerformance,
            ..Default::default()
        };
        assert!(combiner(&storage, CombineStrategyKind::Concatenate, config).is_err());
    }

    #[test]
    fn test_concatenate_payloads() {
        let storage = InMemoryStorage::new();
        write_payload_index(&storage, "a", 2, &[(0, b"x"), (1, b"")], Some("bytes"));
        write_payload_index(&storage, "b", 1, &[(0, b"z")], Some("bytes"));
        let summary = combiner(&storage, CombineStrategyKind::Concatenate, Default::default())
            .unwrap()
            .run()
            .unwrap();
        assert!(summary.properties.features.payloads);
        assert_eq!(summary.properties.payload, Some(PayloadSpec::new("bytes")));
        assert_eq!(summary.properties.occurrences, None);
        assert_eq!(summary.properties.documents, 3);
        assert!(!storage.exists("out.sizes"));
        assert!(!storage.exists("out.occurrences"));

        let lists = read_inverted_lists(&storage, "out").unwrap();
        assert_eq!(
            lists,
            vec![(
                "#".to_string(),
                vec![
                    Posting::new(0).with_payload(b"x".to_vec()),
                    Posting::new(1).with_payload(Vec::new()),
                    Posting::new(2).with_payload(b"z".to_vec()),
                ]
            )]
        );
    }

    #[test]
    fn test_merge_payloads() {
        let storage = InMemoryStorage::new();
        write_payload_index(&storage, "a", 4, &[(1, b"b"), (3, b"d")], Some("bytes"));
        write_payload_index(&storage, "b", 3, &[(0, b"a"), (2, b"c")], Some("bytes"));
        let summary = combiner(&storage, CombineStrategyKind::Merge, Default::default())
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.properties.documents, 4);
        assert_eq!(summary.properties.postings, 4);
        let lists = read_inverted_lists(&storage, "out").unwrap();
        let merged = lists[0]
            .1
            .iter()
            .map(|p| (p.pointer, p.payload.clone().unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(
            merged,
            vec![
                (0, b"a".to_vec()),
                (1, b"b".to_vec()),
                (2, b"c".to_vec()),
                (3, b"d".to_vec()),
            ]
        );

        // Without sizes, a payload on both sides is the only evidence of a duplicate.
        write_payload_index(&storage, "b", 3, &[(1, b"again")], Some("bytes"));
        let err = Combiner::new(
            Arc::new(storage.clone()),
            "out2",
            vec!["a".to_string(), "b".to_string()],
            CombineStrategyKind::Merge,
            Default::default(),
        )
        .unwrap()
        .run()
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            lexis_common::error::ErrorKind::DuplicateDocument { document: 1, .. }
        ));
    }

    #[test]
    fn test_paste_rejects_payloads() {
        let storage = InMemoryStorage::new();
        write_payload_index(&storage, "a", 2, &[(0, b"x")], Some("bytes"));
        write_payload_index(&storage, "b", 2, &[(1, b"y")], Some("bytes"));
        let kind = CombineStrategyKind::Paste { incremental: false };
        assert!(combiner(&storage, kind, Default::default()).is_err());

        let config = CombineConfig {
            features: Some(Features::POINTERS),
            ..Default::default()
        };
        let summary = combiner(&storage, kind, config).unwrap().run().unwrap();
        assert_eq!(summary.properties.payload, None);
    }

    #[test]
    fn test_preflight_payload_schemas() {
        let storage = InMemoryStorage::new();
        write_payload_index(&storage, "a", 1, &[(0, b"x")], Some("integer"));
        write_payload_index(&storage, "b", 1, &[(0, b"y")], None);
        let err = combiner(&storage, CombineStrategyKind::Concatenate, Default::default())
            .err()
            .unwrap();
        assert!(matches!(
            err.kind(),
            lexis_common::error::ErrorKind::IncompatibleInputs { .. }
        ));

        write_payload_index(&storage, "b", 1, &[(0, b"y")], Some("date"));
        let err = combiner(&storage, CombineStrategyKind::Concatenate, Default::default())
            .err()
            .unwrap();
        assert!(matches!(
            err.kind(),
            lexis_common::error::ErrorKind::IncompatibleInputs { .. }
        ));
        assert!(!storage.names().iter().any(|name| name.starts_with("out.")));
    }

    #[test]
    fn test_reduced_features() {
        let storage = InMemoryStorage::new();
        cat_dog(&storage);
        let config = CombineConfig {
            features: Some(Features::COUNTS),
            ..Default::default()
        };
        let summary = combiner(&storage, CombineStrategyKind::Concatenate, config)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.properties.features, Features::COUNTS);
        let lists = read_inverted_lists(&storage, "out").unwrap();
        assert_eq!(
            lists[0].1,
            vec![Posting::with_count(0, 1), Posting::with_count(1, 1)]
        );
    }

    #[test]
    fn test_high_performance_layout() {
        let storage = InMemoryStorage::new();
        cat_dog(&storage);
        let config = CombineConfig {
            layout: IndexLayout::HighPerformance,
            ..Default::default()
        };
        combiner(&storage, CombineStrategyKind::Concatenate, config)
            .unwrap()
            .run()
            .unwrap();
        assert!(storage.exists("out.positions"));
        let lists = read_inverted_lists(&storage, "out").unwrap();
        assert_eq!(lists[1].1, vec![Posting::with_positions(0, vec![1])]);
    }

    #[test]
    fn test_metadata_only() {
        let storage = InMemoryStorage::new();
        cat_dog(&storage);
        let config = CombineConfig {
            metadata_only: true,
            ..Default::default()
        };
        let summary = combiner(&storage, CombineStrategyKind::Concatenate, config)
            .unwrap()
            .run()
            .unwrap();
        assert!(summary.statistics.is_none());
        assert!(!storage.exists("out.index"));
        assert_eq!(
            crate::tables::read_terms(&storage, "out.terms".to_string()).unwrap(),
            vec!["cat", "dog"]
        );
        assert_eq!(
            crate::tables::read_table(&storage, "out.frequencies".to_string(), Coding::Gamma, 2)
                .unwrap(),
            vec![2, 1]
        );
        assert_eq!(
            crate::tables::read_table(&storage, "out.sumsmaxpos".to_string(), Coding::Delta, 2)
                .unwrap(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_partial_occurrences() {
        let storage = InMemoryStorage::new();
        cat_dog(&storage);
        storage.delete("b.occurrences").unwrap();
        let summary = combiner(&storage, CombineStrategyKind::Concatenate, Default::default())
            .unwrap()
            .run()
            .unwrap();
        assert!(!storage.exists("out.occurrences"));
        assert_eq!(summary.properties.terms, 2);
    }

    #[test]
    fn test_incremental_paste_requires_sizes() {
        let storage = InMemoryStorage::new();
        cat_dog(&storage);
        storage.delete("a.sizes").unwrap();
        assert!(
            combiner(
                &storage,
                CombineStrategyKind::Paste { incremental: true },
                Default::default()
            )
            .is_err()
        );
    }

    #[test]
    fn test_from_cluster_checks_cut_points() {
        let storage = InMemoryStorage::new();
        cat_dog(&storage);
        let mut record = ClusterProperties {
            local_indices: vec!["a".to_string(), "b".to_string()],
            strategy: ClusterStrategy::Concatenate {
                cut_points: vec![0, 1, 2],
            },
            documents: 2,
            terms: None,
            postings: 3,
            occurrences: Some(3),
            max_count: 1,
            max_document_size: 2,
            features: Features::POSITIONS,
            payload: None,
            term_processor: "identity".to_string(),
            field: None,
        };
        record.store(&storage, "set").unwrap();
        let combiner =
            Combiner::from_cluster(Arc::new(storage.clone()), "out", "set", Default::default())
                .unwrap();
        assert_eq!(combiner.strategy(), CombineStrategyKind::Concatenate);

        record.strategy = ClusterStrategy::Concatenate {
            cut_points: vec![0, 2, 3],
        };
        record.store(&storage, "set").unwrap();
        assert!(
            Combiner::from_cluster(Arc::new(storage.clone()), "out", "set", Default::default())
                .is_err()
        );
    }
}
