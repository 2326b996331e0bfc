//! Selection and partitioning of records into annotation batches.

use crate::models::{FieldSchema, Record};

/// Default number of records sent to the annotation service per request.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Prefix filter applied once to the loaded records, before batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFilter {
    /// Number of leading records to drop (resume offset).
    pub start_from: usize,
    /// Keep only records that carry no tags besides `ignored_tags`.
    pub only_unprocessed: bool,
    /// Tag values that do not count as "already tagged".
    pub ignored_tags: Vec<String>,
}

impl Default for BatchFilter {
    fn default() -> Self {
        Self {
            start_from: 0,
            only_unprocessed: true,
            ignored_tags: vec!["leech".to_string()],
        }
    }
}

impl BatchFilter {
    /// Applies the offset, then the unprocessed predicate.
    ///
    /// The offset counts records in the loaded deck, not records that
    /// survive the predicate, so a rerun with the same offset resumes at the
    /// same card regardless of which cards were already tagged.
    pub fn apply(&self, records: Vec<Record>, schema: &FieldSchema) -> Vec<Record> {
        records
            .into_iter()
            .skip(self.start_from)
            .filter(|record| {
                !self.only_unprocessed || record.is_unprocessed(schema, &self.ignored_tags)
            })
            .collect()
    }
}

/// Splits `records` into consecutive batches of at most `size` records.
///
/// Order is preserved and every record lands in exactly one batch; only
/// the last batch may be shorter than `size`. A `size` of zero is treated
/// as one.
pub fn make_batches(records: Vec<Record>, size: usize) -> Vec<Vec<Record>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(records.len().div_ceil(size));
    let mut iter = records.into_iter().peekable();

    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                let mut fields = vec![String::new(); 12];
                fields[3] = format!("front {i}");
                Record::new(fields, i)
            })
            .collect()
    }

    fn tagged(mut record: Record, tags: &str) -> Record {
        record.set_tags(&FieldSchema::default(), tags);
        record
    }

    #[test]
    fn batches_partition_in_order() {
        for (n, size) in [(0, 20), (1, 20), (20, 20), (21, 20), (45, 7), (5, 1)] {
            let batches = make_batches(records(n), size);

            assert_eq!(batches.len(), n.div_ceil(size), "n={n} size={size}");
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= size));

            let flat: Vec<usize> = batches
                .iter()
                .flatten()
                .map(Record::source_index)
                .collect();
            assert_eq!(flat, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn last_batch_may_be_short() {
        let batches = make_batches(records(45), 20);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
    }

    #[test]
    fn zero_size_does_not_loop_forever() {
        assert_eq!(make_batches(records(3), 0).len(), 3);
    }

    #[test]
    fn filter_skips_start_offset() {
        let filter = BatchFilter {
            start_from: 20,
            only_unprocessed: false,
            ignored_tags: Vec::new(),
        };
        let kept = filter.apply(records(25), &FieldSchema::default());

        assert_eq!(kept.len(), 5);
        assert_eq!(kept[0].source_index(), 20);
    }

    #[test]
    fn filter_keeps_only_unprocessed_records() {
        let mut input = records(4);
        input[1] = tagged(input[1].clone(), "ml");
        input[2] = tagged(input[2].clone(), "leech");

        let kept = BatchFilter::default().apply(input, &FieldSchema::default());
        let indexes: Vec<usize> = kept.iter().map(Record::source_index).collect();
        assert_eq!(indexes, vec![0, 2, 3]);
    }

    #[test]
    fn offset_counts_before_unprocessed_filter() {
        let mut input = records(4);
        input[0] = tagged(input[0].clone(), "ml");
        let filter = BatchFilter {
            start_from: 2,
            ..BatchFilter::default()
        };

        let kept = filter.apply(input, &FieldSchema::default());
        let indexes: Vec<usize> = kept.iter().map(Record::source_index).collect();
        assert_eq!(indexes, vec![2, 3]);
    }
}
