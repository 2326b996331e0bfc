use std::collections::HashMap;

use crate::models::{FieldSchema, Record};

use super::ParsedAnnotation;

/// Outcome of matching a reply back to its batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    /// Tag text per record, in batch order. Always as long as the batch;
    /// empty for records the reply did not mention.
    pub tags: Vec<String>,
    /// Records with no matching reply line.
    pub unmatched_records: usize,
    /// Reply lines that were not used for any record, including repeated
    /// echoes of a front that was already matched.
    pub unmatched_entries: usize,
}

impl Alignment {
    /// True when the reply and the batch did not line up one-to-one.
    pub fn is_low_confidence(&self) -> bool {
        self.unmatched_records > 0 || self.unmatched_entries > 0
    }
}

/// Matches parsed reply lines to the records of a batch.
///
/// Each record takes the tag text of the first entry whose trimmed front key
/// equals the record's trimmed front text (case-sensitive). Reply order is
/// irrelevant. Records sharing the same front text all receive the tags of
/// that same first entry.
pub fn align(batch: &[Record], parsed: &[ParsedAnnotation], schema: &FieldSchema) -> Alignment {
    let mut first_by_front: HashMap<&str, usize> = HashMap::with_capacity(parsed.len());
    for (idx, entry) in parsed.iter().enumerate() {
        first_by_front.entry(entry.front_key.trim()).or_insert(idx);
    }

    let mut used = vec![false; parsed.len()];
    let mut unmatched_records = 0;

    let tags = batch
        .iter()
        .map(|record| match first_by_front.get(record.front(schema).trim()) {
            Some(&idx) => {
                used[idx] = true;
                parsed[idx].tag_text.clone()
            }
            None => {
                unmatched_records += 1;
                String::new()
            }
        })
        .collect();

    Alignment {
        tags,
        unmatched_records,
        unmatched_entries: used.iter().filter(|&&u| !u).count(),
    }
}
