use std::collections::HashSet;

use crate::models::{FieldSchema, Record};

/// Unions two space-separated tag strings.
///
/// Existing tags come first in their original order, followed by new tags
/// not already present. Empty tokens and duplicates are dropped, so merging
/// the same `new_tags` again is a no-op.
///
/// # Examples
///
/// ```
/// use ankitag::annotator::merge_tags;
///
/// assert_eq!(merge_tags("leech", "ml gen"), "leech ml gen");
/// assert_eq!(merge_tags("leech ml gen", "ml gen"), "leech ml gen");
/// ```
#[must_use]
pub fn merge_tags(existing: &str, new_tags: &str) -> String {
    let mut seen = HashSet::new();
    existing
        .split_whitespace()
        .chain(new_tags.split_whitespace())
        .filter(|tag| seen.insert(*tag))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merges `new_tags` into the tags field of `record`.
pub fn merge_into(record: &mut Record, schema: &FieldSchema, new_tags: &str) {
    let merged = merge_tags(record.tags(schema), new_tags);
    record.set_tags(schema, merged);
}
