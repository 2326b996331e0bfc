use super::FieldSchema;

/// One card row from a tab-delimited export.
///
/// Fields are kept in their original order so that columns the pipeline
/// does not interpret are written back untouched. Only the tags field is
/// ever modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<String>,
    source_index: usize,
}

impl Record {
    /// Creates a record from its raw fields.
    ///
    /// `source_index` is the record's position among all records loaded
    /// from the input file; it is what `--start-from-card` counts.
    pub fn new(fields: Vec<String>, source_index: usize) -> Self {
        Self {
            fields,
            source_index,
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn source_index(&self) -> usize {
        self.source_index
    }

    fn field(&self, index: usize) -> &str {
        self.fields.get(index).map(String::as_str).unwrap_or("")
    }

    /// Returns the front text of the card.
    pub fn front(&self, schema: &FieldSchema) -> &str {
        self.field(schema.front)
    }

    /// Returns the back text of the card.
    pub fn back(&self, schema: &FieldSchema) -> &str {
        self.field(schema.back)
    }

    /// Returns the raw space-separated tags field.
    pub fn tags(&self, schema: &FieldSchema) -> &str {
        self.field(schema.tags)
    }

    /// Replaces the tags field, padding the row if it is too short.
    pub fn set_tags(&mut self, schema: &FieldSchema, tags: impl Into<String>) {
        if self.fields.len() <= schema.tags {
            self.fields.resize(schema.tags + 1, String::new());
        }
        self.fields[schema.tags] = tags.into();
    }

    /// Returns true if the record has no tags other than those in `ignored`.
    ///
    /// Tags such as `leech` are applied automatically by Anki and do not
    /// mean the card was ever tagged by hand.
    pub fn is_unprocessed(&self, schema: &FieldSchema, ignored: &[String]) -> bool {
        let tags = self.tags(schema).trim();
        tags.is_empty() || ignored.iter().any(|tag| tag == tags)
    }
}
