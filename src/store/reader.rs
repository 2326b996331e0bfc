use std::path::Path;

use crate::models::{FieldSchema, Record};

use super::{COMMENT_MARKER, DELIMITER, StoreError};

/// What to do with rows whose field count does not fit the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Drop the row and keep loading.
    #[default]
    Skip,
    /// Fail the whole load on the first malformed row.
    Abort,
}

/// The parsed contents of a card export.
#[derive(Debug, Default)]
pub struct Deck {
    /// Header comment lines, verbatim and without line terminators.
    pub comments: Vec<String>,
    /// Records in file order.
    pub records: Vec<Record>,
    /// Rows rejected during parsing, one `MalformedRecord` or
    /// `StrayCarriageReturn` per row.
    pub rejected: Vec<StoreError>,
}

impl Deck {
    /// Applies `policy` to the rejected rows.
    ///
    /// With [`MalformedPolicy::Abort`] the first rejected row becomes the
    /// error; with [`MalformedPolicy::Skip`] the deck is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns the first rejected row's error under the abort policy.
    pub fn apply_policy(mut self, policy: MalformedPolicy) -> Result<Self, StoreError> {
        if policy == MalformedPolicy::Abort && !self.rejected.is_empty() {
            return Err(self.rejected.swap_remove(0));
        }
        for rejected in &self.rejected {
            tracing::warn!("Skipping row: {rejected}");
        }
        Ok(self)
    }
}

/// Loads a card export from disk.
///
/// # Errors
///
/// Returns `StoreError::Io` if the file cannot be read. Malformed rows do
/// not fail the load; they are reported in [`Deck::rejected`].
pub fn load(path: &Path, schema: &FieldSchema) -> Result<Deck, StoreError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse(&content, schema))
}

/// Parses the text of a card export.
pub fn parse(content: &str, schema: &FieldSchema) -> Deck {
    let expected = schema.field_count();
    let mut deck = Deck::default();

    for (idx, line) in content.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.starts_with(COMMENT_MARKER) {
            deck.comments.push(line.to_string());
            continue;
        }
        if line.is_empty() {
            continue;
        }

        let fields: Vec<String> = line.split(DELIMITER).map(String::from).collect();
        if fields.len() < expected {
            deck.rejected.push(StoreError::MalformedRecord {
                line: idx + 1,
                expected,
                found: fields.len(),
            });
            continue;
        }
        if let Some(field) = fields.iter().position(|field| field.contains('\r')) {
            deck.rejected.push(StoreError::StrayCarriageReturn {
                line: idx + 1,
                field,
            });
            continue;
        }

        let source_index = deck.records.len();
        deck.records.push(Record::new(fields, source_index));
    }

    deck
}
