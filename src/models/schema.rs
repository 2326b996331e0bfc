/// Named field positions for a tab-delimited card export.
///
/// The default layout matches an Anki "Notes in Plain Text" export with
/// GUID, note type and deck columns enabled:
/// `guid, notetype, deck, front, back, ..., tags` with tags in column 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    pub guid: usize,
    pub notetype: usize,
    pub deck: usize,
    pub front: usize,
    pub back: usize,
    pub tags: usize,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            guid: 0,
            notetype: 1,
            deck: 2,
            front: 3,
            back: 4,
            tags: 11,
        }
    }
}

impl FieldSchema {
    /// Minimum number of fields a row must carry for every named position
    /// to be addressable. Rows may carry more; extra fields are kept as-is.
    #[must_use]
    pub fn field_count(&self) -> usize {
        [
            self.guid,
            self.notetype,
            self.deck,
            self.front,
            self.back,
            self.tags,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }

    /// Returns a copy with the front/back/tags positions replaced.
    #[must_use]
    pub fn with_card_fields(mut self, front: usize, back: usize, tags: usize) -> Self {
        self.front = front;
        self.back = back;
        self.tags = tags;
        self
    }
}
