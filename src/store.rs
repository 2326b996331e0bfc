//! Reading and writing tab-delimited card exports.
//!
//! Lines starting with [`COMMENT_MARKER`] are header comments (Anki writes
//! `#separator:tab`, `#html:true` and friends). They are collected verbatim
//! and always written back before any record rows. Every other non-blank
//! line is one record whose fields are separated by [`DELIMITER`].

mod error;
mod reader;
mod writer;

pub use error::StoreError;
pub use reader::{Deck, MalformedPolicy, load, parse};
pub use writer::{save, validate_record, write_comments, write_row};

/// Marker character that starts a header comment line.
pub const COMMENT_MARKER: char = '#';

/// Field delimiter within a record row.
pub const DELIMITER: char = '\t';
