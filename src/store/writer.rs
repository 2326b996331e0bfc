use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::models::Record;

use super::{DELIMITER, StoreError};

/// Checks that no field of `record` would break the row format.
///
/// # Errors
///
/// Returns `StoreError::InvalidFieldContent` naming the first offending field.
pub fn validate_record(record: &Record) -> Result<(), StoreError> {
    let bad = record
        .fields()
        .iter()
        .position(|field| field.contains([DELIMITER, '\n', '\r']));

    match bad {
        Some(field) => Err(StoreError::InvalidFieldContent {
            source_index: record.source_index(),
            field,
        }),
        None => Ok(()),
    }
}

/// Writes comment lines verbatim, one per line.
///
/// # Errors
///
/// Returns any I/O error from the underlying writer.
pub fn write_comments<W: Write>(out: &mut W, comments: &[String]) -> std::io::Result<()> {
    for comment in comments {
        writeln!(out, "{comment}")?;
    }
    Ok(())
}

/// Writes one record as a tab-delimited row.
///
/// # Errors
///
/// Returns `StoreError::InvalidFieldContent` without writing anything if a
/// field contains the delimiter or a line break.
pub fn write_row<W: Write>(out: &mut W, record: &Record) -> Result<(), StoreError> {
    validate_record(record)?;

    let mut fields = record.fields().iter();
    if let Some(first) = fields.next() {
        out.write_all(first.as_bytes())?;
    }
    for field in fields {
        write!(out, "{DELIMITER}{field}")?;
    }
    out.write_all(b"\n")?;
    Ok(())
}

/// Saves comments and records to `path`, replacing the file atomically.
///
/// All records are validated before the file is touched.
///
/// # Errors
///
/// Returns `StoreError::InvalidFieldContent` if any record is unwritable,
/// or `StoreError::Io` on file system failure.
pub fn save(path: &Path, comments: &[String], records: &[Record]) -> Result<(), StoreError> {
    for record in records {
        validate_record(record)?;
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = std::io::BufWriter::new(tmp.as_file_mut());
        write_comments(&mut out, comments)?;
        for record in records {
            write_row(&mut out, record)?;
        }
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
