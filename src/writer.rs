//! Incremental, crash-tolerant output writing.
//!
//! The output file is rewritten once when the writer opens (input comments
//! first, then whatever rows the file already held) and then every batch is
//! appended and synced before the next one starts. A crash after batch *k*
//! leaves batches `1..=k` on disk and nothing of batch *k + 1*.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::models::Record;
use crate::store::{self, COMMENT_MARKER, StoreError};

/// Destination for processed batches.
pub trait RecordSink {
    /// Persists a batch. When this returns `Ok`, the batch must survive a
    /// crash of the process.
    fn append_batch(&mut self, records: &[Record]) -> Result<(), StoreError>;
}

/// Append-only file sink for processed records.
#[derive(Debug)]
pub struct IncrementalWriter {
    path: PathBuf,
    out: BufWriter<File>,
    existing_rows: usize,
    written_rows: usize,
}

impl IncrementalWriter {
    /// Opens `path` for incremental writing.
    ///
    /// A missing file is treated as empty. Comment lines already in the file
    /// are replaced by `comments`; its other lines are kept, in order, after
    /// them. The rewrite goes through a temporary file in the same directory,
    /// so the previous contents survive if it fails part way. The file keeps
    /// its permissions, and a symlinked output keeps pointing at its target.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the file cannot be read or replaced.
    pub fn open(path: &Path, comments: &[String]) -> Result<Self, StoreError> {
        // Rewrite the file a symlink points at rather than the link itself
        let target = match std::fs::canonicalize(path) {
            Ok(real) => real,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => path.to_path_buf(),
            Err(e) => return Err(e.into()),
        };

        let existing = match std::fs::read_to_string(&target) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let rows: Vec<&str> = existing
            .as_deref()
            .unwrap_or_default()
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.starts_with(COMMENT_MARKER) && !line.is_empty())
            .collect();

        let file = match &existing {
            Some(_) => rewrite(&target, comments, &rows)?,
            None => {
                let mut file = File::create(&target)?;
                store::write_comments(&mut file, comments)?;
                file.sync_all()?;
                file
            }
        };

        tracing::info!(
            "Opened {} with {} existing rows",
            path.display(),
            rows.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            existing_rows: rows.len(),
            written_rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows that were already in the file when it was opened.
    pub fn existing_rows(&self) -> usize {
        self.existing_rows
    }

    /// Rows appended through this writer.
    pub fn written_rows(&self) -> usize {
        self.written_rows
    }
}

/// Replaces `target` with `comments` followed by `rows`, keeping its
/// permissions, and returns the new file positioned at its end.
fn rewrite(target: &Path, comments: &[String], rows: &[&str]) -> Result<File, StoreError> {
    let permissions = std::fs::metadata(target)?.permissions();
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        store::write_comments(&mut out, comments)?;
        for row in rows {
            writeln!(out, "{row}")?;
        }
        out.flush()?;
    }
    tmp.as_file().set_permissions(permissions)?;
    tmp.as_file().sync_all()?;
    Ok(tmp.persist(target).map_err(|e| e.error)?)
}

impl RecordSink for IncrementalWriter {
    /// Appends a batch and makes it durable.
    ///
    /// Every record is validated first; if any is unwritable nothing from the
    /// batch reaches the file.
    fn append_batch(&mut self, records: &[Record]) -> Result<(), StoreError> {
        for record in records {
            store::validate_record(record)?;
        }
        for record in records {
            store::write_row(&mut self.out, record)?;
        }
        self.out.flush()?;
        self.out.get_ref().sync_data()?;
        self.written_rows += records.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> Record {
        Record::new(vec![id.to_string(), "Basic".to_string()], 0)
    }

    #[test]
    fn missing_output_is_created_with_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let writer = IncrementalWriter::open(&path, &["#html:true".to_string()]).unwrap();
        drop(writer);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#html:true\n");
    }

    #[test]
    fn existing_rows_are_kept_after_new_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "#old comment\nrow-1\tBasic\nrow-2\tBasic").unwrap();

        let mut writer = IncrementalWriter::open(&path, &["#separator:tab".to_string()]).unwrap();
        assert_eq!(writer.existing_rows(), 2);
        writer.append_batch(&[record("row-3")]).unwrap();
        drop(writer);

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "#separator:tab\nrow-1\tBasic\nrow-2\tBasic\nrow-3\tBasic\n"
        );
    }

    #[test]
    fn each_batch_is_on_disk_before_the_next() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let mut writer = IncrementalWriter::open(&path, &[]).unwrap();
        writer.append_batch(&[record("a"), record("b")]).unwrap();

        // Read while the writer is still open
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "a\tBasic\nb\tBasic\n"
        );
        assert_eq!(writer.written_rows(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "row-1\tBasic\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let writer = IncrementalWriter::open(&path, &["#html:true".to_string()]).unwrap();
        drop(writer);

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "#html:true\nrow-1\tBasic\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_output_stays_a_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.txt");
        let link = dir.path().join("link.txt");
        std::fs::write(&real, "row-1\tBasic\n").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let mut writer = IncrementalWriter::open(&link, &[]).unwrap();
        writer.append_batch(&[record("row-2")]).unwrap();
        drop(writer);

        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(
            std::fs::read_to_string(&real).unwrap(),
            "row-1\tBasic\nrow-2\tBasic\n"
        );
    }

    #[test]
    fn invalid_record_rejects_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let mut writer = IncrementalWriter::open(&path, &[]).unwrap();
        let bad = Record::new(vec!["x\ty".to_string()], 3);
        let err = writer.append_batch(&[record("ok"), bad]).unwrap_err();
        drop(writer);

        assert!(matches!(err, StoreError::InvalidFieldContent { source_index: 3, .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
