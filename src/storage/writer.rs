//! Timestamped delimited-text recording files.
//!
//! A recording is one flat run of delimiter-separated numbers: values within
//! a sample and successive samples are separated by the same delimiter. The
//! single trailing delimiter left by the last append is removed on `finish`.

use crate::core::sample::Sample;
use crate::storage::{SampleStore, WriterError};
use chrono::{Local, NaiveDateTime};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Separator between values and between appended rows.
pub const DELIMITER: u8 = b',';

/// File name format, minus the extension.
pub const FILE_STEM_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// Recording file extension.
pub const FILE_EXTENSION: &str = "csv";

/// Owns at most one open recording file.
pub struct FileWriter {
    output_dir: PathBuf,
    file: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
}

impl FileWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file: None,
            current_path: None,
        }
    }

    /// Create the output directory if needed and open a new recording file
    /// named from the current local time.
    ///
    /// Names have one-second resolution. Starting again within the same
    /// second continues the existing file after a delimiter.
    pub fn start(&mut self) -> Result<PathBuf, WriterError> {
        if self.file.is_some() {
            return Err(WriterError::AlreadyOpen);
        }

        ensure_dir(&self.output_dir)?;

        let name = format!("{}.{FILE_EXTENSION}", Local::now().format(FILE_STEM_FORMAT));
        let path = self.output_dir.join(name);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| WriterError::Io(format!("{}: {e}", path.display())))?;
        let existing = file
            .metadata()
            .map_err(|e| WriterError::Io(format!("{}: {e}", path.display())))?
            .len();

        let mut file = BufWriter::new(file);
        // A file from earlier in the same second had its trailing delimiter
        // stripped; restore it so the next value starts a new token.
        if existing > 0 {
            file.write_all(&[DELIMITER]).map_err(|e| WriterError::Io(e.to_string()))?;
        }

        tracing::info!(path = %path.display(), existing, "Recording file opened");
        self.file = Some(file);
        self.current_path = Some(path.clone());
        Ok(path)
    }

    /// Append samples as delimited text, each value followed by the delimiter.
    pub fn append(&mut self, rows: &[Sample]) -> Result<(), WriterError> {
        let file = self.file.as_mut().ok_or(WriterError::NotOpen)?;
        let delimiter = DELIMITER as char;

        for row in rows {
            for value in &row.channels {
                write!(file, "{value}{delimiter}").map_err(|e| WriterError::Io(e.to_string()))?;
            }
        }
        file.flush().map_err(|e| WriterError::Io(e.to_string()))?;
        Ok(())
    }

    /// Strip the trailing delimiter and close the file.
    ///
    /// An empty file is closed untouched. Fails with `NotOpen` if no file is
    /// open, including on a second call.
    pub fn finish(&mut self) -> Result<PathBuf, WriterError> {
        let writer = self.file.take().ok_or(WriterError::NotOpen)?;
        let path = self.current_path.take().unwrap_or_default();

        let mut file = writer
            .into_inner()
            .map_err(|e| WriterError::Io(e.error().to_string()))?;
        trim_trailing_delimiter(&mut file).map_err(|e| WriterError::Io(e.to_string()))?;
        file.sync_all().map_err(|e| WriterError::Io(e.to_string()))?;

        tracing::info!(path = %path.display(), "Recording file finalized");
        Ok(path)
    }

    /// Remove the newest recording in the output directory.
    ///
    /// Returns the removed path, or `None` if there was nothing to remove.
    pub fn delete_latest(&self) -> Result<Option<PathBuf>, WriterError> {
        let Some(latest) = list_recordings(&self.output_dir)?.pop() else {
            return Ok(None);
        };

        std::fs::remove_file(&latest)
            .map_err(|e| WriterError::Io(format!("{}: {e}", latest.display())))?;
        tracing::info!(path = %latest.display(), "Deleted recording");
        Ok(Some(latest))
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }
}

impl SampleStore for FileWriter {
    fn append(&mut self, rows: Vec<Sample>) -> Result<(), WriterError> {
        FileWriter::append(self, &rows)
    }

    fn finish(&mut self) -> Result<(), WriterError> {
        FileWriter::finish(self).map(|_| ())
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.finish() {
                tracing::warn!("Could not finalize recording on drop: {e}");
            }
        }
    }
}

/// Create `dir` recursively. An existing directory is fine; anything else,
/// including an existing non-directory at that path, is an error.
pub fn ensure_dir(dir: &Path) -> Result<(), WriterError> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(WriterError::CreateDir(format!("{}: {e}", dir.display()))),
    }
}

/// Recording files in `dir`, sorted by name (oldest first).
///
/// A missing directory has no recordings.
pub fn list_recordings(dir: &Path) -> Result<Vec<PathBuf>, WriterError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(WriterError::Io(format!("{}: {e}", dir.display()))),
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_recording_name(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Whether `path` is named like a recording file.
pub fn is_recording_name(path: &Path) -> bool {
    let has_extension = path
        .extension()
        .map(|e| e == FILE_EXTENSION)
        .unwrap_or(false);

    has_extension
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| NaiveDateTime::parse_from_str(s, FILE_STEM_FORMAT).is_ok())
            .unwrap_or(false)
}

fn trim_trailing_delimiter(file: &mut File) -> std::io::Result<()> {
    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(());
    }

    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] == DELIMITER {
        file.set_len(len - 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rows(values: &[f64]) -> Vec<Sample> {
        values.iter().map(|v| Sample::new(vec![*v, v + 0.5])).collect()
    }

    #[test]
    fn test_start_creates_directory_and_timestamped_file() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("nested").join("data");

        let mut writer = FileWriter::new(&output);
        let path = writer.start().unwrap();

        assert!(output.is_dir());
        assert!(path.is_file());
        assert!(is_recording_name(&path));
        assert_eq!(writer.current_path(), Some(path.as_path()));
        writer.finish().unwrap();
    }

    #[test]
    fn test_append_and_finish_leave_no_trailing_delimiter() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::new(dir.path());
        writer.start().unwrap();

        writer.append(&rows(&[1.0, 2.0])).unwrap();
        writer.append(&rows(&[3.0])).unwrap();
        let path = writer.finish().unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "1,1.5,2,2.5,3,3.5");
        assert!(!writer.is_open());
    }

    #[test]
    fn test_restart_in_same_file_keeps_tokens_separate() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::new(dir.path());

        // Retry until both starts land in the same second
        let path = loop {
            let first = writer.start().unwrap();
            writer.append(&rows(&[1.0])).unwrap();
            writer.finish().unwrap();

            let second = writer.start().unwrap();
            writer.append(&rows(&[3.0])).unwrap();
            writer.finish().unwrap();

            if first == second {
                break second;
            }
            std::fs::remove_file(first).unwrap();
            std::fs::remove_file(second).unwrap();
        };

        assert_eq!(std::fs::read_to_string(path).unwrap(), "1,1.5,3,3.5");
    }

    #[test]
    fn test_restart_without_appends_leaves_file_unchanged() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::new(dir.path());

        let path = loop {
            let first = writer.start().unwrap();
            writer.append(&rows(&[2.0])).unwrap();
            writer.finish().unwrap();

            let second = writer.start().unwrap();
            writer.finish().unwrap();

            if first == second {
                break second;
            }
            std::fs::remove_file(first).unwrap();
            std::fs::remove_file(second).unwrap();
        };

        assert_eq!(std::fs::read_to_string(path).unwrap(), "2,2.5");
    }

    #[test]
    fn test_finish_twice_is_an_error() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::new(dir.path());
        writer.start().unwrap();

        writer.finish().unwrap();
        assert_eq!(writer.finish().unwrap_err(), WriterError::NotOpen);
    }

    #[test]
    fn test_finish_without_start_is_an_error() {
        let mut writer = FileWriter::new("unused");
        assert_eq!(writer.finish().unwrap_err(), WriterError::NotOpen);
        assert_eq!(writer.append(&rows(&[1.0])).unwrap_err(), WriterError::NotOpen);
    }

    #[test]
    fn test_finish_on_empty_file_keeps_it_empty() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::new(dir.path());
        writer.start().unwrap();

        let path = writer.finish().unwrap();
        assert_eq!(std::fs::metadata(path).unwrap().len(), 0);
    }

    #[test]
    fn test_drop_finalizes_open_file() {
        let dir = tempdir().unwrap();
        let path = {
            let mut writer = FileWriter::new(dir.path());
            let path = writer.start().unwrap();
            writer.append(&rows(&[4.0])).unwrap();
            path
        };

        assert_eq!(std::fs::read_to_string(path).unwrap(), "4,4.5");
    }

    #[test]
    fn test_start_twice_is_an_error() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::new(dir.path());
        writer.start().unwrap();
        assert_eq!(writer.start().unwrap_err(), WriterError::AlreadyOpen);
    }

    #[test]
    fn test_start_fails_when_output_path_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("data");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut writer = FileWriter::new(&blocker);
        assert!(matches!(writer.start(), Err(WriterError::CreateDir(_))));
    }

    #[test]
    fn test_delete_latest_removes_newest_name_only() {
        let dir = tempdir().unwrap();
        for name in [
            "2024-01-01_10_00_00.csv",
            "2024-03-05_09_30_00.csv",
            "2024-02-01_23_59_59.csv",
            "notes.csv",
            "2099-01-01_00_00_00.txt",
        ] {
            std::fs::write(dir.path().join(name), "1").unwrap();
        }

        let writer = FileWriter::new(dir.path());
        let removed = writer.delete_latest().unwrap().unwrap();
        assert_eq!(removed.file_name().unwrap(), "2024-03-05_09_30_00.csv");

        let remaining = list_recordings(dir.path()).unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(dir.path().join("notes.csv").exists());
        assert!(dir.path().join("2099-01-01_00_00_00.txt").exists());
    }

    #[test]
    fn test_delete_latest_on_empty_directory_is_noop() {
        let dir = tempdir().unwrap();
        let writer = FileWriter::new(dir.path());
        assert!(writer.delete_latest().unwrap().is_none());

        let missing = FileWriter::new(dir.path().join("missing"));
        assert!(missing.delete_latest().unwrap().is_none());
    }
}
