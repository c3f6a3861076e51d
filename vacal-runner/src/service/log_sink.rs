//! Job log sink
//!
//! Append-only writer for a job's log file. Every append is flushed before
//! it returns so readers tailing the file see output as soon as the script
//! produces it.
//!
//! File layout:
//! ```text
//! Task ID: <id>
//! Mode: <mode>
//! Command: <interpreter> <script> <flags...>
//! Parameters: <summary>
//! --------------------------------------------------------------------------------
//!
//! <script output>
//!
//! --------------------------------------------------------------------------------
//! STATUS: <outcome>
//! ```

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use vacal_core::domain::job::{JobFailure, JobId};
use vacal_core::domain::params::CalibrationParams;

const SEPARATOR_WIDTH: usize = 80;

/// Header block written when the log is created
#[derive(Debug, Clone)]
pub struct LogHeader<'a> {
    pub id: JobId,
    pub params: &'a CalibrationParams,
    pub command: String,
}

impl LogHeader<'_> {
    fn render(&self) -> String {
        format!(
            "Task ID: {}\nMode: {}\nCommand: {}\nParameters: {}\n{}\n\n",
            self.id,
            self.params.mode,
            self.command,
            self.params.summary(),
            separator()
        )
    }
}

/// Terminal status line for a finished job
///
/// `None` means the job succeeded. A script killed by a signal carries the
/// negated signal number as its exit code.
fn status_marker(failure: Option<&JobFailure>) -> String {
    match failure {
        None => "STATUS: SUCCESS".to_string(),
        Some(JobFailure::ExecutionFailed {
            exit_code: Some(code),
            ..
        }) => format!("STATUS: FAILED (exit code {})", code),
        Some(JobFailure::ExecutionFailed {
            exit_code: None, ..
        }) => "STATUS: FAILED (exit code unknown)".to_string(),
        Some(JobFailure::TimedOut { .. }) => "STATUS: TIMEOUT".to_string(),
        Some(JobFailure::Infrastructure { message }) => format!("STATUS: ERROR - {}", message),
    }
}

fn separator() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

/// Append-only writer bound to one job log
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    file: File,
}

impl LogSink {
    /// Creates the log file, creating the log directory if needed, and
    /// writes the header
    ///
    /// Fails if a log for this job already exists.
    pub async fn create(path: impl Into<PathBuf>, header: &LogHeader<'_>) -> io::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let mut sink = Self { path, file };
        sink.append(&header.render()).await?;
        Ok(sink)
    }

    /// Reopens an existing log for appending
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().append(true).open(&path).await?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a chunk and flushes it
    pub async fn append(&mut self, chunk: &str) -> io::Result<()> {
        self.file.write_all(chunk.as_bytes()).await?;
        self.file.flush().await
    }

    /// Writes the closing separator and terminal status line
    ///
    /// This is the last write a log ever receives.
    pub async fn finish(&mut self, failure: Option<&JobFailure>) -> io::Result<()> {
        let footer = format!("\n{}\n{}\n", separator(), status_marker(failure));
        self.append(&footer).await?;
        self.file.sync_data().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_markers() {
        assert_eq!(status_marker(None), "STATUS: SUCCESS");
        assert_eq!(
            status_marker(Some(&JobFailure::ExecutionFailed {
                exit_code: Some(3),
                output: String::new()
            })),
            "STATUS: FAILED (exit code 3)"
        );
        assert_eq!(
            status_marker(Some(&JobFailure::ExecutionFailed {
                exit_code: Some(-9),
                output: String::new()
            })),
            "STATUS: FAILED (exit code -9)"
        );
        assert_eq!(
            status_marker(Some(&JobFailure::TimedOut { timeout_secs: 600 })),
            "STATUS: TIMEOUT"
        );
        assert_eq!(
            status_marker(Some(&JobFailure::infrastructure("disk full"))),
            "STATUS: ERROR - disk full"
        );
    }

    #[tokio::test]
    async fn test_create_append_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("job.log");
        let id = Uuid::new_v4();
        let params = CalibrationParams::default();

        let mut sink = LogSink::create(
            &path,
            &LogHeader {
                id,
                params: &params,
                command: "Rscript scripts/complete_va_calibration.R --nsim=1000".to_string(),
            },
        )
        .await
        .unwrap();

        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with(&format!("Task ID: {}\nMode: full\n", id)));
        assert!(header.contains("Command: Rscript scripts/complete_va_calibration.R"));
        assert!(header.ends_with(&format!("{}\n\n", "-".repeat(80))));

        sink.append("line 1\n").await.unwrap();
        // Visible without closing the sink
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("line 1\n"));

        sink.finish(None).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with(&format!("line 1\n\n{}\nSTATUS: SUCCESS\n", "-".repeat(80))));
    }

    #[tokio::test]
    async fn test_create_refuses_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "existing\n").unwrap();
        let params = CalibrationParams::default();

        let err = LogSink::create(
            &path,
            &LogHeader {
                id: Uuid::new_v4(),
                params: &params,
                command: String::new(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing\n");
    }

    #[tokio::test]
    async fn test_open_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "header\n").unwrap();

        let mut sink = LogSink::open(&path).await.unwrap();
        sink.finish(Some(&JobFailure::infrastructure("interrupted")))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("header\n"));
        assert!(content.ends_with("STATUS: ERROR - interrupted\n"));
    }
}
