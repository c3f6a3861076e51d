//! Log tailing
//!
//! Readers of a job log either take a snapshot of what has been written so
//! far, or follow the log until the job reaches a terminal state. Each
//! follower holds its own file position, so any number of them can read the
//! same log without affecting each other or the writer.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use vacal_core::domain::job::JobId;

use crate::config::RunnerConfig;
use crate::repository::JobStore;

/// Stream of log chunks in file order
pub type LogStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("log file for job {0} not found")]
    NotFound(JobId),

    #[error("failed to read log file: {0}")]
    Io(#[from] io::Error),
}

/// Opens job logs for reading
#[derive(Clone)]
pub struct LogTailer {
    config: Arc<RunnerConfig>,
    store: Arc<dyn JobStore>,
    shutdown: CancellationToken,
}

impl LogTailer {
    pub fn new(
        config: Arc<RunnerConfig>,
        store: Arc<dyn JobStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            shutdown,
        }
    }

    /// Reads the whole log as it stands now
    pub async fn snapshot(&self, id: JobId) -> Result<Vec<u8>, TailError> {
        let path = self.config.log_path(id);
        tokio::fs::read(&path).await.map_err(|e| not_found_or(id, e))
    }

    /// Follows a log from the beginning until its job is terminal
    ///
    /// Once the job is terminal one more read picks up anything written
    /// between the last poll and the status change, then the stream ends.
    /// Since the status line is written before the state changes, the last
    /// chunk always ends with it. Following also stops on shutdown.
    pub async fn follow(&self, id: JobId) -> Result<LogStream, TailError> {
        let path = self.config.log_path(id);
        let file = File::open(&path).await.map_err(|e| not_found_or(id, e))?;

        debug!("Following log for job {}", id);

        let state = FollowState {
            id,
            path,
            file,
            store: self.store.clone(),
            poll_interval: self.config.poll_interval,
            shutdown: self.shutdown.clone(),
            done: false,
        };

        Ok(stream::unfold(state, |mut state| async move {
            match state.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), state)),
                Ok(None) => None,
                Err(e) => {
                    state.done = true;
                    Some((Err(e), state))
                }
            }
        })
        .boxed())
    }
}

struct FollowState {
    id: JobId,
    path: PathBuf,
    file: File,
    store: Arc<dyn JobStore>,
    poll_interval: Duration,
    shutdown: CancellationToken,
    done: bool,
}

impl FollowState {
    /// Next non-empty chunk, or `None` once the follower is finished
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if self.done {
                return Ok(None);
            }

            let chunk = self.read_available().await?;
            if !chunk.is_empty() {
                return Ok(Some(chunk));
            }

            let finished = self
                .store
                .get(self.id)
                .await
                .map_err(io::Error::other)?
                .is_none_or(|record| record.state.is_terminal());

            if finished {
                self.done = true;
                let rest = self.read_available().await?;
                debug!("Log for job {} ({}) complete", self.id, self.path.display());
                return Ok((!rest.is_empty()).then_some(rest));
            }

            let cancelled = tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => false,
                _ = self.shutdown.cancelled() => true,
            };
            if cancelled {
                debug!("Stopped following log for job {} on shutdown", self.id);
                self.done = true;
            }
        }
    }

    async fn read_available(&mut self) -> io::Result<Bytes> {
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

fn not_found_or(id: JobId, e: io::Error) -> TailError {
    if e.kind() == io::ErrorKind::NotFound {
        TailError::NotFound(id)
    } else {
        TailError::Io(e)
    }
}
