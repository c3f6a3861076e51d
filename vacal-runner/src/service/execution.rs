//! Execution service
//!
//! Runs one calibration job end to end:
//! - Launching the calibration script with the job's flags
//! - Streaming its combined stdout/stderr into the job log as it is produced
//! - Enforcing the wall-clock timeout
//! - Writing the terminal status line, then recording the outcome
//!
//! Every failure kind is absorbed here and turned into a terminal job state;
//! nothing escapes to other jobs or to the dispatcher.

use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vacal_core::domain::job::{JobFailure, JobId, JobOutput, JobTransition};
use vacal_core::domain::params::CalibrationParams;
use vacal_core::sentinel::extract_result;

use crate::config::RunnerConfig;
use crate::repository::{JobStore, StoreError};
use crate::service::log_sink::LogSink;

/// Output lines buffered between the pipe reader and the log writer
const CHUNK_CHANNEL_CAPACITY: usize = 256;

/// Fully resolved invocation of a calibration script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    /// Script path followed by the parameter flags
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn for_params(config: &RunnerConfig, params: &CalibrationParams) -> Self {
        let mut args = vec![config.script_path(params.mode).display().to_string()];
        args.extend(params.command_args());
        Self {
            program: config.interpreter.clone(),
            args,
        }
    }

    /// Space-joined form used in the log header
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Executes calibration jobs and records their outcome
pub struct ProcessRunner {
    config: Arc<RunnerConfig>,
    store: Arc<dyn JobStore>,
}

impl ProcessRunner {
    pub fn new(config: Arc<RunnerConfig>, store: Arc<dyn JobStore>) -> Self {
        Self { config, store }
    }

    /// Runs a pending job to completion
    ///
    /// The log receives its terminal status line before the record reaches a
    /// terminal state. The outcome is returned to the caller as well as
    /// recorded.
    pub async fn run(
        &self,
        id: JobId,
        params: &CalibrationParams,
        mut sink: LogSink,
    ) -> Result<JobOutput, JobFailure> {
        match self.store.set_state(id, JobTransition::Start).await {
            Ok(_) => {}
            Err(StoreError::InvalidTransition(e)) => {
                // Someone else owns this job; leave its log and record alone
                warn!("Refusing to run job {}: {}", id, e);
                return Err(JobFailure::infrastructure(e.to_string()));
            }
            Err(e) => {
                let failure =
                    JobFailure::infrastructure(format!("failed to mark job as running: {}", e));
                return self.finalize(id, &mut sink, Err(failure)).await;
            }
        }

        info!("Starting job {} (mode: {})", id, params.mode);

        let outcome = self.execute(id, params, &mut sink).await;
        self.finalize(id, &mut sink, outcome).await
    }

    /// Closes the log and records a terminal failure for a job that will not
    /// run (or stopped running) outside the normal execution path
    pub async fn abort(&self, id: JobId, message: impl Into<String>) {
        let failure = JobFailure::infrastructure(message);
        match LogSink::open(self.config.log_path(id)).await {
            Ok(mut sink) => {
                let _ = self.finalize(id, &mut sink, Err(failure)).await;
            }
            Err(e) => {
                error!("Failed to reopen log for job {}: {}", id, e);
                self.record(id, Err(failure)).await;
            }
        }
    }

    async fn execute(
        &self,
        id: JobId,
        params: &CalibrationParams,
        sink: &mut LogSink,
    ) -> Result<JobOutput, JobFailure> {
        let command = CommandLine::for_params(&self.config, params);
        let timeout = self.config.timeout_for(params.mode);

        debug!("Launching job {}: {}", id, command.display());

        // stdout and stderr share one pipe so the log keeps the order the
        // script wrote them in
        let (reader, writer) = os_pipe::pipe().map_err(|e| {
            JobFailure::infrastructure(format!("failed to create output pipe: {}", e))
        })?;
        let stderr_writer = writer.try_clone().map_err(|e| {
            JobFailure::infrastructure(format!("failed to create output pipe: {}", e))
        })?;

        // Dropping the command after spawn closes the parent's write ends
        let mut child = {
            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args)
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(stderr_writer)
                .kill_on_drop(true);
            cmd.spawn().map_err(|e| {
                JobFailure::infrastructure(format!(
                    "failed to launch {}: {}",
                    command.program.display(),
                    e
                ))
            })?
        };

        let (tx, mut rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || pump_lines(reader, tx));

        let mut output = String::new();
        let streamed = async {
            while let Some(chunk) = rx.recv().await {
                let chunk: String = chunk.map_err(|e| {
                    JobFailure::infrastructure(format!("failed to read process output: {}", e))
                })?;
                sink.append(&chunk).await.map_err(|e| {
                    JobFailure::infrastructure(format!("failed to write log file: {}", e))
                })?;
                output.push_str(&chunk);
            }

            child.wait().await.map_err(|e| {
                JobFailure::infrastructure(format!("failed to wait for process: {}", e))
            })
        };

        let timed: Result<Result<ExitStatus, JobFailure>, _> =
            tokio::time::timeout(timeout, streamed).await;

        let status = match timed {
            Ok(Ok(status)) => status,
            Ok(Err(failure)) => {
                terminate(id, &mut child).await;
                return Err(failure);
            }
            Err(_) => {
                warn!("Job {} exceeded its timeout of {:?}", id, timeout);
                drain_buffered(id, &mut rx, sink).await;
                terminate(id, &mut child).await;
                return Err(JobFailure::TimedOut {
                    timeout_secs: whole_secs_rounded_up(timeout),
                });
            }
        };

        if status.success() {
            let result_data = extract_result(&output);
            if result_data.is_some() {
                info!("Parsed structured results for job {}", id);
            }
            Ok(JobOutput {
                output,
                log_file: sink.path().display().to_string(),
                result_data,
            })
        } else {
            Err(JobFailure::ExecutionFailed {
                exit_code: exit_code(status),
                output,
            })
        }
    }

    /// Writes the terminal status line, then records the outcome
    async fn finalize(
        &self,
        id: JobId,
        sink: &mut LogSink,
        outcome: Result<JobOutput, JobFailure>,
    ) -> Result<JobOutput, JobFailure> {
        let outcome = match sink.finish(outcome.as_ref().err()).await {
            Ok(()) => outcome,
            Err(e) => {
                error!("Failed to finalize log for job {}: {}", id, e);
                match outcome {
                    Ok(_) => Err(JobFailure::infrastructure(format!(
                        "failed to finalize log file: {}",
                        e
                    ))),
                    failed => failed,
                }
            }
        };

        match &outcome {
            Ok(_) => info!("Job {} completed successfully", id),
            Err(failure) => error!("Job {} failed: {}", id, failure),
        }

        self.record(id, outcome.clone()).await;
        outcome
    }

    async fn record(&self, id: JobId, outcome: Result<JobOutput, JobFailure>) {
        let transition = match outcome {
            Ok(output) => JobTransition::Succeed(output),
            Err(failure) => JobTransition::Fail(failure),
        };

        if let Err(e) = self.store.set_state(id, transition).await {
            error!("Failed to record outcome of job {}: {}", id, e);
        }
    }
}

/// Forwards a pipe line by line until it closes
///
/// Runs on a blocking thread. Lines keep their trailing newline; invalid
/// UTF-8 is replaced rather than dropped.
fn pump_lines<R: Read>(reader: R, tx: mpsc::Sender<io::Result<String>>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.blocking_send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
}

/// Logs lines already read from the pipe but not yet written when the run
/// was cut short
async fn drain_buffered(
    id: JobId,
    rx: &mut mpsc::Receiver<io::Result<String>>,
    sink: &mut LogSink,
) {
    while let Ok(Ok(chunk)) = rx.try_recv() {
        if let Err(e) = sink.append(&chunk).await {
            warn!("Failed to write buffered output for job {}: {}", id, e);
            break;
        }
    }
}

/// Exit code of a finished script, with signals reported as their negated
/// number
#[cfg(unix)]
fn exit_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|signal| -signal))
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code()
}

fn whole_secs_rounded_up(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

async fn terminate(id: JobId, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to kill process for job {}: {}", id, e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap process for job {}: {}", id, e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::repository::InMemoryJobStore;
    use crate::service::log_sink::LogHeader;
    use uuid::Uuid;
    use vacal_core::domain::job::{JobRecord, JobState};
    use vacal_core::domain::params::CalibrationMode;

    struct Harness {
        _dir: tempfile::TempDir,
        config: Arc<RunnerConfig>,
        store: Arc<InMemoryJobStore>,
        runner: ProcessRunner,
    }

    /// Uses /bin/sh as the interpreter and `script` as the full-mode script
    fn harness(script: &str, timeout: Duration) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("scripts");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join(CalibrationMode::Full.script_name()), script).unwrap();

        let mut config = RunnerConfig::new(scripts, dir.path().join("logs"));
        config.interpreter = PathBuf::from("/bin/sh");
        config.job_timeout = timeout;
        let config = Arc::new(config);

        let store = Arc::new(InMemoryJobStore::new());
        let runner = ProcessRunner::new(config.clone(), store.clone());

        Harness {
            _dir: dir,
            config,
            store,
            runner,
        }
    }

    async fn pending_job(h: &Harness) -> (JobId, CalibrationParams, LogSink) {
        let id = Uuid::new_v4();
        let params = CalibrationParams::default();
        h.store
            .create(JobRecord::pending(id, params.clone()))
            .await
            .unwrap();
        let sink = LogSink::create(
            h.config.log_path(id),
            &LogHeader {
                id,
                params: &params,
                command: CommandLine::for_params(&h.config, &params).display(),
            },
        )
        .await
        .unwrap();
        (id, params, sink)
    }

    fn read_log(h: &Harness, id: JobId) -> String {
        std::fs::read_to_string(h.config.log_path(id)).unwrap()
    }

    #[test]
    fn test_command_line_for_params() {
        let mut config = RunnerConfig::new("scripts", "logs");
        config.interpreter = PathBuf::from("Rscript");
        let params = CalibrationParams {
            mode: CalibrationMode::CalibrationOnly,
            calib_data_path: Some("prep.rds".to_string()),
            ..Default::default()
        };

        let command = CommandLine::for_params(&config, &params);
        assert_eq!(command.program, PathBuf::from("Rscript"));
        assert_eq!(command.args[0], "scripts/calibration_only.R");
        assert_eq!(command.args[1], "--calib_data=prep.rds");
        assert!(
            command
                .display()
                .starts_with("Rscript scripts/calibration_only.R --calib_data=prep.rds")
        );
    }

    #[tokio::test]
    async fn test_success_streams_output_and_extracts_result() {
        let h = harness(
            "echo \"args: $1\"\n\
             echo 'warning on stderr' >&2\n\
             echo ___JSON_RESULT_START___\n\
             echo '{\"csmf\": [0.5, 0.5]}'\n\
             echo ___JSON_RESULT_END___\n",
            Duration::from_secs(10),
        );
        let (id, params, sink) = pending_job(&h).await;

        let output = h.runner.run(id, &params, sink).await.unwrap();

        assert!(output.output.contains("args: --country=Mozambique\n"));
        assert!(output.output.contains("warning on stderr\n"));
        assert_eq!(
            output.result_data,
            Some(serde_json::json!({"csmf": [0.5, 0.5]}))
        );

        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Succeeded);
        assert_eq!(record.result, Some(output.clone()));

        let log = read_log(&h, id);
        assert!(log.starts_with(&format!("Task ID: {}\n", id)));
        assert!(log.contains("args: --country=Mozambique\n"));
        assert!(log.ends_with("STATUS: SUCCESS\n"));
    }

    #[tokio::test]
    async fn test_success_without_result_block() {
        let h = harness("echo plain output\n", Duration::from_secs(10));
        let (id, params, sink) = pending_job(&h).await;

        let output = h.runner.run(id, &params, sink).await.unwrap();
        assert_eq!(output.output, "plain output\n");
        assert_eq!(output.result_data, None);
    }

    #[tokio::test]
    async fn test_malformed_result_block_still_succeeds() {
        let h = harness(
            "echo ___JSON_RESULT_START___\necho '{broken'\necho ___JSON_RESULT_END___\n",
            Duration::from_secs(10),
        );
        let (id, params, sink) = pending_job(&h).await;

        let output = h.runner.run(id, &params, sink).await.unwrap();
        assert_eq!(output.result_data, None);
        assert_eq!(
            h.store.get(id).await.unwrap().unwrap().state,
            JobState::Succeeded
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed() {
        let h = harness("echo 'Error in library(openVA)'\nexit 3\n", Duration::from_secs(10));
        let (id, params, sink) = pending_job(&h).await;

        let failure = h.runner.run(id, &params, sink).await.unwrap_err();
        assert_eq!(
            failure,
            JobFailure::ExecutionFailed {
                exit_code: Some(3),
                output: "Error in library(openVA)\n".to_string(),
            }
        );

        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.error, Some(failure));

        let log = read_log(&h, id);
        assert!(log.contains("Error in library(openVA)\n"));
        assert!(log.ends_with("STATUS: FAILED (exit code 3)\n"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let h = harness("echo started\nexec sleep 30\n", Duration::from_millis(300));
        let (id, params, sink) = pending_job(&h).await;

        let started = std::time::Instant::now();
        let failure = h.runner.run(id, &params, sink).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(failure, JobFailure::TimedOut { timeout_secs: 1 });
        assert_eq!(
            h.store.get(id).await.unwrap().unwrap().state,
            JobState::TimedOut
        );

        let log = read_log(&h, id);
        assert!(log.contains("started\n"));
        assert!(log.ends_with("STATUS: TIMEOUT\n"));
    }

    #[tokio::test]
    async fn test_stdout_and_stderr_keep_write_order() {
        let h = harness(
            "i=0\n\
             while [ $i -lt 200 ]; do\n\
               if [ $((i % 2)) -eq 0 ]; then echo L$i; else echo L$i >&2; fi\n\
               i=$((i + 1))\n\
             done\n",
            Duration::from_secs(10),
        );
        let (id, params, sink) = pending_job(&h).await;

        let output = h.runner.run(id, &params, sink).await.unwrap();

        let expected: String = (0..200).map(|i| format!("L{}\n", i)).collect();
        assert_eq!(output.output, expected);
        assert!(read_log(&h, id).contains(&expected));
    }

    #[tokio::test]
    async fn test_killed_by_signal_reports_negative_exit_code() {
        let h = harness("echo about to die\nkill -9 $$\n", Duration::from_secs(10));
        let (id, params, sink) = pending_job(&h).await;

        let failure = h.runner.run(id, &params, sink).await.unwrap_err();
        assert_eq!(
            failure,
            JobFailure::ExecutionFailed {
                exit_code: Some(-9),
                output: "about to die\n".to_string(),
            }
        );
        assert!(read_log(&h, id).ends_with("STATUS: FAILED (exit code -9)\n"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_output_written_before_kill() {
        let h = harness(
            "i=0\n\
             while [ $i -lt 200 ]; do echo line $i; i=$((i + 1)); done\n\
             exec sleep 30\n",
            Duration::from_millis(500),
        );
        let (id, params, sink) = pending_job(&h).await;

        let failure = h.runner.run(id, &params, sink).await.unwrap_err();
        assert_eq!(failure, JobFailure::TimedOut { timeout_secs: 1 });

        let log = read_log(&h, id);
        assert!(log.contains("line 0\n"));
        assert!(log.contains("line 199\n"));
        assert!(log.ends_with("STATUS: TIMEOUT\n"));
    }

    #[test]
    fn test_timeout_seconds_round_up() {
        assert_eq!(whole_secs_rounded_up(Duration::from_millis(300)), 1);
        assert_eq!(whole_secs_rounded_up(Duration::from_secs(600)), 600);
        assert_eq!(whole_secs_rounded_up(Duration::from_millis(1500)), 2);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_errored() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RunnerConfig::new(dir.path().join("scripts"), dir.path().join("logs"));
        config.interpreter = dir.path().join("no-such-interpreter");
        let config = Arc::new(config);
        let store = Arc::new(InMemoryJobStore::new());
        let h = Harness {
            runner: ProcessRunner::new(config.clone(), store.clone()),
            config,
            store,
            _dir: dir,
        };
        let (id, params, sink) = pending_job(&h).await;

        let failure = h.runner.run(id, &params, sink).await.unwrap_err();
        assert!(matches!(failure, JobFailure::Infrastructure { .. }));
        assert!(failure.to_string().starts_with("failed to launch"));

        assert_eq!(
            h.store.get(id).await.unwrap().unwrap().state,
            JobState::Errored
        );
        let log = read_log(&h, id);
        let last = log.lines().last().unwrap();
        assert!(last.starts_with("STATUS: ERROR - failed to launch"));
    }

    #[tokio::test]
    async fn test_run_refuses_job_that_is_not_pending() {
        let h = harness("echo should not run\n", Duration::from_secs(10));
        let (id, params, sink) = pending_job(&h).await;
        h.store.set_state(id, JobTransition::Start).await.unwrap();

        let failure = h.runner.run(id, &params, sink).await.unwrap_err();
        assert!(matches!(failure, JobFailure::Infrastructure { .. }));

        // Record and log untouched
        assert_eq!(
            h.store.get(id).await.unwrap().unwrap().state,
            JobState::Running
        );
        assert!(!read_log(&h, id).contains("STATUS:"));
    }

    #[tokio::test]
    async fn test_abort_finalizes_log_and_record() {
        let h = harness("echo unused\n", Duration::from_secs(10));
        let (id, _params, sink) = pending_job(&h).await;
        drop(sink);

        h.runner.abort(id, "interrupted").await;

        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Errored);
        assert_eq!(record.error, Some(JobFailure::infrastructure("interrupted")));
        assert!(read_log(&h, id).ends_with("STATUS: ERROR - interrupted\n"));
    }
}
