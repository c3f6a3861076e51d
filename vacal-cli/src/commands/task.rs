//! Task command handlers
//!
//! Submitting calibration tasks, viewing status and history, and reading
//! or following task logs.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use futures::StreamExt;
use std::io::Write;
use std::time::Duration;
use uuid::Uuid;
use vacal_client::OrchestratorClient;
use vacal_core::domain::job::{JobFailure, JobState};
use vacal_core::domain::params::{CalibrationMode, CalibrationParams};
use vacal_core::dto::job::TaskStatus;

use crate::id_resolver::resolve_task_id;
use crate::types::IdOrPrefix;

/// Calibration parameters accepted on the command line
///
/// Anything left out keeps the orchestrator's default.
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Calibration mode: full, calibration_only or ensemble
    #[arg(long)]
    mode: Option<CalibrationMode>,

    /// VA dataset CSV (full mode)
    #[arg(long)]
    dataset: Option<String>,

    /// Prepared calibration data (calibration_only mode)
    #[arg(long)]
    calib_data: Option<String>,

    /// EAVA output (ensemble mode)
    #[arg(long)]
    eava: Option<String>,

    /// InSilicoVA output (ensemble mode)
    #[arg(long)]
    insilicova: Option<String>,

    /// InterVA output (ensemble mode)
    #[arg(long)]
    interva: Option<String>,

    #[arg(long)]
    country: Option<String>,

    /// neonate, child or adult
    #[arg(long)]
    age_group: Option<String>,

    #[arg(long)]
    data_type: Option<String>,

    #[arg(long)]
    nsim: Option<u32>,

    #[arg(long)]
    mmat_type: Option<String>,

    #[arg(long)]
    path_correction: Option<bool>,

    #[arg(long)]
    n_mcmc: Option<u32>,

    #[arg(long)]
    n_burn: Option<u32>,

    #[arg(long)]
    n_thin: Option<u32>,

    #[arg(long)]
    n_chain: Option<u32>,

    #[arg(long)]
    n_core: Option<u32>,

    #[arg(long)]
    seed: Option<i64>,

    #[arg(long)]
    verbose: Option<bool>,

    #[arg(long)]
    saveoutput: Option<bool>,

    #[arg(long)]
    plot_it: Option<bool>,
}

impl SubmitArgs {
    pub fn into_params(self) -> CalibrationParams {
        let mut params = CalibrationParams {
            dataset_path: self.dataset,
            calib_data_path: self.calib_data,
            eava_path: self.eava,
            insilicova_path: self.insilicova,
            interva_path: self.interva,
            ..Default::default()
        };

        if let Some(mode) = self.mode {
            params.mode = mode;
        }
        if let Some(country) = self.country {
            params.country = country;
        }
        if let Some(age_group) = self.age_group {
            params.age_group = age_group;
        }
        if let Some(data_type) = self.data_type {
            params.data_type = data_type;
        }
        if let Some(mmat_type) = self.mmat_type {
            params.mmat_type = mmat_type;
        }
        params.nsim = self.nsim.unwrap_or(params.nsim);
        params.path_correction = self.path_correction.unwrap_or(params.path_correction);
        params.n_mcmc = self.n_mcmc.unwrap_or(params.n_mcmc);
        params.n_burn = self.n_burn.unwrap_or(params.n_burn);
        params.n_thin = self.n_thin.unwrap_or(params.n_thin);
        params.n_chain = self.n_chain.unwrap_or(params.n_chain);
        params.n_core = self.n_core.unwrap_or(params.n_core);
        params.seed = self.seed.unwrap_or(params.seed);
        params.verbose = self.verbose.unwrap_or(params.verbose);
        params.saveoutput = self.saveoutput.unwrap_or(params.saveoutput);
        params.plot_it = self.plot_it.unwrap_or(params.plot_it);

        params
    }
}

/// Submit a task, optionally following it to completion
pub async fn submit(client: &OrchestratorClient, args: SubmitArgs, wait: bool) -> Result<()> {
    let params = args.into_params();

    // Catch obvious mistakes before the round trip
    if let Err(e) = params.validate() {
        bail!("Invalid parameters: {}", e);
    }

    let created = client
        .submit_calibration(&params)
        .await
        .context("Failed to submit task")?;

    println!("{}", "✓ Task submitted".green().bold());
    println!("  ID:     {}", created.task_id.to_string().cyan());
    println!("  Mode:   {}", params.mode);
    println!("  Status: {}", colorize_status(created.status));

    if wait {
        println!();
        follow_logs(client, created.task_id).await?;
        let task = client.get_task(created.task_id).await?;
        println!();
        print_task_details(&task);
        exit_for(&task)?;
    }

    Ok(())
}

/// Show one task
pub async fn status(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_task_id(client, &IdOrPrefix::parse(id)).await?;
    let task = client.get_task(uuid).await?;

    print_task_details(&task);

    Ok(())
}

/// Poll a task until it reaches a terminal state
pub async fn wait(client: &OrchestratorClient, id: &str, interval: u64) -> Result<()> {
    let uuid = resolve_task_id(client, &IdOrPrefix::parse(id)).await?;
    let interval = Duration::from_secs(interval.max(1));

    let mut last_state = None;
    let task = loop {
        let task = client.get_task(uuid).await?;
        if last_state != Some(task.status) {
            println!("  {} {}", "▸".cyan(), colorize_status(task.status));
            last_state = Some(task.status);
        }
        if task.status.is_terminal() {
            break task;
        }
        tokio::time::sleep(interval).await;
    };

    println!();
    print_task_details(&task);
    exit_for(&task)
}

/// List all tasks
pub async fn list(client: &OrchestratorClient) -> Result<()> {
    let tasks = client.list_tasks().await?;

    if tasks.is_empty() {
        println!("{}", "No tasks found.".yellow());
    } else {
        println!("{}", format!("Found {} task(s):", tasks.len()).bold());
        println!();
        for task in &tasks {
            print_task_summary(task);
        }
    }

    Ok(())
}

/// Print the task log, or stream it until the task finishes
pub async fn logs(client: &OrchestratorClient, id: &str, follow: bool) -> Result<()> {
    let uuid = resolve_task_id(client, &IdOrPrefix::parse(id)).await?;

    if follow {
        return follow_logs(client, uuid).await;
    }

    let log = client.get_logs(uuid).await.map_err(|e| {
        if e.is_not_found() {
            anyhow::anyhow!("No log found for task {}", uuid)
        } else {
            e.into()
        }
    })?;
    print!("{}", log);

    Ok(())
}

async fn follow_logs(client: &OrchestratorClient, id: Uuid) -> Result<()> {
    let mut chunks = client
        .follow_logs(id)
        .await
        .with_context(|| format!("Failed to follow log for task {}", id))?;

    let mut stdout = std::io::stdout();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.context("Log stream interrupted")?;
        stdout.write_all(&chunk)?;
        stdout.flush()?;
    }

    Ok(())
}

/// Fails the command when the task did not succeed
fn exit_for(task: &TaskStatus) -> Result<()> {
    if task.status == JobState::Succeeded {
        Ok(())
    } else {
        bail!("Task {} finished as {}", task.task_id, task.status)
    }
}

/// Print a one-entry summary for task listings
fn print_task_summary(task: &TaskStatus) {
    println!("  {} Task {}", "▸".cyan(), task.task_id.to_string().dimmed());
    println!("    Mode:     {}", task.parameters.mode);
    println!("    Status:   {}", colorize_status(task.status));
    println!(
        "    Created:  {}",
        task.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

/// Print detailed task information
fn print_task_details(task: &TaskStatus) {
    println!("{}", "Task Details:".bold());
    println!("  ID:          {}", task.task_id.to_string().cyan());
    println!("  Mode:        {}", task.parameters.mode);
    println!("  Status:      {}", colorize_status(task.status));
    println!(
        "  Created:     {}",
        task.created_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = task.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(completed) = task.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = task.started_at {
            let duration = completed.signed_duration_since(started);
            println!("  Duration:    {}s", duration.num_seconds());
        }
    }

    println!("\n{}", "Parameters:".bold());
    println!("  {}", task.parameters.summary());

    if let Some(result) = &task.result {
        println!("\n{}", "Result:".bold());
        println!("  Log file:   {}", result.log_file);
        match &result.result_data {
            Some(data) => {
                println!("\n{}", "Calibration output:".bold());
                match serde_json::to_string_pretty(data) {
                    Ok(pretty) => println!("{}", pretty),
                    Err(_) => println!("{}", data),
                }
            }
            None => println!("  {}", "No structured results reported".dimmed()),
        }
    }

    if let Some(failure) = &task.failure {
        println!("\n{}", "Error:".bold());
        println!("  {}", failure.to_string().red());
        if let JobFailure::ExecutionFailed { output, .. } = failure {
            let tail: Vec<&str> = output.lines().rev().take(10).collect();
            if !tail.is_empty() {
                println!("\n{}", "Last output:".bold());
                for line in tail.into_iter().rev() {
                    println!("  {}", line.dimmed());
                }
            }
        }
    }
}

/// Colorize task status for display
fn colorize_status(status: JobState) -> ColoredString {
    let label = status.as_str();
    match status {
        JobState::Pending => label.yellow(),
        JobState::Running => label.cyan(),
        JobState::Succeeded => label.green(),
        JobState::Failed => label.red(),
        JobState::TimedOut => label.red(),
        JobState::Errored => label.magenta(),
    }
}
