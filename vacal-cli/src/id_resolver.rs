//! ID resolver module
//!
//! Handles resolution of UUID prefixes to full UUIDs by querying the API.
//! This allows users to specify short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use uuid::Uuid;
use vacal_client::OrchestratorClient;

use crate::types::IdOrPrefix;

/// Resolve a task ID or prefix to a full UUID
///
/// If the input is already a full UUID, returns it immediately.
/// Otherwise, fetches the task history and finds the one matching the prefix.
///
/// # Errors
/// Returns an error if:
/// - No task matches the prefix
/// - Multiple tasks match the prefix (ambiguous)
/// - API call fails
pub async fn resolve_task_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    // If it's already a full UUID, return it
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let tasks = client
        .list_tasks()
        .await
        .context("Failed to fetch tasks for ID resolution")?;

    match_prefix(tasks.iter().map(|t| t.task_id), &id_or_prefix.as_str())
}

fn match_prefix(ids: impl Iterator<Item = Uuid>, prefix: &str) -> Result<Uuid> {
    let prefix = prefix.to_lowercase();
    let matches: Vec<Uuid> = ids
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No task found with ID starting with '{}'", prefix)),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple tasks: {}",
                prefix,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<Uuid> {
        vec![
            Uuid::parse_str("3f2a9c10-0000-4000-8000-000000000001").unwrap(),
            Uuid::parse_str("3f2b0000-0000-4000-8000-000000000002").unwrap(),
            Uuid::parse_str("a1000000-0000-4000-8000-000000000003").unwrap(),
        ]
    }

    #[test]
    fn test_unique_prefix_resolves() {
        let id = match_prefix(ids().into_iter(), "A1").unwrap();
        assert_eq!(id, ids()[2]);
        assert_eq!(match_prefix(ids().into_iter(), "3f2a").unwrap(), ids()[0]);
    }

    #[test]
    fn test_ambiguous_prefix_lists_candidates() {
        let err = match_prefix(ids().into_iter(), "3f2").unwrap_err();
        assert!(err.to_string().contains("Ambiguous prefix '3f2'"));
    }

    #[test]
    fn test_unknown_prefix() {
        let err = match_prefix(ids().into_iter(), "ff").unwrap_err();
        assert!(err.to_string().starts_with("No task found"));
    }
}
