//! Structured result extraction
//!
//! A calibration script may print a JSON document between two marker lines
//! at the end of its output. Anything wrong with that block degrades to "no
//! structured result"; it never fails the job.

use serde_json::Value;
use tracing::{debug, warn};

pub const RESULT_START_MARKER: &str = "___JSON_RESULT_START___";
pub const RESULT_END_MARKER: &str = "___JSON_RESULT_END___";

/// Parses the block between the first start marker and the first end marker
/// following it.
///
/// Returns `None` when either marker is missing, the block is empty, or its
/// content is not valid JSON.
pub fn extract_result(output: &str) -> Option<Value> {
    let start = output.find(RESULT_START_MARKER)? + RESULT_START_MARKER.len();
    let Some(len) = output[start..].find(RESULT_END_MARKER) else {
        debug!("Result start marker found without a matching end marker");
        return None;
    };

    let block = output[start..start + len].trim();
    if block.is_empty() {
        return None;
    }

    match serde_json::from_str(block) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse structured result block: {}", e);
            None
        }
    }
}
