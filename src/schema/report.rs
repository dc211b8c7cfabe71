//! Per-fix output record

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trigger::TriggerAction;
use crate::types::Readout;

/// Result of processing one fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixReport {
    /// Processor session the fix belongs to
    pub session_id: Uuid,
    /// 1-based index of the fix within the session
    pub sequence: u64,
    /// Source timestamp of the fix
    pub timestamp_ms: i64,
    /// Time since the previous fix; 0 for seeded or degenerate fixes
    pub elapsed_ms: i64,
    /// Display values after processing the fix
    #[serde(flatten)]
    pub readout: Readout,
    /// Audio command issued for this fix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<TriggerAction>,
    /// True when the fix did not advance the state
    pub degenerate: bool,
    /// Non-fatal error raised while processing the fix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
