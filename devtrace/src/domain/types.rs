//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a target id
//! where a session id is expected, and make function signatures more
//! expressive.

use std::fmt;

use serde::Deserialize;

/// Protocol identifier of one debuggable target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct TargetId(pub String);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target:{}", self.0)
    }
}

/// Identifier of one bound protocol session.
///
/// Distinct from [`TargetId`]: a target exists whether or not anyone is
/// attached to it, while a session id is minted per attach and dies
/// with the detach.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Kind of debuggable surface a target exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Page,
    Worker,
    #[serde(other)]
    Other,
}

/// One entry of the runtime's target listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: TargetId,
    #[serde(rename = "type")]
    pub kind: TargetKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// A bound communication context scoped to one target.
///
/// Owned by one run; torn down on detach or transport failure.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub target_id: TargetId,
}

/// Lifecycle of one trace run.
///
/// `Failed` is reachable from any state on transport or command error.
/// Only the trace controller mutates this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Started,
    Stopping,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Started => "started",
            RunState::Stopping => "stopping",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One chunk of trace payload delivered by a single data-collected
/// event, with its records already re-encoded as canonical JSON text.
///
/// Fragments are append-only and ordered by arrival; trace consumers
/// assume monotonic event ordering within categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub records: Vec<String>,
}

/// Everything one successful run produced.
#[derive(Debug)]
pub struct TraceOutcome {
    pub fragments: Vec<Fragment>,
    /// Reported by the completion event. A warning, not an error.
    pub data_loss: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_info_deserializes_protocol_shape() {
        let info: TargetInfo = serde_json::from_str(
            r#"{"targetId":"T1","type":"page","title":"demo","url":"https://example.test"}"#,
        )
        .expect("valid target info");
        assert_eq!(info.target_id, TargetId("T1".to_string()));
        assert_eq!(info.kind, TargetKind::Page);
        assert_eq!(info.title, "demo");
    }

    #[test]
    fn test_unknown_target_kind_maps_to_other() {
        let info: TargetInfo =
            serde_json::from_str(r#"{"targetId":"B1","type":"browser"}"#).expect("valid");
        assert_eq!(info.kind, TargetKind::Other);
    }
}
