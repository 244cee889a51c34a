//! Target discovery and session binding.
//!
//! Resolves the debuggable page target and opens a flat-mode protocol
//! session bound to it. Exactly one page target is selected per run;
//! teardown is best effort and never masks the run's actual result.

use log::{info, warn};
use serde_json::{json, Value};

use crate::domain::{Session, SessionError, SessionId, TargetInfo, TargetKind, TransportError};
use crate::transport::Transport;

/// Ask the endpoint for every debuggable target it currently exposes.
pub async fn discover_targets(transport: &Transport) -> Result<Vec<TargetInfo>, TransportError> {
    let result = transport.execute("Target.getTargets", json!({}), None).await?;
    let infos = result.get("targetInfos").cloned().unwrap_or_else(|| json!([]));
    serde_json::from_value(infos).map_err(|err| TransportError::Protocol {
        method: "Target.getTargets".to_string(),
        message: format!("malformed targetInfos: {err}"),
    })
}

/// Pick the page target for this run.
///
/// Multiple page targets are ambiguous: the protocol makes no ordering
/// promise across them, so the first in returned order wins and the
/// ambiguity is logged.
pub fn select_page_target(targets: &[TargetInfo]) -> Result<&TargetInfo, SessionError> {
    let mut pages = targets.iter().filter(|t| t.kind == TargetKind::Page);
    let Some(first) = pages.next() else {
        return Err(SessionError::NoPageTarget(targets.len()));
    };
    let extra = pages.count();
    if extra > 0 {
        warn!("{} page targets found, using the first ({})", extra + 1, first.target_id);
    }
    Ok(first)
}

/// Attach to the target, returning the bound session.
pub async fn open_session(
    transport: &Transport,
    target: &TargetInfo,
) -> Result<Session, SessionError> {
    let result = transport
        .execute(
            "Target.attachToTarget",
            json!({ "targetId": target.target_id.0, "flatten": true }),
            None,
        )
        .await
        .map_err(|source| SessionError::Attach { target: target.target_id.clone(), source })?;

    let id = result
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or(SessionError::MissingSessionId)?;

    info!("attached to {} ({})", target.target_id, target.title);
    Ok(Session { id: SessionId(id.to_string()), target_id: target.target_id.clone() })
}

/// Best-effort detach. Errors are logged and swallowed so teardown
/// never masks the run's actual result.
pub async fn close_session(transport: &Transport, session: &Session) {
    let params = json!({ "sessionId": session.id.0 });
    if let Err(err) = transport.execute("Target.detachFromTarget", params, None).await {
        warn!("detach from {} failed: {err}", session.target_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TargetId;

    fn target(id: &str, kind: TargetKind) -> TargetInfo {
        TargetInfo {
            target_id: TargetId(id.to_string()),
            kind,
            title: String::new(),
            url: String::new(),
        }
    }

    #[test]
    fn test_no_page_target_is_a_selection_failure() {
        let targets =
            vec![target("W1", TargetKind::Worker), target("B1", TargetKind::Other)];
        let err = select_page_target(&targets).expect_err("no page target");
        match err {
            SessionError::NoPageTarget(count) => assert_eq!(count, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_page_target_wins() {
        let targets = vec![
            target("W1", TargetKind::Worker),
            target("P1", TargetKind::Page),
            target("P2", TargetKind::Page),
        ];
        let selected = select_page_target(&targets).expect("page target");
        assert_eq!(selected.target_id, TargetId("P1".to_string()));
    }

    #[test]
    fn test_empty_target_list() {
        let err = select_page_target(&[]).expect_err("nothing to select");
        assert!(matches!(err, SessionError::NoPageTarget(0)));
    }
}
