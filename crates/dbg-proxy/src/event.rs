use serde::{Deserialize, Serialize};
use std::fmt;

use crate::breakpoint::{Breakpoint, BufferRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BreakpointEventKind {
    Inserted,
    Removed,
    Enabled,
    Disabled,
    ConditionAdded,
    ConditionRemoved,
    /// The breakpoint was resolved to another row, `None` reverts it to its static row.
    #[serde(rename_all = "kebab-case")]
    Moved { buffer_row: Option<BufferRow> },
}

/// A change to a single breakpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointEvent {
    #[serde(flatten)]
    pub kind: BreakpointEventKind,
    pub breakpoint: Breakpoint,
}

impl BreakpointEvent {
    pub fn new(kind: BreakpointEventKind, breakpoint: Breakpoint) -> Self {
        Self { kind, breakpoint }
    }

    pub fn moved(breakpoint: Breakpoint, buffer_row: Option<BufferRow>) -> Self {
        Self::new(BreakpointEventKind::Moved { buffer_row }, breakpoint)
    }
}

impl fmt::Display for BreakpointEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakpointEventKind::Inserted => write!(f, "inserted"),
            BreakpointEventKind::Removed => write!(f, "removed"),
            BreakpointEventKind::Enabled => write!(f, "enabled"),
            BreakpointEventKind::Disabled => write!(f, "disabled"),
            BreakpointEventKind::ConditionAdded => write!(f, "condition-added"),
            BreakpointEventKind::ConditionRemoved => write!(f, "condition-removed"),
            BreakpointEventKind::Moved {
                buffer_row: Some(row),
            } => write!(f, "moved to {}", row),
            BreakpointEventKind::Moved { buffer_row: None } => write!(f, "moved back"),
        }
    }
}

/// Session lifecycle events emitted by a debug engine.
///
/// Only [`SessionEvent::Terminated`] carries meaning for the proxy; every other
/// kind is forwarded as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SessionEvent {
    Started,
    Stopped {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Resumed,
    Terminated,
    /// Engine-specific event the proxy knows nothing about
    Custom {
        name: String,
        #[serde(default)]
        body: serde_json::Value,
    },
}

impl SessionEvent {
    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionEvent::Terminated)
    }
}

/// Events about the debuggee itself (output, process state). Opaque to the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEvent {
    pub kind: String,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl TargetEvent {
    pub fn new(kind: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::breakpoint::BreakpointLocation;

    #[test]
    fn test_breakpoint_event_json_shape() {
        let event = BreakpointEvent::moved(
            Breakpoint::new(BreakpointLocation::new("a.js", 10)),
            Some(12),
        );

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "kind": "moved",
                "buffer-row": 12,
                "breakpoint": {"location": {"path": "a.js", "row": 10}, "enabled": true}
            })
        );
    }

    #[rstest]
    #[case(r#"{"kind": "terminated"}"#, SessionEvent::Terminated)]
    #[case(r#"{"kind": "started"}"#, SessionEvent::Started)]
    #[case(
        r#"{"kind": "stopped", "reason": "breakpoint"}"#,
        SessionEvent::Stopped { reason: "breakpoint".to_string(), description: None }
    )]
    #[case(
        r#"{"kind": "custom", "name": "thread-exited"}"#,
        SessionEvent::Custom { name: "thread-exited".to_string(), body: serde_json::Value::Null }
    )]
    fn test_session_event_from_json(#[case] input: &str, #[case] expected: SessionEvent) {
        let event: SessionEvent = serde_json::from_str(input).unwrap();
        assert_eq!(event, expected);
    }

    #[rstest]
    #[case(BreakpointEventKind::ConditionAdded, "condition-added")]
    #[case(BreakpointEventKind::Moved { buffer_row: Some(3) }, "moved to 3")]
    #[case(BreakpointEventKind::Moved { buffer_row: None }, "moved back")]
    fn test_kind_display(#[case] kind: BreakpointEventKind, #[case] expected: &str) {
        assert_eq!(kind.to_string(), expected);
    }
}
