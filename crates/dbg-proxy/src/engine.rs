use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, path::PathBuf};

use crate::breakpoint::{Breakpoint, BreakpointLocation};
use crate::bus::Subscription;
use crate::error::EngineError;
use crate::event::{BreakpointEvent, SessionEvent, TargetEvent};

pub type EngineResult<T> = LocalBoxFuture<'static, Result<T, EngineError>>;

/// What a session debugs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl Target {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Depth in the call stack, 0 is the innermost frame
    pub level: usize,
    pub name: String,
    #[serde(default)]
    pub location: Option<BreakpointLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub type_name: Option<String>,
}

/// A concrete debugger backend driven by the proxy.
///
/// Methods take `&self`: engines are shared behind `Rc` and may emit events
/// synchronously from inside any of these calls, so implementations keep their
/// own state in cells.
pub trait DebugEngine: Debug {
    /// Launch `target`. `breakpoints` is the proxy's collection at start time.
    fn start(&self, target: &Target, breakpoints: &[Breakpoint]);

    /// Ask the engine to stop. Engines are expected to emit
    /// [`SessionEvent::Terminated`] once done.
    fn stop(&self);

    fn pause(&self);

    fn resume(&self);

    fn step_into(&self);

    fn step_over(&self);

    fn set_selected_frame(&self, level: usize);

    fn call_stack(&self) -> EngineResult<Vec<StackFrame>>;

    fn selected_frame(&self) -> EngineResult<StackFrame>;

    fn variable_list(&self) -> EngineResult<Vec<Variable>>;

    fn on_breakpoint_event(&self, handler: Box<dyn Fn(&BreakpointEvent)>) -> Subscription;

    fn on_session_event(&self, handler: Box<dyn Fn(&SessionEvent)>) -> Subscription;

    fn on_target_event(&self, handler: Box<dyn Fn(&TargetEvent)>) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_launch_configuration() {
        let target: Target = serde_json::from_str(
            r#"{"program": "app.js", "args": ["--port", "8080"], "cwd": "/tmp"}"#,
        )
        .unwrap();

        assert_eq!(
            target,
            Target {
                program: PathBuf::from("app.js"),
                args: vec!["--port".to_string(), "8080".to_string()],
                cwd: Some(PathBuf::from("/tmp")),
            }
        );
    }

    #[test]
    fn test_target_defaults() {
        let target: Target = serde_json::from_str(r#"{"program": "app.js"}"#).unwrap();
        assert_eq!(target, Target::new("app.js"));
    }
}
