//! Scripted replays of a debug session against a [`DebuggerProxy`].
//!
//! A scenario is a TOML document describing the proxy configuration, the
//! breakpoints set before the run and a list of steps. Steps either act on the
//! proxy the way an editor would (insert, step, inspect) or make the scripted
//! engine emit an event. Every event observed on the proxy's bus is recorded
//! as one JSON line.

use futures::executor::block_on;
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, fs, path::Path, path::PathBuf, rc::Rc};
use tracing::{debug, warn};

use crate::breakpoint::{Breakpoint, BreakpointLocation, BufferRow};
use crate::bus::Subscription;
use crate::config::ProxyConfig;
use crate::engine::{DebugEngine, StackFrame, Target, Variable};
use crate::error::{ConfigError, ProxyError};
use crate::event::{BreakpointEvent, BreakpointEventKind, SessionEvent, TargetEvent};
use crate::proxy::DebuggerProxy;
use crate::scripted::ScriptedEngine;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Scenario {
    #[serde(default)]
    pub proxy: ProxyConfig,
    pub target: Target,
    #[serde(default)]
    pub engine: EngineScript,
    #[serde(default)]
    pub breakpoints: Vec<BreakpointSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// How the scripted engine behaves in every session of a scenario.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineScript {
    pub resolve: Vec<Resolution>,
    pub call_stack: Vec<StackFrame>,
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Resolution {
    pub path: PathBuf,
    pub row: BufferRow,
    pub buffer_row: BufferRow,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BreakpointSpec {
    pub path: PathBuf,
    pub row: Option<BufferRow>,
    pub column: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub condition: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl BreakpointSpec {
    fn location(&self) -> BreakpointLocation {
        BreakpointLocation {
            path: self.path.clone(),
            row: self.row,
            column: self.column,
        }
    }
}

impl From<&BreakpointSpec> for Breakpoint {
    fn from(spec: &BreakpointSpec) -> Self {
        Breakpoint {
            location: spec.location(),
            enabled: spec.enabled,
            condition: spec.condition.clone(),
            active_buffer_row: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineBreakpointEvent {
    pub kind: String,
    pub path: PathBuf,
    pub row: Option<BufferRow>,
    pub buffer_row: Option<BufferRow>,
}

impl EngineBreakpointEvent {
    fn kind(&self) -> Result<BreakpointEventKind, ConfigError> {
        match self.kind.as_str() {
            "inserted" => Ok(BreakpointEventKind::Inserted),
            "removed" => Ok(BreakpointEventKind::Removed),
            "enabled" => Ok(BreakpointEventKind::Enabled),
            "disabled" => Ok(BreakpointEventKind::Disabled),
            "condition-added" => Ok(BreakpointEventKind::ConditionAdded),
            "condition-removed" => Ok(BreakpointEventKind::ConditionRemoved),
            "moved" => Ok(BreakpointEventKind::Moved {
                buffer_row: self.buffer_row,
            }),
            kind => Err(ConfigError::Invalid(format!(
                "unknown breakpoint event kind \"{}\"",
                kind
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    Start,
    Insert {
        path: PathBuf,
        row: Option<BufferRow>,
        condition: Option<String>,
    },
    Remove {
        path: PathBuf,
        row: Option<BufferRow>,
    },
    Enable {
        path: PathBuf,
        row: Option<BufferRow>,
    },
    Disable {
        path: PathBuf,
        row: Option<BufferRow>,
    },
    SetCondition {
        path: PathBuf,
        row: Option<BufferRow>,
        condition: String,
    },
    ClearCondition {
        path: PathBuf,
        row: Option<BufferRow>,
    },
    EngineBreakpoint {
        event: EngineBreakpointEvent,
    },
    EngineSession {
        event: SessionEvent,
    },
    EngineTarget {
        event: TargetEvent,
    },
    Stop,
    Pause,
    Resume,
    StepInto,
    StepOver,
    SelectFrame {
        level: usize,
    },
    CallStack,
    SelectedFrame,
    Variables,
}

impl Step {
    fn is_engine_event(&self) -> bool {
        matches!(
            self,
            Step::EngineBreakpoint { .. } | Step::EngineSession { .. } | Step::EngineTarget { .. }
        )
    }
}

/// One line of replay output.
#[derive(Debug, Serialize)]
#[serde(tag = "channel", content = "event", rename_all = "kebab-case")]
pub enum Record {
    Breakpoint(BreakpointEvent),
    Session(SessionEvent),
    Target(TargetEvent),
    CallStack(Vec<StackFrame>),
    SelectedFrame(StackFrame),
    Variables(Vec<Variable>),
    Error(String),
}

impl Scenario {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let scenario: Scenario = toml::from_str(input)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&input)
    }

    /// Engine events need an engine: they may only follow a `start` step.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let first_start = self
            .steps
            .iter()
            .position(|step| matches!(step, Step::Start))
            .unwrap_or(self.steps.len());

        if let Some(index) = self.steps[..first_start]
            .iter()
            .position(Step::is_engine_event)
        {
            return Err(ConfigError::Invalid(format!(
                "step {} emits an engine event before any session is started",
                index + 1
            )));
        }

        for (index, step) in self.steps.iter().enumerate() {
            if let Step::EngineBreakpoint { event } = step {
                let kind = event.kind()?;
                // Restoring it at the end of the session would fail.
                let moves = matches!(kind, BreakpointEventKind::Moved { buffer_row: Some(_) });
                if moves && event.row.is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "step {} moves a breakpoint in {} that has no static row",
                        index + 1,
                        event.path.display()
                    )));
                }
            }
        }

        Ok(())
    }

    fn new_engine(&self) -> Rc<ScriptedEngine> {
        let engine = ScriptedEngine::new();
        for resolution in &self.engine.resolve {
            engine.resolve_to(
                BreakpointLocation::new(resolution.path.clone(), resolution.row),
                resolution.buffer_row,
            );
        }
        engine.set_call_stack(self.engine.call_stack.clone());
        engine.set_variables(self.engine.variables.clone());
        Rc::new(engine)
    }
}

/// Drives a proxy through a scenario and collects what observers would see.
pub struct Replay<'a> {
    scenario: &'a Scenario,
    proxy: DebuggerProxy,
    engine: Option<Rc<ScriptedEngine>>,
    records: Rc<RefCell<Vec<Record>>>,
    _subscriptions: Vec<Subscription>,
}

impl<'a> Replay<'a> {
    pub fn new(scenario: &'a Scenario) -> Self {
        let proxy = DebuggerProxy::new(scenario.proxy.clone());
        let records = Rc::new(RefCell::new(Vec::new()));

        let subscriptions = vec![
            {
                let records = Rc::clone(&records);
                proxy.on_breakpoint_event(move |event| {
                    records.borrow_mut().push(Record::Breakpoint(event.clone()))
                })
            },
            {
                let records = Rc::clone(&records);
                proxy.on_session_event(move |event| {
                    records.borrow_mut().push(Record::Session(event.clone()))
                })
            },
            {
                let records = Rc::clone(&records);
                proxy.on_target_event(move |event| {
                    records.borrow_mut().push(Record::Target(event.clone()))
                })
            },
        ];

        Self {
            scenario,
            proxy,
            engine: None,
            records,
            _subscriptions: subscriptions,
        }
    }

    pub fn proxy(&self) -> &DebuggerProxy {
        &self.proxy
    }

    pub fn run(mut self) -> Result<Vec<Record>, ConfigError> {
        for spec in &self.scenario.breakpoints {
            self.proxy.insert(Breakpoint::from(spec));
        }

        for (index, step) in self.scenario.steps.iter().enumerate() {
            debug!(step = index + 1, ?step, "Replaying step");
            self.apply(step)?;
        }

        Ok(self.records.take())
    }

    fn apply(&mut self, step: &Step) -> Result<(), ConfigError> {
        let applied = match step {
            Step::Start => {
                let engine = self.scenario.new_engine();
                match self
                    .proxy
                    .start_session(&self.scenario.target, engine.clone())
                {
                    Ok(()) => {
                        self.engine = Some(engine);
                    }
                    Err(err) => self.push(Record::Error(err.to_string())),
                }
                true
            }
            Step::Insert {
                path,
                row,
                condition,
            } => {
                let mut breakpoint = Breakpoint::new(location(path, *row));
                breakpoint.condition = condition.clone();
                self.proxy.insert(breakpoint)
            }
            Step::Remove { path, row } => self.proxy.remove(&location(path, *row).into()),
            Step::Enable { path, row } => self.proxy.enable(&location(path, *row).into()),
            Step::Disable { path, row } => self.proxy.disable(&location(path, *row).into()),
            Step::SetCondition {
                path,
                row,
                condition,
            } => self
                .proxy
                .set_condition(&location(path, *row).into(), condition),
            Step::ClearCondition { path, row } => {
                self.proxy.clear_condition(&location(path, *row).into())
            }
            Step::EngineBreakpoint { event } => {
                let location = location(&event.path, event.row);
                let breakpoint = self
                    .proxy
                    .find(&location)
                    .unwrap_or_else(|| Breakpoint::new(location));
                let event = BreakpointEvent::new(event.kind()?, breakpoint);
                self.with_engine(|engine| engine.emit_breakpoint_event(&event))
            }
            Step::EngineSession { event } => {
                self.with_engine(|engine| engine.emit_session_event(event))
            }
            Step::EngineTarget { event } => {
                self.with_engine(|engine| engine.emit_target_event(event))
            }
            Step::Stop => {
                self.proxy.stop();
                true
            }
            Step::Pause => {
                self.proxy.pause();
                true
            }
            Step::Resume => {
                self.proxy.resume();
                true
            }
            Step::StepInto => {
                self.proxy.step_into();
                true
            }
            Step::StepOver => {
                self.proxy.step_over();
                true
            }
            Step::SelectFrame { level } => {
                self.proxy.set_selected_frame(*level);
                true
            }
            Step::CallStack => {
                let record = match block_on(self.proxy.call_stack()) {
                    Ok(frames) => Record::CallStack(frames),
                    Err(err) => Record::Error(err.to_string()),
                };
                self.push(record);
                true
            }
            Step::SelectedFrame => {
                let record = match block_on(self.proxy.selected_frame()) {
                    Ok(frame) => Record::SelectedFrame(frame),
                    Err(err) => Record::Error(err.to_string()),
                };
                self.push(record);
                true
            }
            Step::Variables => {
                let record = match block_on(self.proxy.variable_list()) {
                    Ok(variables) => Record::Variables(variables),
                    Err(err) => Record::Error(err.to_string()),
                };
                self.push(record);
                true
            }
        };

        if !applied {
            warn!(?step, "Step had no effect");
        }
        Ok(())
    }

    /// Run `f` on the engine of the running session.
    fn with_engine(&mut self, f: impl FnOnce(&ScriptedEngine)) -> bool {
        let active = self.proxy.active_session();
        let engine = self.engine.clone().filter(|engine| {
            active
                .as_ref()
                .is_some_and(|active| Rc::ptr_eq(active, &(Rc::clone(engine) as Rc<dyn DebugEngine>)))
        });
        let Some(engine) = engine else {
            self.engine = None;
            self.push(Record::Error(ProxyError::NoSession.to_string()));
            return false;
        };

        f(&engine);
        true
    }

    fn push(&self, record: Record) {
        self.records.borrow_mut().push(record);
    }
}

fn location(path: &Path, row: Option<BufferRow>) -> BreakpointLocation {
    BreakpointLocation {
        path: path.to_path_buf(),
        row,
        column: None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    const RESTORE: &str = r#"
[target]
program = "app.js"

[[breakpoints]]
path = "a.js"
row = 10

[[steps]]
action = "start"

[[steps]]
action = "engine-breakpoint"
event = { kind = "moved", path = "a.js", row = 10, buffer-row = 12 }

[[steps]]
action = "engine-session"
event = { kind = "terminated" }
"#;

    fn to_json(records: &[Record]) -> Vec<serde_json::Value> {
        records
            .iter()
            .map(|record| serde_json::to_value(record).unwrap())
            .collect()
    }

    #[test]
    fn test_replay_restores_moved_breakpoint() {
        let scenario = Scenario::from_toml(RESTORE).unwrap();
        let records = Replay::new(&scenario).run().unwrap();

        assert_eq!(
            to_json(&records),
            vec![
                json!({"channel": "breakpoint", "event": {
                    "kind": "inserted",
                    "breakpoint": {"location": {"path": "a.js", "row": 10}, "enabled": true}
                }}),
                json!({"channel": "session", "event": {"kind": "started"}}),
                json!({"channel": "breakpoint", "event": {
                    "kind": "moved",
                    "buffer-row": 12,
                    "breakpoint": {"location": {"path": "a.js", "row": 10}, "enabled": true}
                }}),
                json!({"channel": "session", "event": {"kind": "terminated"}}),
                json!({"channel": "breakpoint", "event": {
                    "kind": "moved",
                    "buffer-row": 10,
                    "breakpoint": {
                        "location": {"path": "a.js", "row": 10},
                        "enabled": true,
                        "active-buffer-row": 12
                    }
                }}),
            ]
        );
    }

    #[test]
    fn test_inspection_without_session() {
        let scenario = Scenario::from_toml(
            r#"
[target]
program = "app.js"

[[steps]]
action = "call-stack"
"#,
        )
        .unwrap();
        let records = Replay::new(&scenario).run().unwrap();

        assert_eq!(
            to_json(&records),
            vec![json!({"channel": "error", "event": "No debug session in progress"})]
        );
    }

    #[test]
    fn test_engine_script() {
        let scenario = Scenario::from_toml(
            r#"
[target]
program = "app.js"

[[engine.resolve]]
path = "a.js"
row = 3
buffer-row = 4

[[engine.call-stack]]
level = 0
name = "main"

[[breakpoints]]
path = "a.js"
row = 3

[[steps]]
action = "start"

[[steps]]
action = "call-stack"

[[steps]]
action = "stop"
"#,
        )
        .unwrap();
        let replay = Replay::new(&scenario);
        let proxy = replay.proxy().clone();
        let records = replay.run().unwrap();

        assert!(records.iter().any(|record| matches!(
            record,
            Record::CallStack(frames) if frames.len() == 1 && frames[0].name == "main"
        )));
        assert!(matches!(
            records.last(),
            Some(Record::Breakpoint(BreakpointEvent {
                kind: BreakpointEventKind::Moved {
                    buffer_row: Some(3)
                },
                ..
            }))
        ));
        assert!(!proxy.is_running());
    }

    #[test]
    fn test_second_start_is_reported() {
        let scenario = Scenario::from_toml(
            r#"
[target]
program = "app.js"

[[steps]]
action = "start"

[[steps]]
action = "start"
"#,
        )
        .unwrap();
        let records = Replay::new(&scenario).run().unwrap();

        assert!(matches!(
            records.last(),
            Some(Record::Error(message)) if message == "A debug session is already in progress"
        ));
    }

    #[rstest]
    #[case::engine_event_before_start(
        r#"
[target]
program = "app.js"

[[steps]]
action = "engine-session"
event = { kind = "terminated" }
"#
    )]
    #[case::unknown_breakpoint_kind(
        r#"
[target]
program = "app.js"

[[steps]]
action = "start"

[[steps]]
action = "engine-breakpoint"
event = { kind = "teleported", path = "a.js", row = 1 }
"#
    )]
    #[case::moved_without_static_row(
        r#"
[target]
program = "app.js"

[[breakpoints]]
path = "a.js"

[[steps]]
action = "start"

[[steps]]
action = "engine-breakpoint"
event = { kind = "moved", path = "a.js", buffer-row = 3 }
"#
    )]
    fn test_invalid_scenarios(#[case] input: &str) {
        assert!(matches!(
            Scenario::from_toml(input),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_engine_event_after_termination_is_reported() {
        let scenario = Scenario::from_toml(
            r#"
[target]
program = "app.js"

[[steps]]
action = "start"

[[steps]]
action = "stop"

[[steps]]
action = "engine-target"
event = { kind = "output", body = { text = "late" } }
"#,
        )
        .unwrap();
        let records = Replay::new(&scenario).run().unwrap();

        assert!(!records.iter().any(|record| matches!(record, Record::Target(_))));
        assert!(matches!(
            records.last(),
            Some(Record::Error(message)) if message == "No debug session in progress"
        ));
    }

    #[test]
    fn test_missing_target_is_a_parse_error() {
        assert!(matches!(
            Scenario::from_toml("[[steps]]\naction = \"start\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
