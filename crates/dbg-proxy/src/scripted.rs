use futures::{FutureExt, future};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use tracing::debug;

use crate::breakpoint::{Breakpoint, BreakpointLocation, BufferRow};
use crate::bus::{Channel, EventBus, Subscription};
use crate::engine::{DebugEngine, EngineResult, StackFrame, Target, Variable};
use crate::error::EngineError;
use crate::event::{BreakpointEvent, SessionEvent, TargetEvent};

/// A call the proxy made on a [`ScriptedEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Start { program: String, breakpoints: usize },
    Stop,
    Pause,
    Resume,
    StepInto,
    StepOver,
    SetSelectedFrame(usize),
    CallStack,
    SelectedFrame,
    VariableList,
}

/// In-process engine that does nothing on its own.
///
/// Events are pushed by the owner with the `emit_*` methods, stack frames and
/// variables are whatever was last set. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    bus: EventBus,
    calls: RefCell<Vec<EngineCall>>,
    started_with: RefCell<Vec<Breakpoint>>,
    resolved_rows: RefCell<FxHashMap<BreakpointLocation, BufferRow>>,
    frames: RefCell<Vec<StackFrame>>,
    variables: RefCell<Vec<Variable>>,
    selected_frame: Cell<usize>,
    running: Cell<bool>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the breakpoint at `location` as moved to `row` when the session starts.
    pub fn resolve_to(&self, location: BreakpointLocation, row: BufferRow) {
        self.resolved_rows.borrow_mut().insert(location, row);
    }

    pub fn set_call_stack(&self, frames: Vec<StackFrame>) {
        *self.frames.borrow_mut() = frames;
    }

    pub fn set_variables(&self, variables: Vec<Variable>) {
        *self.variables.borrow_mut() = variables;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.borrow().clone()
    }

    pub fn started_with(&self) -> Vec<Breakpoint> {
        self.started_with.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.bus.subscriber_count(channel)
    }

    pub fn emit_breakpoint_event(&self, event: &BreakpointEvent) {
        self.bus.breakpoint().emit(event);
    }

    pub fn emit_session_event(&self, event: &SessionEvent) {
        if event.is_terminated() {
            self.running.set(false);
        }
        self.bus.session().emit(event);
    }

    pub fn emit_target_event(&self, event: &TargetEvent) {
        self.bus.target().emit(event);
    }

    fn record(&self, call: EngineCall) {
        debug!(call = ?call, "Engine call");
        self.calls.borrow_mut().push(call);
    }

    fn stopped(&self, reason: &str) {
        if self.running.get() {
            self.emit_session_event(&SessionEvent::Stopped {
                reason: reason.to_string(),
                description: None,
            });
        }
    }
}

impl DebugEngine for ScriptedEngine {
    fn start(&self, target: &Target, breakpoints: &[Breakpoint]) {
        self.record(EngineCall::Start {
            program: target.program.display().to_string(),
            breakpoints: breakpoints.len(),
        });
        *self.started_with.borrow_mut() = breakpoints.to_vec();
        self.running.set(true);
        self.emit_session_event(&SessionEvent::Started);

        let moved = breakpoints
            .iter()
            .filter(|bp| bp.enabled)
            .filter_map(|bp| {
                self.resolved_rows
                    .borrow()
                    .get(&bp.location)
                    .map(|row| BreakpointEvent::moved(bp.clone(), Some(*row)))
            })
            .collect::<Vec<_>>();
        for event in moved {
            self.emit_breakpoint_event(&event);
        }
    }

    fn stop(&self) {
        self.record(EngineCall::Stop);
        if self.running.get() {
            self.emit_session_event(&SessionEvent::Terminated);
        }
    }

    fn pause(&self) {
        self.record(EngineCall::Pause);
        self.stopped("pause");
    }

    fn resume(&self) {
        self.record(EngineCall::Resume);
        if self.running.get() {
            self.emit_session_event(&SessionEvent::Resumed);
        }
    }

    fn step_into(&self) {
        self.record(EngineCall::StepInto);
        self.stopped("step");
    }

    fn step_over(&self) {
        self.record(EngineCall::StepOver);
        self.stopped("step");
    }

    fn set_selected_frame(&self, level: usize) {
        self.record(EngineCall::SetSelectedFrame(level));
        self.selected_frame.set(level);
    }

    fn call_stack(&self) -> EngineResult<Vec<StackFrame>> {
        self.record(EngineCall::CallStack);
        let result = if self.running.get() {
            Ok(self.frames.borrow().clone())
        } else {
            Err(EngineError::NotRunning)
        };
        future::ready(result).boxed_local()
    }

    fn selected_frame(&self) -> EngineResult<StackFrame> {
        self.record(EngineCall::SelectedFrame);
        let level = self.selected_frame.get();
        let result = if self.running.get() {
            self.frames
                .borrow()
                .iter()
                .find(|frame| frame.level == level)
                .cloned()
                .ok_or_else(|| EngineError::Request(format!("no frame at level {}", level)))
        } else {
            Err(EngineError::NotRunning)
        };
        future::ready(result).boxed_local()
    }

    fn variable_list(&self) -> EngineResult<Vec<Variable>> {
        self.record(EngineCall::VariableList);
        let result = if self.running.get() {
            Ok(self.variables.borrow().clone())
        } else {
            Err(EngineError::NotRunning)
        };
        future::ready(result).boxed_local()
    }

    fn on_breakpoint_event(&self, handler: Box<dyn Fn(&BreakpointEvent)>) -> Subscription {
        self.bus.breakpoint().subscribe(handler)
    }

    fn on_session_event(&self, handler: Box<dyn Fn(&SessionEvent)>) -> Subscription {
        self.bus.session().subscribe(handler)
    }

    fn on_target_event(&self, handler: Box<dyn Fn(&TargetEvent)>) -> Subscription {
        self.bus.target().subscribe(handler)
    }
}
