use futures::{
    FutureExt, TryFutureExt,
    future::{self, LocalBoxFuture},
};
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};
use tracing::{debug, error, info, warn};

use crate::breakpoint::{Breakpoint, BreakpointLocation, BufferRow};
use crate::bus::{EventBus, Subscription};
use crate::config::{ProxyConfig, StartPolicy};
use crate::engine::{DebugEngine, StackFrame, Target, Variable};
use crate::error::ProxyError;
use crate::event::{BreakpointEvent, BreakpointEventKind, SessionEvent, TargetEvent};

pub type ProxyResult<T> = LocalBoxFuture<'static, Result<T, ProxyError>>;

enum SessionState {
    Idle,
    Running {
        id: u64,
        engine: Rc<dyn DebugEngine>,
        subscriptions: Vec<Subscription>,
    },
}

struct Inner {
    config: ProxyConfig,
    breakpoints: RefCell<Vec<Breakpoint>>,
    session: RefCell<SessionState>,
    next_session_id: Cell<u64>,
    bus: EventBus,
}

/// Coordinates breakpoints with at most one live debug engine and republishes
/// the engine's events to any number of observers.
///
/// The proxy is a cheap handle; clones share the same state. No `RefCell`
/// borrow is held while an event is published or while the engine is called,
/// so observers and engines may call back into the proxy.
#[derive(Clone)]
pub struct DebuggerProxy {
    inner: Rc<Inner>,
}

impl Default for DebuggerProxy {
    fn default() -> Self {
        Self::new(ProxyConfig::default())
    }
}

impl fmt::Debug for DebuggerProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggerProxy")
            .field("config", &self.inner.config)
            .field("breakpoints", &self.inner.breakpoints.borrow().len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl DebuggerProxy {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                breakpoints: RefCell::new(Vec::new()),
                session: RefCell::new(SessionState::Idle),
                next_session_id: Cell::new(0),
                bus: EventBus::new(),
            }),
        }
    }

    pub fn active_session(&self) -> Option<Rc<dyn DebugEngine>> {
        self.inner.active_engine()
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.inner.session.borrow(), SessionState::Running { .. })
    }

    /// Number of engine subscriptions owned by the running session.
    pub fn session_subscription_count(&self) -> usize {
        match &*self.inner.session.borrow() {
            SessionState::Running { subscriptions, .. } => subscriptions.len(),
            SessionState::Idle => 0,
        }
    }

    /// Start debugging `target` with `engine`.
    ///
    /// The session ends when the engine emits [`SessionEvent::Terminated`].
    pub fn start_session(
        &self,
        target: &Target,
        engine: Rc<dyn DebugEngine>,
    ) -> Result<(), ProxyError> {
        if self.is_running() {
            match self.inner.config.start_policy {
                StartPolicy::Reject => {
                    warn!(program = %target.program.display(), "Session already in progress");
                    return Err(ProxyError::SessionInProgress);
                }
                StartPolicy::Replace => {
                    info!(program = %target.program.display(), "Replacing running session");
                    if let Some(previous) = self.inner.take_session() {
                        let restored = self.inner.restore_breakpoints();
                        previous.stop();
                        restored?;
                    }
                }
            }
        }

        let id = self.inner.next_session_id.get();
        self.inner.next_session_id.set(id + 1);

        let subscriptions = vec![
            self.subscribe_breakpoint_events(&*engine),
            self.subscribe_session_events(&*engine, id),
            self.subscribe_target_events(&*engine),
        ];
        *self.inner.session.borrow_mut() = SessionState::Running {
            id,
            engine: Rc::clone(&engine),
            subscriptions,
        };

        let breakpoints = self.breakpoints();
        info!(
            program = %target.program.display(),
            breakpoints = breakpoints.len(),
            "Starting debug session"
        );
        engine.start(target, &breakpoints);

        Ok(())
    }

    fn subscribe_breakpoint_events(&self, engine: &dyn DebugEngine) -> Subscription {
        let inner = Rc::downgrade(&self.inner);
        engine.on_breakpoint_event(Box::new(move |event: &BreakpointEvent| {
            if let Some(inner) = inner.upgrade() {
                inner.handle_breakpoint_event(event);
            }
        }))
    }

    fn subscribe_session_events(&self, engine: &dyn DebugEngine, session: u64) -> Subscription {
        let inner = Rc::downgrade(&self.inner);
        engine.on_session_event(Box::new(move |event: &SessionEvent| {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if let Err(err) = inner.handle_session_event(session, event) {
                error!(error = %err, "Breakpoint state is inconsistent");
                panic!("failed to restore breakpoints: {err}");
            }
        }))
    }

    fn subscribe_target_events(&self, engine: &dyn DebugEngine) -> Subscription {
        let inner = Rc::downgrade(&self.inner);
        engine.on_target_event(Box::new(move |event: &TargetEvent| {
            if let Some(inner) = inner.upgrade() {
                inner.bus.target().emit(event);
            }
        }))
    }

    /// Insert `breakpoint` unless one already exists at its location.
    pub fn insert(&self, mut breakpoint: Breakpoint) -> bool {
        {
            let mut breakpoints = self.inner.breakpoints.borrow_mut();
            if breakpoints.contains(&breakpoint) {
                return false;
            }
            // The engine reports resolved rows; a new breakpoint starts at its static row.
            breakpoint.active_buffer_row = None;
            breakpoints.push(breakpoint.clone());
        }

        debug!(location = %breakpoint.location, "Breakpoint inserted");
        self.inner
            .bus
            .breakpoint()
            .emit(&BreakpointEvent::new(BreakpointEventKind::Inserted, breakpoint));
        true
    }

    pub fn find(&self, location: &BreakpointLocation) -> Option<Breakpoint> {
        self.inner
            .breakpoints
            .borrow()
            .iter()
            .find(|bp| &bp.location == location)
            .cloned()
    }

    /// Snapshot of all breakpoints in insertion order.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.inner.breakpoints.borrow().clone()
    }

    pub fn remove(&self, breakpoint: &Breakpoint) -> bool {
        let removed = {
            let mut breakpoints = self.inner.breakpoints.borrow_mut();
            let Some(index) = breakpoints.iter().position(|bp| bp == breakpoint) else {
                return false;
            };
            breakpoints.remove(index)
        };

        debug!(location = %removed.location, "Breakpoint removed");
        self.inner
            .bus
            .breakpoint()
            .emit(&BreakpointEvent::new(BreakpointEventKind::Removed, removed));
        true
    }

    pub fn enable(&self, breakpoint: &Breakpoint) -> bool {
        self.update(&breakpoint.location, |bp| {
            if bp.enabled {
                return None;
            }
            bp.enabled = true;
            Some(BreakpointEventKind::Enabled)
        })
    }

    pub fn disable(&self, breakpoint: &Breakpoint) -> bool {
        self.update(&breakpoint.location, |bp| {
            if !bp.enabled {
                return None;
            }
            bp.enabled = false;
            Some(BreakpointEventKind::Disabled)
        })
    }

    pub fn set_condition(&self, breakpoint: &Breakpoint, condition: &str) -> bool {
        self.update(&breakpoint.location, |bp| {
            if bp.condition.as_deref() == Some(condition) {
                return None;
            }
            bp.condition = Some(condition.to_string());
            Some(BreakpointEventKind::ConditionAdded)
        })
    }

    pub fn clear_condition(&self, breakpoint: &Breakpoint) -> bool {
        self.update(&breakpoint.location, |bp| {
            bp.condition.take()?;
            Some(BreakpointEventKind::ConditionRemoved)
        })
    }

    /// Apply `f` to the tracked breakpoint at `location` and publish the event it returns.
    fn update(
        &self,
        location: &BreakpointLocation,
        f: impl FnOnce(&mut Breakpoint) -> Option<BreakpointEventKind>,
    ) -> bool {
        let event = {
            let mut breakpoints = self.inner.breakpoints.borrow_mut();
            let Some(breakpoint) = breakpoints.iter_mut().find(|bp| &bp.location == location)
            else {
                return false;
            };
            f(breakpoint).map(|kind| BreakpointEvent::new(kind, breakpoint.clone()))
        };

        match event {
            Some(event) => {
                debug!(location = %location, kind = %event.kind, "Breakpoint updated");
                self.inner.bus.breakpoint().emit(&event);
                true
            }
            None => false,
        }
    }

    pub fn stop(&self) {
        if let Some(engine) = self.inner.active_engine() {
            debug!("Stopping session");
            engine.stop();
        }
    }

    pub fn resume(&self) {
        if let Some(engine) = self.inner.active_engine() {
            engine.resume();
        }
    }

    pub fn pause(&self) {
        if let Some(engine) = self.inner.active_engine() {
            engine.pause();
        }
    }

    pub fn step_into(&self) {
        if let Some(engine) = self.inner.active_engine() {
            engine.step_into();
        }
    }

    pub fn step_over(&self) {
        if let Some(engine) = self.inner.active_engine() {
            engine.step_over();
        }
    }

    pub fn set_selected_frame(&self, level: usize) {
        if let Some(engine) = self.inner.active_engine() {
            engine.set_selected_frame(level);
        }
    }

    pub fn call_stack(&self) -> ProxyResult<Vec<StackFrame>> {
        match self.inner.active_engine() {
            Some(engine) => engine.call_stack().err_into().boxed_local(),
            None => future::ready(Err(ProxyError::NoSession)).boxed_local(),
        }
    }

    pub fn selected_frame(&self) -> ProxyResult<StackFrame> {
        match self.inner.active_engine() {
            Some(engine) => engine.selected_frame().err_into().boxed_local(),
            None => future::ready(Err(ProxyError::NoSession)).boxed_local(),
        }
    }

    pub fn variable_list(&self) -> ProxyResult<Vec<Variable>> {
        match self.inner.active_engine() {
            Some(engine) => engine.variable_list().err_into().boxed_local(),
            None => future::ready(Err(ProxyError::NoSession)).boxed_local(),
        }
    }

    pub fn on_breakpoint_event(&self, handler: impl Fn(&BreakpointEvent) + 'static) -> Subscription {
        self.inner.bus.breakpoint().subscribe(handler)
    }

    pub fn on_session_event(&self, handler: impl Fn(&SessionEvent) + 'static) -> Subscription {
        self.inner.bus.session().subscribe(handler)
    }

    pub fn on_target_event(&self, handler: impl Fn(&TargetEvent) + 'static) -> Subscription {
        self.inner.bus.target().subscribe(handler)
    }
}

impl Inner {
    fn active_engine(&self) -> Option<Rc<dyn DebugEngine>> {
        match &*self.session.borrow() {
            SessionState::Running { engine, .. } => Some(Rc::clone(engine)),
            SessionState::Idle => None,
        }
    }

    fn handle_breakpoint_event(&self, event: &BreakpointEvent) {
        if let BreakpointEventKind::Moved { buffer_row } = event.kind {
            let mut breakpoints = self.breakpoints.borrow_mut();
            match breakpoints
                .iter_mut()
                .find(|bp| bp.location == event.breakpoint.location)
            {
                Some(breakpoint) => {
                    debug!(location = %breakpoint.location, buffer_row, "Breakpoint moved");
                    breakpoint.active_buffer_row = buffer_row;
                }
                None => {
                    warn!(location = %event.breakpoint.location, "Engine moved an unknown breakpoint");
                }
            }
        }

        self.bus.breakpoint().emit(event);
    }

    fn running_session_id(&self) -> Option<u64> {
        match &*self.session.borrow() {
            SessionState::Running { id, .. } => Some(*id),
            SessionState::Idle => None,
        }
    }

    fn handle_session_event(&self, session: u64, event: &SessionEvent) -> Result<(), ProxyError> {
        self.bus.session().emit(event);

        if event.is_terminated() {
            // An observer may already have replaced this session.
            if self.running_session_id() != Some(session) {
                debug!(session, "Terminated session was already replaced");
                return Ok(());
            }
            info!(session, "Debug session terminated");
            self.end_session()?;
        }

        Ok(())
    }

    /// Move to idle and put every moved breakpoint back at its static row.
    fn end_session(&self) -> Result<(), ProxyError> {
        self.take_session();
        self.restore_breakpoints()
    }

    /// Move to idle and drop the session's subscriptions. Returns the engine that was running.
    fn take_session(&self) -> Option<Rc<dyn DebugEngine>> {
        let SessionState::Running {
            engine,
            subscriptions,
            ..
        } = self.session.replace(SessionState::Idle)
        else {
            return None;
        };

        for subscription in subscriptions {
            subscription.dispose();
        }

        Some(engine)
    }

    fn active_row(&self, location: &BreakpointLocation) -> Option<BufferRow> {
        self.breakpoints
            .borrow()
            .iter()
            .find(|bp| &bp.location == location)
            .and_then(|bp| bp.active_buffer_row)
    }

    fn restore_breakpoints(&self) -> Result<(), ProxyError> {
        let moved = self
            .breakpoints
            .borrow()
            .iter()
            .filter(|bp| bp.active_buffer_row.is_some())
            .cloned()
            .collect::<Vec<_>>();

        for breakpoint in moved {
            let moved_to = breakpoint.active_buffer_row;
            // Observers run between iterations and may have moved or restored it since.
            if self.active_row(&breakpoint.location) != moved_to {
                debug!(location = %breakpoint.location, "Breakpoint changed during restoration");
                continue;
            }

            let row = breakpoint
                .location
                .row
                .ok_or_else(|| ProxyError::MissingStaticRow {
                    location: breakpoint.location.clone(),
                })?;
            debug!(location = %breakpoint.location, row, "Restoring breakpoint");

            let location = breakpoint.location.clone();
            self.bus
                .breakpoint()
                .emit(&BreakpointEvent::moved(breakpoint, Some(row)));

            if let Some(tracked) = self
                .breakpoints
                .borrow_mut()
                .iter_mut()
                .find(|bp| bp.location == location && bp.active_buffer_row == moved_to)
            {
                tracked.active_buffer_row = None;
            }
        }

        Ok(())
    }
}
