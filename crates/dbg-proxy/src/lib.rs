//! `dbg-proxy` is the session and breakpoint coordination layer of a debugger front-end.
//!
//! It tracks user breakpoints, runs at most one debug engine at a time and
//! republishes the engine's breakpoint, session and target events to observers.
//!
//! ## Examples
//!
//! ```rust
//! use std::rc::Rc;
//! use dbg_proxy::{Breakpoint, BreakpointLocation, DebuggerProxy, ScriptedEngine, SessionEvent, Target};
//!
//! let proxy = DebuggerProxy::default();
//! proxy.insert(Breakpoint::new(BreakpointLocation::new("a.js", 10)));
//!
//! let engine = Rc::new(ScriptedEngine::new());
//! proxy.start_session(&Target::new("app.js"), engine.clone()).unwrap();
//! assert!(proxy.is_running());
//!
//! engine.emit_session_event(&SessionEvent::Terminated);
//! assert!(proxy.active_session().is_none());
//! ```
pub mod breakpoint;
pub mod bus;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod log;
pub mod proxy;
pub mod replay;
pub mod scripted;

pub use breakpoint::{Breakpoint, BreakpointLocation, BufferRow};
pub use bus::{Channel, Emitter, EventBus, Subscription};
pub use config::{ProxyConfig, StartPolicy};
pub use engine::{DebugEngine, EngineResult, StackFrame, Target, Variable};
pub use error::{ConfigError, EngineError, ProxyError};
pub use event::{BreakpointEvent, BreakpointEventKind, SessionEvent, TargetEvent};
pub use proxy::{DebuggerProxy, ProxyResult};
pub use scripted::{EngineCall, ScriptedEngine};
