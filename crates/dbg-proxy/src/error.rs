use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::breakpoint::BreakpointLocation;

#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum EngineError {
    #[error("Engine request failed: {0}")]
    #[diagnostic(code(dbg_proxy::engine::request))]
    Request(String),
    #[error("Engine is not running")]
    #[diagnostic(code(dbg_proxy::engine::not_running))]
    NotRunning,
}

#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum ProxyError {
    #[error("No debug session in progress")]
    #[diagnostic(
        code(dbg_proxy::no_session),
        help("start a session before inspecting the debuggee")
    )]
    NoSession,
    #[error("A debug session is already in progress")]
    #[diagnostic(
        code(dbg_proxy::session_in_progress),
        help("stop the running session or set `start-policy = \"replace\"`")
    )]
    SessionInProgress,
    #[error("Breakpoint at {location} has no static row to restore")]
    #[diagnostic(code(dbg_proxy::missing_static_row))]
    MissingStaticRow { location: BreakpointLocation },
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Failed to read \"{}\"", path.display())]
    #[diagnostic(code(dbg_proxy::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid scenario: {0}")]
    #[diagnostic(code(dbg_proxy::config::parse))]
    Parse(#[from] toml::de::Error),
    #[error("Invalid scenario: {0}")]
    #[diagnostic(code(dbg_proxy::config::invalid))]
    Invalid(String),
}
