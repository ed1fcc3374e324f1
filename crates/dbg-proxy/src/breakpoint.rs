use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{Hash, Hasher},
    path::PathBuf,
};

pub type BufferRow = u32;

/// Static position of a breakpoint in a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BreakpointLocation {
    /// Source path the breakpoint belongs to
    pub path: PathBuf,
    /// Buffer row, `None` when the location is not bound to a row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<BufferRow>,
    /// Column within the row (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl BreakpointLocation {
    pub fn new(path: impl Into<PathBuf>, row: BufferRow) -> Self {
        Self {
            path: path.into(),
            row: Some(row),
            column: None,
        }
    }

    /// A location bound to a source but not to any row.
    pub fn unbound(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            row: None,
            column: None,
        }
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }
}

impl fmt::Display for BreakpointLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        match (self.row, self.column) {
            (Some(row), Some(column)) => write!(f, ":{}:{}", row, column),
            (Some(row), None) => write!(f, ":{}", row),
            (None, Some(column)) => write!(f, ":-:{}", column),
            (None, None) => Ok(()),
        }
    }
}

/// Represents a user-configured breakpoint.
///
/// Identity is the [`BreakpointLocation`]: two breakpoints at the same location
/// compare equal whatever their flags, condition or active row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Breakpoint {
    pub location: BreakpointLocation,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Row the engine resolved this breakpoint to while a session is live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_buffer_row: Option<BufferRow>,
}

impl Breakpoint {
    pub fn new(location: BreakpointLocation) -> Self {
        Self {
            location,
            enabled: true,
            condition: None,
            active_buffer_row: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Row the breakpoint is currently displayed at.
    pub fn display_row(&self) -> Option<BufferRow> {
        self.active_buffer_row.or(self.location.row)
    }
}

impl PartialEq for Breakpoint {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

impl Eq for Breakpoint {}

impl Hash for Breakpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
    }
}

impl From<BreakpointLocation> for Breakpoint {
    fn from(location: BreakpointLocation) -> Self {
        Self::new(location)
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)?;
        if let Some(row) = self.active_buffer_row {
            write!(f, " (at {})", row)?;
        }
        if let Some(condition) = &self.condition {
            write!(f, " if {}", condition)?;
        }
        if !self.enabled {
            write!(f, " (disabled)")?;
        }
        Ok(())
    }
}
