//! IDE-facing projections of backend data.

/// The single synthetic execution context. The backend models one
/// program, so the session always reports exactly one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

/// A stack frame projected for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    /// Display-friendly file name (final path component).
    pub source_name: Option<String>,
    /// Full path as reported by the backend.
    pub source_path: Option<String>,
    pub line: u64,
    pub column: u64,
    pub pc: Option<u64>,
}

/// Result of one breakpoint request within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: Option<i64>,
    pub verified: bool,
    pub line: u64,
    pub pc: Option<u64>,
}

/// A named, expandable variable grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub name: &'static str,
    pub variables_reference: i64,
    pub expensive: bool,
}

/// One inspectable value. Flat: no nested expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub ty: Option<String>,
}
