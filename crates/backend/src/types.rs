//! Typed response payloads for the backend's commands.
//!
//! Each struct mirrors the `data` object of one backend response. The
//! client deserializes payloads eagerly so callers never touch raw JSON.

use std::collections::HashMap;

use serde::Deserialize;

/// One execution stack frame reported by `getStackFrames`.
#[derive(Debug, Clone, Deserialize)]
pub struct StackFrame {
    pub index: i64,
    pub name: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub column: Option<u64>,
    /// Program counter of the frame, in instruction slots.
    #[serde(rename = "instruction", default)]
    pub pc: Option<u64>,
}

/// One machine register reported by `getRegisters`.
///
/// The value is kept as the backend's rendered string (hex for the
/// general-purpose registers) rather than re-parsed.
#[derive(Debug, Clone, Deserialize)]
pub struct Register {
    pub name: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
}

/// One read-only data entry reported by `getRodata`.
#[derive(Debug, Clone, Deserialize)]
pub struct RodataEntry {
    pub name: String,
    pub address: u64,
    pub value: serde_json::Value,
}

/// A raw memory region reported by `getMemory`.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryRegion {
    pub address: u64,
    pub size: u64,
    #[serde(default)]
    pub data: Vec<u8>,
}

/// Summary of the backend's debug information, reported by `getDebugInfo`.
///
/// Cached by the client when the readiness probe succeeds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfoSummary {
    #[serde(default)]
    pub has_dwarf: bool,
    #[serde(default)]
    pub source_files: Vec<String>,
    /// Function name to entry address.
    #[serde(default)]
    pub functions: HashMap<String, u64>,
}

/// Compute-unit accounting reported by `getComputeUnits` and attached to
/// exit records.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ComputeUnits {
    pub total: u64,
    pub used: u64,
    pub remaining: u64,
}

/// Outcome of a single `setBreakpoint` command.
#[derive(Debug, Clone, Deserialize)]
pub struct SetBreakpointOutcome {
    #[serde(default)]
    pub id: Option<i64>,
    pub line: u64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub pc: Option<u64>,
}

/// Acknowledgement of a `setRegister` command, echoing the applied value.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SetRegisterAck {
    pub index: u64,
    pub value: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stack_frame_pc_comes_from_instruction_field() {
        let frame: StackFrame = serde_json::from_value(json!({
            "index": 0,
            "name": "entrypoint",
            "file": "counter.s",
            "line": 12,
            "instruction": 96,
        }))
        .unwrap();
        assert_eq!(frame.pc, Some(96));
        assert_eq!(frame.column, None);
    }

    #[test]
    fn debug_info_summary_defaults() {
        let summary: DebugInfoSummary = serde_json::from_value(json!({})).unwrap();
        assert!(!summary.has_dwarf);
        assert!(summary.source_files.is_empty());
        assert!(summary.functions.is_empty());
    }

    #[test]
    fn breakpoint_outcome_rejected_line() {
        let outcome: SetBreakpointOutcome = serde_json::from_value(json!({
            "line": 11,
            "verified": false,
        }))
        .unwrap();
        assert!(!outcome.verified);
        assert_eq!(outcome.pc, None);
    }
}
