//! Testing utilities for the transport layer.
//!
//! This module provides helpers for constructing raw backend output,
//! useful for feeding a [`BackendReader`](crate::BackendReader) or a
//! mock backend in tests.

use serde::Serialize;

use crate::message::{RequestId, Response};

/// Serialize a record as one newline-terminated wire line.
///
/// # Example
///
/// ```
/// use transport::testing::raw_line;
/// use serde_json::json;
///
/// let bytes = raw_line(&json!({"success": true, "requestId": 1}));
/// assert!(bytes.ends_with(b"\n"));
/// ```
pub fn raw_line(record: &impl Serialize) -> Vec<u8> {
    let mut bytes = serde_json::to_vec(record).expect("failed to serialize record");
    bytes.push(b'\n');
    bytes
}

/// Serialize multiple records as concatenated wire lines.
pub fn raw_lines<T: Serialize>(records: &[T]) -> Vec<u8> {
    records.iter().flat_map(|r| raw_line(r)).collect()
}

/// Build a successful response record for the given request.
pub fn ok_response(request_id: RequestId, data: serde_json::Value) -> Response {
    Response {
        success: true,
        data: Some(data),
        error: None,
        request_id: Some(request_id),
    }
}

/// Build a failed response record for the given request.
pub fn err_response(request_id: RequestId, error: impl Into<String>) -> Response {
    Response {
        success: false,
        data: None,
        error: Some(error.into()),
        request_id: Some(request_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_line_is_newline_terminated() {
        let bytes = raw_line(&json!({"success": true}));
        assert_eq!(bytes, b"{\"success\":true}\n");
    }

    #[test]
    fn raw_lines_concatenates() {
        let bytes = raw_lines(&[json!({"success": true}), json!({"success": false})]);
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 2);
    }

    #[test]
    fn response_builders() {
        let ok = ok_response(3, json!({"type": "step"}));
        assert!(ok.success);
        assert_eq!(ok.payload_tag(), Some("step"));

        let err = err_response(4, "no such register");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("no such register"));
    }
}
