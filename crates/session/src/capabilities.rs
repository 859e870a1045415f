//! The fixed capability contract advertised to the IDE.
//!
//! Every session advertises the same surface; there is no conditional
//! feature detection against the backend.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: bool,
    pub supports_evaluate_for_hovers: bool,
    pub supports_data_breakpoints: bool,
    pub supports_completions_request: bool,
    pub completion_trigger_characters: Vec<String>,
    pub supports_cancel_request: bool,
    pub supports_breakpoint_locations_request: bool,
    pub supports_exception_filter_options: bool,
    pub exception_breakpoint_filters: Vec<ExceptionBreakpointFilter>,
    pub supports_exception_info_request: bool,
    pub supports_set_variable: bool,
    pub supports_set_expression: bool,
    pub supports_disassemble_request: bool,
    pub supports_stepping_granularity: bool,
    pub supports_instruction_breakpoints: bool,
    pub supports_read_memory_request: bool,
    pub supports_write_memory_request: bool,
    pub support_suspend_debuggee: bool,
    pub support_terminate_debuggee: bool,
    pub supports_function_breakpoints: bool,
    pub supports_delayed_stack_trace_loading: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionBreakpointFilter {
    pub filter: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_condition: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_description: Option<String>,
}

impl Capabilities {
    /// The surface advertised by every session.
    pub fn advertised() -> Self {
        Self {
            supports_configuration_done_request: true,
            supports_evaluate_for_hovers: true,
            supports_data_breakpoints: true,
            supports_completions_request: true,
            completion_trigger_characters: vec![".".to_string(), "[".to_string()],
            supports_cancel_request: true,
            supports_breakpoint_locations_request: true,
            supports_exception_filter_options: true,
            exception_breakpoint_filters: vec![
                ExceptionBreakpointFilter {
                    filter: "all".to_string(),
                    label: "All Faults".to_string(),
                    supports_condition: Some(false),
                    condition_description: None,
                },
                ExceptionBreakpointFilter {
                    filter: "conditional".to_string(),
                    label: "Conditional Fault".to_string(),
                    supports_condition: Some(true),
                    condition_description: Some(
                        "Break when the condition evaluates to true".to_string(),
                    ),
                },
            ],
            supports_exception_info_request: true,
            supports_set_variable: true,
            supports_set_expression: true,
            supports_disassemble_request: true,
            supports_stepping_granularity: true,
            supports_instruction_breakpoints: true,
            supports_read_memory_request: true,
            supports_write_memory_request: true,
            support_suspend_debuggee: true,
            support_terminate_debuggee: true,
            supports_function_breakpoints: true,
            supports_delayed_stack_trace_loading: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_keys() {
        let value = serde_json::to_value(Capabilities::advertised()).unwrap();
        assert_eq!(value["supportsConfigurationDoneRequest"], true);
        assert_eq!(value["supportsReadMemoryRequest"], true);
        assert_eq!(value["supportTerminateDebuggee"], true);
    }

    #[test]
    fn advertises_two_exception_filters_one_conditional() {
        let capabilities = Capabilities::advertised();
        let filters = &capabilities.exception_breakpoint_filters;
        assert_eq!(filters.len(), 2);
        assert_eq!(
            filters
                .iter()
                .filter(|f| f.supports_condition == Some(true))
                .count(),
            1
        );
    }
}
