//! Projection of backend state into IDE scopes and variables.
//!
//! Nothing here is cached: registers and read-only data are fetched
//! from the backend on every expansion, so the IDE always sees the
//! values current at the stop.

use backend::BackendClient;

use crate::error::SessionError;
use crate::types::{Scope, Variable};

pub const REGISTERS_REFERENCE: i64 = 1;
pub const RODATA_REFERENCE: i64 = 2;
pub const COMPUTE_UNITS_REFERENCE: i64 = 3;

/// The three fixed scopes every stop exposes.
pub(crate) fn scopes() -> Vec<Scope> {
    vec![
        Scope {
            name: "Registers",
            variables_reference: REGISTERS_REFERENCE,
            expensive: false,
        },
        Scope {
            name: "Read-only Data",
            variables_reference: RODATA_REFERENCE,
            expensive: false,
        },
        Scope {
            name: "Compute Units",
            variables_reference: COMPUTE_UNITS_REFERENCE,
            expensive: false,
        },
    ]
}

pub(crate) async fn variables(
    client: &BackendClient,
    reference: i64,
) -> Result<Vec<Variable>, SessionError> {
    match reference {
        REGISTERS_REFERENCE => {
            let registers = client.get_registers().await?;
            Ok(registers
                .into_iter()
                .map(|r| Variable {
                    name: r.name,
                    value: r.value,
                    ty: r.ty,
                })
                .collect())
        }
        RODATA_REFERENCE => {
            let rodata = client.get_rodata().await?;
            Ok(rodata
                .into_iter()
                .map(|entry| Variable {
                    name: entry.name,
                    value: render_json(&entry.value),
                    ty: Some(format!("rodata @ {:#x}", entry.address)),
                })
                .collect())
        }
        COMPUTE_UNITS_REFERENCE => {
            let units = client.get_compute_units().await?;
            Ok(vec![
                Variable {
                    name: "Total".to_string(),
                    value: units.total.to_string(),
                    ty: Some("u64".to_string()),
                },
                Variable {
                    name: "Used".to_string(),
                    value: units.used.to_string(),
                    ty: Some("u64".to_string()),
                },
                Variable {
                    name: "Remaining".to_string(),
                    value: units.remaining.to_string(),
                    ty: Some("u64".to_string()),
                },
            ])
        }
        other => Err(SessionError::Validation(format!(
            "unknown variable scope: {other}"
        ))),
    }
}

/// Write a register. Only the Registers scope supports mutation; name
/// and value are validated locally before the backend is contacted.
pub(crate) async fn set_variable(
    client: &BackendClient,
    reference: i64,
    name: &str,
    value: &str,
) -> Result<Variable, SessionError> {
    if reference != REGISTERS_REFERENCE {
        return Err(SessionError::Validation(format!(
            "variables in this scope are read-only: {name}"
        )));
    }
    let index = parse_register_name(name)?;
    let parsed = parse_register_value(value)?;
    let ack = client.set_register(index, parsed).await?;
    Ok(Variable {
        name: format!("r{}", ack.index),
        value: format!("{:#x}", ack.value),
        ty: Some("u64".to_string()),
    })
}

fn parse_register_name(name: &str) -> Result<u64, SessionError> {
    name.strip_prefix('r')
        // Digits only: `parse` alone would also accept a leading `+`.
        .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|rest| rest.parse().ok())
        .ok_or_else(|| SessionError::Validation(format!("not a writable register: {name}")))
}

fn parse_register_value(value: &str) -> Result<u64, SessionError> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| SessionError::Validation(format!("not a numeric value: {value}")))
}

fn render_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_names() {
        assert_eq!(parse_register_name("r0").unwrap(), 0);
        assert_eq!(parse_register_name("r10").unwrap(), 10);
        assert!(matches!(
            parse_register_name("pc"),
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            parse_register_name("r"),
            Err(SessionError::Validation(_))
        ));
        // Sign characters are not part of a register name even though
        // integer parsing would tolerate them.
        assert!(matches!(
            parse_register_name("r+3"),
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            parse_register_name("r-1"),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn register_values_hex_and_decimal() {
        assert_eq!(parse_register_value("0x2A").unwrap(), 42);
        assert_eq!(parse_register_value("42").unwrap(), 42);
        assert!(matches!(
            parse_register_value("abc"),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn fixed_scope_set() {
        let scopes = scopes();
        assert_eq!(scopes.len(), 3);
        assert_eq!(scopes[0].name, "Registers");
        assert!(scopes.iter().all(|s| !s.expensive));
    }
}
