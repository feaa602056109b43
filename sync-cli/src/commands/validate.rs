//! Check join-form input.

use anyhow::{bail, Result};
use codesync_core::{validate_join, JoinField, ValidationErrors};
use serde::Serialize;

/// Machine-readable validation result.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Report {
    /// True when a join request would be sent.
    pub valid: bool,
    /// Username after validation (only when valid).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Room id after validation (only when valid).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Field errors, in form order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldReport>,
    /// Field the join form would focus.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<&'static str>,
}

/// One field error.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FieldReport {
    /// `username` or `room_id`.
    pub field: &'static str,
    /// User-facing message.
    pub message: &'static str,
}

fn field_key(field: JoinField) -> &'static str {
    match field {
        JoinField::Username => "username",
        JoinField::RoomId => "room_id",
    }
}

/// Build the report for one (username, room) pair.
pub fn report(username: &str, room: &str) -> Report {
    match validate_join(username, room) {
        Ok(identity) => Report {
            valid: true,
            username: Some(identity.username),
            room_id: Some(identity.room_id.to_string()),
            errors: Vec::new(),
            focus: None,
        },
        Err(errors) => failed(&errors),
    }
}

fn failed(errors: &ValidationErrors) -> Report {
    Report {
        valid: false,
        username: None,
        room_id: None,
        errors: errors
            .iter()
            .map(|e| FieldReport {
                field: field_key(e.field),
                message: e.message,
            })
            .collect(),
        focus: errors.focus().map(field_key),
    }
}

/// Run the validate command. Fails when the input is invalid.
pub fn run(username: &str, room: &str, json: bool) -> Result<()> {
    let report = report(username, room);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.valid {
        println!("OK: {} may join {}", username, room);
    } else {
        for error in &report.errors {
            println!("{}: {}", error.field, error.message);
        }
    }

    if !report.valid {
        bail!("invalid join input ({} field errors)", report.errors.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_input_reports_identity() {
        let report = report("alice", "room-42");

        assert!(report.valid);
        assert_eq!(report.username.as_deref(), Some("alice"));
        assert_eq!(report.room_id.as_deref(), Some("room-42"));
        assert!(report.focus.is_none());
    }

    #[test]
    fn both_fields_fail_and_room_gets_focus() {
        let report = report("al", "room");

        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].field, "username");
        assert_eq!(report.focus, Some("room_id"));
    }

    #[test]
    fn json_omits_empty_fields() {
        let json = serde_json::to_value(report("alice", "room-42")).unwrap();

        assert_eq!(json["valid"], true);
        assert!(json.get("errors").is_none());
        assert!(json.get("focus").is_none());
    }

    #[test]
    fn run_fails_on_invalid_input() {
        assert!(run("alice", "room-42", true).is_ok());
        assert!(run("", "", false).is_err());
    }
}
