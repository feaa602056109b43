//! Client-side join validation.
//!
//! A join request only reaches the channel once both fields pass these
//! checks. Failures are reported per field so the join form can show each
//! message next to its input; nothing is sent to the server.

use codesync_types::RoomId;
use std::fmt;
use thiserror::Error;

/// Minimum username length, in characters.
pub const USERNAME_MIN_CHARS: usize = 3;
/// Maximum username length, in characters.
pub const USERNAME_MAX_CHARS: usize = 20;
/// Minimum room id length, in characters.
pub const ROOM_ID_MIN_CHARS: usize = 5;

/// The join form field an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinField {
    /// The username input.
    Username,
    /// The room id input.
    RoomId,
}

impl fmt::Display for JoinField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinField::Username => f.write_str("username"),
            JoinField::RoomId => f.write_str("room id"),
        }
    }
}

/// A single field-scoped validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field that failed.
    pub field: JoinField,
    /// User-facing message.
    pub message: &'static str,
}

/// All validation failures of one join attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid join request: {}", summary(.errors))]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

fn summary(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    /// The error for one field, if that field failed.
    pub fn for_field(&self, field: JoinField) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.field == field)
    }

    /// Iterate over all failures.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// Number of failing fields.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True when no field failed.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The field the form should focus: room id first, then username.
    pub fn focus(&self) -> Option<JoinField> {
        if self.for_field(JoinField::RoomId).is_some() {
            Some(JoinField::RoomId)
        } else if self.for_field(JoinField::Username).is_some() {
            Some(JoinField::Username)
        } else {
            None
        }
    }
}

/// A validated (username, room) pair, ready to be sent in a join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Display name.
    pub username: String,
    /// Target room.
    pub room_id: RoomId,
}

/// Validate join input.
///
/// Lengths are counted in Unicode scalar values, so a three-letter
/// accented name is accepted even though it takes more than three bytes.
pub fn validate_join(username: &str, room_id: &str) -> Result<Identity, ValidationErrors> {
    let mut errors = Vec::new();

    let name_len = username.chars().count();
    if name_len == 0 {
        errors.push(FieldError {
            field: JoinField::Username,
            message: "Username is required",
        });
    } else if name_len < USERNAME_MIN_CHARS {
        errors.push(FieldError {
            field: JoinField::Username,
            message: "Username must be at least 3 characters",
        });
    } else if name_len > USERNAME_MAX_CHARS {
        errors.push(FieldError {
            field: JoinField::Username,
            message: "Username must be less than 20 characters",
        });
    }

    let room_len = room_id.chars().count();
    if room_len == 0 {
        errors.push(FieldError {
            field: JoinField::RoomId,
            message: "Room ID is required",
        });
    } else if room_len < ROOM_ID_MIN_CHARS {
        errors.push(FieldError {
            field: JoinField::RoomId,
            message: "Room ID must be at least 5 characters",
        });
    }

    if errors.is_empty() {
        Ok(Identity {
            username: username.to_string(),
            room_id: RoomId::new(room_id),
        })
    } else {
        Err(ValidationErrors { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_input_produces_identity() {
        let identity = validate_join("alice", "room-42").unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.room_id, RoomId::new("room-42"));
    }

    #[test]
    fn boundary_lengths_are_accepted() {
        assert!(validate_join("abc", "abcde").is_ok());
        assert!(validate_join(&"a".repeat(20), "abcde").is_ok());
    }

    #[test]
    fn short_username_is_rejected() {
        let errors = validate_join("al", "room-42").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.for_field(JoinField::Username).unwrap().message,
            "Username must be at least 3 characters"
        );
    }

    #[test]
    fn long_username_is_rejected() {
        let errors = validate_join(&"a".repeat(21), "room-42").unwrap_err();
        assert_eq!(
            errors.for_field(JoinField::Username).unwrap().message,
            "Username must be less than 20 characters"
        );
    }

    #[test]
    fn empty_fields_are_required() {
        let errors = validate_join("", "").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.for_field(JoinField::Username).unwrap().message,
            "Username is required"
        );
        assert_eq!(
            errors.for_field(JoinField::RoomId).unwrap().message,
            "Room ID is required"
        );
    }

    #[test]
    fn short_room_id_is_rejected() {
        let errors = validate_join("alice", "room").unwrap_err();
        assert!(errors.for_field(JoinField::Username).is_none());
        assert_eq!(
            errors.for_field(JoinField::RoomId).unwrap().message,
            "Room ID must be at least 5 characters"
        );
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        // "Zoë" is three characters but four bytes
        assert!(validate_join("Zoë", "room-42").is_ok());
        // two characters, six bytes
        assert!(validate_join("日本", "room-42").is_err());
    }

    #[test]
    fn focus_prefers_room_id() {
        let errors = validate_join("a", "r").unwrap_err();
        assert_eq!(errors.focus(), Some(JoinField::RoomId));

        let errors = validate_join("a", "room-42").unwrap_err();
        assert_eq!(errors.focus(), Some(JoinField::Username));
    }

    #[test]
    fn display_lists_every_field() {
        let errors = validate_join("a", "r").unwrap_err();
        let text = errors.to_string();
        assert!(text.contains("username: Username must be at least 3 characters"));
        assert!(text.contains("room id: Room ID must be at least 5 characters"));
    }
}
