use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::Message;

#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub text: String,
    pub command: String,
    #[serde(rename = "targetId")]
    pub target_id: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
}

impl InboundFrame {
    /// `text` 0..500; `command` 1..50; `targetId` 1..50; `roomId` 1..50.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.text.chars().count() > 500 {
            return Err(AppError::Validation("text must be at most 500 characters".into()));
        }
        if self.command.is_empty() || self.command.chars().count() > 50 {
            return Err(AppError::Validation("command must be 1..50 characters".into()));
        }
        if self.target_id.is_empty() || self.target_id.chars().count() > 50 {
            return Err(AppError::Validation("targetId must be 1..50 characters".into()));
        }
        if self.room_id.is_empty() || self.room_id.chars().count() > 50 {
            return Err(AppError::Validation("roomId must be 1..50 characters".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Message(Message),
    Error { command: String, error: String },
}

impl OutboundFrame {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("OutboundFrame always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_at_500_is_valid() {
        let frame = InboundFrame {
            text: "x".repeat(500),
            command: "CreateMessage".to_string(),
            target_id: "r1".to_string(),
            room_id: "r1".to_string(),
        };
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn text_over_500_is_rejected() {
        let frame = InboundFrame {
            text: "x".repeat(501),
            command: "CreateMessage".to_string(),
            target_id: "r1".to_string(),
            room_id: "r1".to_string(),
        };
        assert!(matches!(frame.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn empty_command_is_rejected() {
        let frame = InboundFrame {
            text: "hi".to_string(),
            command: "".to_string(),
            target_id: "r1".to_string(),
            room_id: "r1".to_string(),
        };
        assert!(matches!(frame.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn error_frame_serializes_with_bare_command_and_error_fields() {
        let frame = OutboundFrame::Error {
            command: "Error".to_string(),
            error: "user is not in room".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["command"], "Error");
        assert_eq!(json["error"], "user is not in room");
    }
}
