//! Wire protocol: one enum per direction, framed as
//! `{"type": "<EVENT>", "payload": {...}}`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warp::ws::Message;

use crate::store::{PromptKind, SavedPrompt, SessionStatus};

use super::admin::AdminSnapshot;

/// Commands from clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { join_code: String },

    TeacherStartClass,

    #[serde(rename_all = "camelCase")]
    TeacherRejoin { join_code: String },

    #[serde(rename_all = "camelCase")]
    TeacherSendPrompt {
        join_code: String,
        content: String,
        #[serde(rename = "type")]
        kind: PromptKind,
        #[serde(default)]
        options: Option<Vec<String>>,
    },

    #[serde(rename_all = "camelCase")]
    TeacherDeleteThought {
        join_code: String,
        thought_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    TeacherReassignDistribution {
        join_code: String,
        student_connection_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    TeacherResetState { join_code: String },

    #[serde(rename_all = "camelCase")]
    TriggerSwap { join_code: String },

    #[serde(rename_all = "camelCase")]
    EndSession { join_code: String },

    #[serde(rename_all = "camelCase")]
    UpdateSessionSettings {
        join_code: String,
        max_swap_requests: u32,
    },

    #[serde(rename_all = "camelCase")]
    SubmitThought {
        join_code: String,
        content: String,
        prompt_use_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    StudentRequestNewThought {
        join_code: String,
        current_thought_content: String,
    },

    #[serde(rename_all = "camelCase")]
    UpdateConsent { consent_given: bool },

    #[serde(rename_all = "camelCase")]
    SavePrompt {
        content: String,
        #[serde(rename = "type")]
        kind: PromptKind,
        #[serde(default)]
        options: Option<Vec<String>>,
    },

    GetSavedPrompts,

    #[serde(rename_all = "camelCase")]
    DeleteSavedPrompt { prompt_id: Uuid },

    AdminJoin,

    AdminGetData,

    GetPreviousSessions,
}

/// Notifications to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    AuthError { message: String },

    #[serde(rename_all = "camelCase")]
    ConsentStatus {
        consent_given: bool,
        consent_date: Option<DateTime<Utc>>,
    },

    #[serde(rename_all = "camelCase")]
    ClassStarted {
        join_code: String,
        session_id: Uuid,
        max_swap_requests: u32,
    },

    #[serde(rename_all = "camelCase")]
    JoinSuccess { join_code: String },

    #[serde(rename_all = "camelCase")]
    ParticipantsUpdate {
        participants: Vec<ParticipantInfo>,
        submission_count: usize,
    },

    #[serde(rename_all = "camelCase")]
    ThoughtsUpdate { thoughts: Vec<ThoughtInfo> },

    #[serde(rename_all = "camelCase")]
    DistributionUpdate {
        distribution: HashMap<Uuid, DistributionEntry>,
    },

    #[serde(rename_all = "camelCase")]
    NewPrompt {
        content: String,
        prompt_use_id: Uuid,
        #[serde(rename = "type")]
        kind: PromptKind,
        options: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    ReceiveSwap { content: String },

    #[serde(rename_all = "camelCase")]
    SwapCompleted { count: usize },

    #[serde(rename_all = "camelCase")]
    RestoreState {
        status: RestoreStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt_use_id: Option<Uuid>,
        #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
        kind: Option<PromptKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
    },

    #[serde(rename_all = "camelCase")]
    ThoughtDeleted { message: String },

    #[serde(rename_all = "camelCase")]
    SessionEnded {
        #[serde(skip_serializing_if = "Option::is_none")]
        survey_link: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    SavedPromptsList { prompts: Vec<SavedPrompt> },

    #[serde(rename_all = "camelCase")]
    PreviousSessions { sessions: Vec<PreviousSessionInfo> },

    AdminDataUpdate(AdminSnapshot),

    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub connection_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtInfo {
    pub id: Uuid,
    pub content: String,
    pub author_name: String,
}

/// Teacher-visible view of one distribution slot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionEntry {
    pub student_name: String,
    pub thought_content: String,
    pub original_author_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestoreStatus {
    Idle,
    Submitted,
    Discussing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousSessionInfo {
    pub session_id: Uuid,
    pub course_title: String,
    pub join_code: String,
    pub status: SessionStatus,
    pub prompts: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ServerEvent {
    /// Serialize into a text frame for the outbox.
    pub fn to_frame(&self) -> crate::error::Result<Message> {
        let text = serde_json::to_string(self)?;
        Ok(Message::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frames_parse() {
        let frame = r#"{"type":"JOIN_ROOM","payload":{"joinCode":"abc123"}}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { join_code } if join_code == "abc123"));

        let frame = r#"{"type":"TEACHER_START_CLASS"}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(event, ClientEvent::TeacherStartClass));

        let frame = r#"{"type":"TEACHER_SEND_PROMPT","payload":{"joinCode":"ABC123","content":"Pick one","type":"MC","options":["a","b"]}}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        match event {
            ClientEvent::TeacherSendPrompt { kind, options, .. } => {
                assert_eq!(kind, PromptKind::Mc);
                assert_eq!(options.unwrap().len(), 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_server_frame_shape() {
        let event = ServerEvent::NewPrompt {
            content: "Why?".to_string(),
            prompt_use_id: Uuid::nil(),
            kind: PromptKind::Text,
            options: vec![],
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "NEW_PROMPT");
        assert_eq!(json["payload"]["content"], "Why?");
        assert_eq!(json["payload"]["type"], "TEXT");
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        let frame = r#"{"type":"NOT_A_REAL_EVENT","payload":{}}"#;
        assert!(serde_json::from_str::<ClientEvent>(frame).is_err());
    }
}
