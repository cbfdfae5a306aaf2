//! Persistent data model for the session server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    /// Identity at the external LMS; synthesized for guests, None never occurs
    /// for LMS-authenticated users
    pub external_id: Option<String>,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub consent_given: bool,
    pub consent_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Identity fields written on (re-)authentication
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub external_id: Option<String>,
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptKind {
    Text,
    Mc,
    Scale,
}

/// A reusable teacher-owned prompt template
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPrompt {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: PromptKind,
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Container for the lifetime of a single classroom instance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub title: String,
    pub join_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub course_id: Uuid,
    pub status: SessionStatus,
    /// Re-swap quota per student for this session
    pub max_swap_requests: u32,
    pub created_at: DateTime<Utc>,
}

/// The act of issuing a prompt inside a session. Immutable once created.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptUse {
    pub id: Uuid,
    pub session_id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: PromptKind,
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thought {
    pub id: Uuid,
    pub prompt_use_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A thought joined with its author's display name, the shape the room and
/// the swap engine consume
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtWithAuthor {
    pub id: Uuid,
    pub prompt_use_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry for one student-initiated re-swap
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogKind {
    UserConnect,
    JoinRoom,
    SendPrompt,
    SubmitThought,
    TriggerSwap,
    RequestReswap,
    DeleteThought,
    EndSession,
    SessionAutoEnded,
    AdminGetData,
    UpdateConsent,
    UpdateSettings,
    ResetState,
    StartClass,
}

/// Append-only audit record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub id: Uuid,
    pub event: LogKind,
    pub user_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: usize,
    pub total_consented: usize,
}
