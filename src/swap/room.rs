//! Per-room authoritative state for one ACTIVE session.
//!
//! A Room owns only identifiers into the store and the connection table;
//! participants know the join code, never the Room itself.

use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{Result, SwapError};
use crate::store::{PromptKind, Role};

use super::events::{DistributionEntry, ParticipantInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingSubmissions,
    Swapped,
}

/// The prompt currently in play for the room
#[derive(Debug, Clone)]
pub struct ActivePrompt {
    pub id: Uuid,
    pub content: String,
    pub kind: PromptKind,
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
}

/// One recipient's entry in the current distribution. Keyed by userId so a
/// reconnect inside a session recovers the same received thought; the
/// connection id is rebound on rejoin for fan-out.
#[derive(Debug, Clone)]
pub struct DistributionSlot {
    pub connection_id: Uuid,
    pub student_name: String,
    pub content: String,
    pub author_user_id: Uuid,
    pub author_name: String,
}

pub struct Room {
    pub join_code: String,
    pub session_id: Uuid,
    pub course_id: Uuid,
    pub teacher_id: Uuid,
    state: Mutex<RoomState>,
}

pub struct RoomState {
    pub phase: Phase,
    pub prompt: Option<ActivePrompt>,
    pub participants: HashMap<Uuid, Participant>,
    pub distribution: HashMap<Uuid, DistributionSlot>,
    pub max_swap_requests: u32,
    /// The teacher's live connection, if any
    pub teacher_connection: Option<Uuid>,
    /// Bumped on every teacher (re)join; a pending auto-end gives up when the
    /// epoch it captured is stale
    pub teacher_epoch: u64,
}

impl Room {
    pub fn new(
        join_code: String,
        session_id: Uuid,
        course_id: Uuid,
        teacher_id: Uuid,
        max_swap_requests: u32,
    ) -> Self {
        Self {
            join_code,
            session_id,
            course_id,
            teacher_id,
            state: Mutex::new(RoomState {
                phase: Phase::Idle,
                prompt: None,
                participants: HashMap::new(),
                distribution: HashMap::new(),
                max_swap_requests,
                teacher_connection: None,
                teacher_epoch: 0,
            }),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().await
    }
}

impl RoomState {
    pub fn add_participant(&mut self, participant: Participant) {
        self.participants
            .insert(participant.connection_id, participant);
    }

    pub fn remove_participant(&mut self, connection_id: Uuid) -> Option<Participant> {
        self.participants.remove(&connection_id)
    }

    pub fn students(&self) -> Vec<&Participant> {
        self.participants
            .values()
            .filter(|p| p.role == Role::Student)
            .collect()
    }

    pub fn teacher_connections(&self) -> Vec<Uuid> {
        self.participants
            .values()
            .filter(|p| p.role == Role::Teacher)
            .map(|p| p.connection_id)
            .collect()
    }

    pub fn all_connections(&self) -> Vec<Uuid> {
        self.participants.keys().copied().collect()
    }

    /// Issue a new prompt: any previous distribution is void.
    pub fn set_prompt(&mut self, prompt: ActivePrompt) {
        self.prompt = Some(prompt);
        self.distribution.clear();
        self.phase = Phase::AwaitingSubmissions;
    }

    /// Back to IDLE without touching persisted history.
    pub fn reset(&mut self) {
        self.prompt = None;
        self.distribution.clear();
        self.phase = Phase::Idle;
    }

    pub fn record_distribution(&mut self, slots: HashMap<Uuid, DistributionSlot>) {
        self.distribution = slots;
        self.phase = Phase::Swapped;
    }

    pub fn participants_snapshot(&self) -> Vec<ParticipantInfo> {
        let mut participants: Vec<ParticipantInfo> = self
            .participants
            .values()
            .map(|p| ParticipantInfo {
                connection_id: p.connection_id,
                name: p.name.clone(),
            })
            .collect();
        participants.sort_by(|a, b| a.name.cmp(&b.name));
        participants
    }

    /// Teacher-visible distribution view, keyed by connection id.
    pub fn distribution_snapshot(&self) -> HashMap<Uuid, DistributionEntry> {
        self.distribution
            .values()
            .map(|slot| {
                (
                    slot.connection_id,
                    DistributionEntry {
                        student_name: slot.student_name.clone(),
                        thought_content: slot.content.clone(),
                        original_author_name: slot.author_name.clone(),
                    },
                )
            })
            .collect()
    }
}

/// Shared prompt validation for TEACHER_SEND_PROMPT and SAVE_PROMPT.
/// Returns the cleaned option list (empty unless multiple choice).
pub fn validate_prompt(
    content: &str,
    kind: PromptKind,
    options: Option<Vec<String>>,
) -> Result<Vec<String>> {
    if content.trim().is_empty() {
        return Err(SwapError::precondition("Prompt content cannot be empty."));
    }
    if kind != PromptKind::Mc {
        return Ok(Vec::new());
    }
    let cleaned: Vec<String> = options
        .unwrap_or_default()
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if cleaned.len() < 2 || cleaned.len() > 6 {
        return Err(SwapError::precondition(
            "Multiple choice prompts need between 2 and 6 options.",
        ));
    }
    Ok(cleaned)
}
