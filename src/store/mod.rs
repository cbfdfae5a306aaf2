//! Storage abstraction for the session server.
//!
//! The core only requires atomicity of the individual operations below; any
//! engine satisfying that suffices. `InMemoryStore` is the in-process
//! reference engine wired up by `main` and the tests.

pub mod memory;
pub mod models;

pub use memory::InMemoryStore;
pub use models::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SwapError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, SwapError>;

/// Narrow transactional interface over users, saved prompts, sessions,
/// prompts-in-use, thoughts, the swap-request ledger, and the event log.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Users & consent ---

    /// Create or update a user keyed by email; identity hints from
    /// re-authentication overwrite name, role, and external id.
    async fn upsert_user(&self, profile: UserProfile) -> StoreResult<User>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_id(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    async fn record_consent(
        &self,
        user_id: Uuid,
        consent_given: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<User>;

    // --- Courses & sessions ---

    /// Create a Course and its single ACTIVE Session in one transaction.
    /// Rejects a duplicate join code so the caller can retry with a new one.
    async fn create_course_with_session(
        &self,
        teacher_id: Uuid,
        title: &str,
        join_code: &str,
        max_swap_requests: u32,
    ) -> StoreResult<(Course, Session)>;

    async fn find_active_session_by_join_code(
        &self,
        join_code: &str,
    ) -> StoreResult<Option<(Session, Course)>>;

    /// Whether any session (in any status) was ever keyed by this join code.
    /// Distinguishes "Invalid Room Code" from "session has ended".
    async fn find_any_session_by_join_code(
        &self,
        join_code: &str,
    ) -> StoreResult<Option<(Session, Course)>>;

    async fn update_max_swap_requests(&self, session_id: Uuid, max: u32) -> StoreResult<()>;

    async fn complete_session(&self, session_id: Uuid) -> StoreResult<()>;

    /// Mark COMPLETED every ACTIVE session owned by this teacher, returning
    /// the sessions that were closed.
    async fn complete_active_sessions_for_teacher(
        &self,
        teacher_id: Uuid,
    ) -> StoreResult<Vec<(Session, Course)>>;

    async fn sessions_for_teacher(&self, teacher_id: Uuid) -> StoreResult<Vec<(Session, Course)>>;

    // --- Prompts in use ---

    async fn append_prompt_use(
        &self,
        session_id: Uuid,
        content: &str,
        kind: PromptKind,
        options: Vec<String>,
    ) -> StoreResult<PromptUse>;

    async fn latest_prompt_use(&self, session_id: Uuid) -> StoreResult<Option<PromptUse>>;

    async fn prompt_uses_for_session(&self, session_id: Uuid) -> StoreResult<Vec<PromptUse>>;

    // --- Thoughts ---

    /// Rejects a second live thought by the same author for the same prompt.
    async fn insert_thought(
        &self,
        prompt_use_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> StoreResult<Thought>;

    /// Returns the removed thought and its prompt so the caller can notify
    /// the author and re-scope broadcasts.
    async fn delete_thought(&self, thought_id: Uuid) -> StoreResult<(Thought, PromptUse)>;

    async fn list_thoughts(&self, prompt_use_id: Uuid) -> StoreResult<Vec<ThoughtWithAuthor>>;

    // --- Swap-request ledger ---

    async fn count_swap_requests(&self, student_id: Uuid, session_id: Uuid) -> StoreResult<u32>;

    async fn record_swap_request(
        &self,
        student_id: Uuid,
        session_id: Uuid,
    ) -> StoreResult<SwapRequest>;

    // --- Saved prompts ---

    async fn save_prompt(
        &self,
        teacher_id: Uuid,
        content: &str,
        kind: PromptKind,
        options: Vec<String>,
    ) -> StoreResult<SavedPrompt>;

    async fn saved_prompts_for_teacher(&self, teacher_id: Uuid) -> StoreResult<Vec<SavedPrompt>>;

    /// Deletion is forbidden for non-owners.
    async fn delete_saved_prompt(&self, teacher_id: Uuid, prompt_id: Uuid) -> StoreResult<()>;

    // --- Event log ---

    async fn append_log_event(
        &self,
        kind: LogKind,
        user_id: Option<Uuid>,
        payload: serde_json::Value,
    ) -> StoreResult<LogEvent>;

    /// Most recent events first.
    async fn recent_log_events(&self, limit: usize) -> StoreResult<Vec<LogEvent>>;

    // --- Admin projection reads ---

    async fn active_sessions(&self) -> StoreResult<Vec<(Session, Course)>>;

    /// Every thought whose author has `consent_given == true`.
    async fn all_consented_thoughts(&self) -> StoreResult<Vec<ThoughtWithAuthor>>;

    /// Every swap request whose student has `consent_given == true`.
    async fn all_consented_swap_requests(&self) -> StoreResult<Vec<SwapRequest>>;

    async fn user_stats(&self) -> StoreResult<UserStats>;
}
