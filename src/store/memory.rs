//! In-memory store engine.
//!
//! A single `RwLock` over all tables keeps each trait method atomic, which is
//! the only guarantee the core asks of a store engine.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::*;
use super::{Store, StoreResult};
use crate::error::SwapError;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    users_by_email: HashMap<String, Uuid>,
    courses: HashMap<Uuid, Course>,
    sessions: HashMap<Uuid, Session>,
    prompt_uses: HashMap<Uuid, PromptUse>,
    thoughts: HashMap<Uuid, Thought>,
    swap_requests: Vec<SwapRequest>,
    saved_prompts: HashMap<Uuid, SavedPrompt>,
    log_events: Vec<LogEvent>,
}

impl Tables {
    fn join_thought(&self, thought: &Thought) -> ThoughtWithAuthor {
        let author_name = self
            .users
            .get(&thought.author_id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        ThoughtWithAuthor {
            id: thought.id,
            prompt_use_id: thought.prompt_use_id,
            author_id: thought.author_id,
            author_name,
            content: thought.content.clone(),
            created_at: thought.created_at,
        }
    }

    fn course_of(&self, session: &Session) -> StoreResult<Course> {
        self.courses
            .get(&session.course_id)
            .cloned()
            .ok_or_else(|| SwapError::store("session references a missing course"))
    }
}

pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_user(&self, profile: UserProfile) -> StoreResult<User> {
        let normalized = profile.email.to_lowercase();
        let mut tables = self.write();

        if let Some(id) = tables.users_by_email.get(&normalized).copied() {
            let user = tables
                .users
                .get_mut(&id)
                .ok_or_else(|| SwapError::store("email index points at a missing user"))?;
            user.name = profile.name;
            user.role = profile.role;
            if profile.external_id.is_some() {
                user.external_id = profile.external_id;
            }
            return Ok(user.clone());
        }

        let user = User {
            id: Uuid::new_v4(),
            external_id: profile.external_id,
            email: normalized.clone(),
            name: profile.name,
            role: profile.role,
            consent_given: false,
            consent_date: None,
            created_at: Utc::now(),
        };
        tables.users_by_email.insert(normalized, user.id);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let normalized = email.to_lowercase();
        let tables = self.read();
        Ok(tables
            .users_by_email
            .get(&normalized)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.read().users.get(&user_id).cloned())
    }

    async fn record_consent(
        &self,
        user_id: Uuid,
        consent_given: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut tables = self.write();
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| SwapError::NotFound("User".to_string()))?;
        user.consent_given = consent_given;
        user.consent_date = Some(now);
        Ok(user.clone())
    }

    async fn create_course_with_session(
        &self,
        teacher_id: Uuid,
        title: &str,
        join_code: &str,
        max_swap_requests: u32,
    ) -> StoreResult<(Course, Session)> {
        let mut tables = self.write();

        if tables.courses.values().any(|c| c.join_code == join_code) {
            return Err(SwapError::Conflict(format!(
                "join code {} already in use",
                join_code
            )));
        }

        let course = Course {
            id: Uuid::new_v4(),
            teacher_id,
            title: title.to_string(),
            join_code: join_code.to_string(),
        };
        let session = Session {
            id: Uuid::new_v4(),
            course_id: course.id,
            status: SessionStatus::Active,
            max_swap_requests,
            created_at: Utc::now(),
        };
        tables.courses.insert(course.id, course.clone());
        tables.sessions.insert(session.id, session.clone());
        Ok((course, session))
    }

    async fn find_active_session_by_join_code(
        &self,
        join_code: &str,
    ) -> StoreResult<Option<(Session, Course)>> {
        let tables = self.read();
        for session in tables.sessions.values() {
            if session.status != SessionStatus::Active {
                continue;
            }
            if let Some(course) = tables.courses.get(&session.course_id) {
                if course.join_code == join_code {
                    return Ok(Some((session.clone(), course.clone())));
                }
            }
        }
        Ok(None)
    }

    async fn find_any_session_by_join_code(
        &self,
        join_code: &str,
    ) -> StoreResult<Option<(Session, Course)>> {
        let tables = self.read();
        let mut found: Option<(Session, Course)> = None;
        for session in tables.sessions.values() {
            if let Some(course) = tables.courses.get(&session.course_id) {
                if course.join_code == join_code {
                    // Prefer the most recent session for this code
                    let newer = found
                        .as_ref()
                        .map(|(s, _)| session.created_at > s.created_at)
                        .unwrap_or(true);
                    if newer {
                        found = Some((session.clone(), course.clone()));
                    }
                }
            }
        }
        Ok(found)
    }

    async fn update_max_swap_requests(&self, session_id: Uuid, max: u32) -> StoreResult<()> {
        let mut tables = self.write();
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| SwapError::NotFound("Session".to_string()))?;
        session.max_swap_requests = max;
        Ok(())
    }

    async fn complete_session(&self, session_id: Uuid) -> StoreResult<()> {
        let mut tables = self.write();
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| SwapError::NotFound("Session".to_string()))?;
        session.status = SessionStatus::Completed;
        Ok(())
    }

    async fn complete_active_sessions_for_teacher(
        &self,
        teacher_id: Uuid,
    ) -> StoreResult<Vec<(Session, Course)>> {
        let mut tables = self.write();
        let owned: Vec<Uuid> = tables
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .filter(|s| {
                tables
                    .courses
                    .get(&s.course_id)
                    .map(|c| c.teacher_id == teacher_id)
                    .unwrap_or(false)
            })
            .map(|s| s.id)
            .collect();

        let mut completed = Vec::with_capacity(owned.len());
        for id in owned {
            if let Some(session) = tables.sessions.get_mut(&id) {
                session.status = SessionStatus::Completed;
                let session = session.clone();
                let course = tables.course_of(&session)?;
                completed.push((session, course));
            }
        }
        Ok(completed)
    }

    async fn sessions_for_teacher(&self, teacher_id: Uuid) -> StoreResult<Vec<(Session, Course)>> {
        let tables = self.read();
        let mut rows: Vec<(Session, Course)> = tables
            .sessions
            .values()
            .filter_map(|s| {
                let course = tables.courses.get(&s.course_id)?;
                (course.teacher_id == teacher_id).then(|| (s.clone(), course.clone()))
            })
            .collect();
        rows.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at));
        Ok(rows)
    }

    async fn append_prompt_use(
        &self,
        session_id: Uuid,
        content: &str,
        kind: PromptKind,
        options: Vec<String>,
    ) -> StoreResult<PromptUse> {
        let mut tables = self.write();
        if !tables.sessions.contains_key(&session_id) {
            return Err(SwapError::NotFound("Session".to_string()));
        }
        let prompt_use = PromptUse {
            id: Uuid::new_v4(),
            session_id,
            content: content.to_string(),
            kind,
            options,
            created_at: Utc::now(),
        };
        tables.prompt_uses.insert(prompt_use.id, prompt_use.clone());
        Ok(prompt_use)
    }

    async fn latest_prompt_use(&self, session_id: Uuid) -> StoreResult<Option<PromptUse>> {
        let tables = self.read();
        Ok(tables
            .prompt_uses
            .values()
            .filter(|p| p.session_id == session_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn prompt_uses_for_session(&self, session_id: Uuid) -> StoreResult<Vec<PromptUse>> {
        let tables = self.read();
        let mut uses: Vec<PromptUse> = tables
            .prompt_uses
            .values()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect();
        uses.sort_by_key(|p| p.created_at);
        Ok(uses)
    }

    async fn insert_thought(
        &self,
        prompt_use_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> StoreResult<Thought> {
        let mut tables = self.write();
        if !tables.prompt_uses.contains_key(&prompt_use_id) {
            return Err(SwapError::NotFound("Prompt".to_string()));
        }
        let duplicate = tables
            .thoughts
            .values()
            .any(|t| t.prompt_use_id == prompt_use_id && t.author_id == author_id);
        if duplicate {
            return Err(SwapError::Conflict(
                "You have already submitted a thought for this prompt.".to_string(),
            ));
        }
        let thought = Thought {
            id: Uuid::new_v4(),
            prompt_use_id,
            author_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        tables.thoughts.insert(thought.id, thought.clone());
        Ok(thought)
    }

    async fn delete_thought(&self, thought_id: Uuid) -> StoreResult<(Thought, PromptUse)> {
        let mut tables = self.write();
        let thought = tables
            .thoughts
            .remove(&thought_id)
            .ok_or_else(|| SwapError::NotFound("Thought".to_string()))?;
        let prompt_use = tables
            .prompt_uses
            .get(&thought.prompt_use_id)
            .cloned()
            .ok_or_else(|| SwapError::store("thought references a missing prompt"))?;
        Ok((thought, prompt_use))
    }

    async fn list_thoughts(&self, prompt_use_id: Uuid) -> StoreResult<Vec<ThoughtWithAuthor>> {
        let tables = self.read();
        let mut thoughts: Vec<ThoughtWithAuthor> = tables
            .thoughts
            .values()
            .filter(|t| t.prompt_use_id == prompt_use_id)
            .map(|t| tables.join_thought(t))
            .collect();
        thoughts.sort_by_key(|t| t.created_at);
        Ok(thoughts)
    }

    async fn count_swap_requests(&self, student_id: Uuid, session_id: Uuid) -> StoreResult<u32> {
        let tables = self.read();
        Ok(tables
            .swap_requests
            .iter()
            .filter(|r| r.student_id == student_id && r.session_id == session_id)
            .count() as u32)
    }

    async fn record_swap_request(
        &self,
        student_id: Uuid,
        session_id: Uuid,
    ) -> StoreResult<SwapRequest> {
        let mut tables = self.write();
        let request = SwapRequest {
            id: Uuid::new_v4(),
            student_id,
            session_id,
            created_at: Utc::now(),
        };
        tables.swap_requests.push(request.clone());
        Ok(request)
    }

    async fn save_prompt(
        &self,
        teacher_id: Uuid,
        content: &str,
        kind: PromptKind,
        options: Vec<String>,
    ) -> StoreResult<SavedPrompt> {
        let mut tables = self.write();
        let prompt = SavedPrompt {
            id: Uuid::new_v4(),
            teacher_id,
            content: content.to_string(),
            kind,
            options,
            created_at: Utc::now(),
        };
        tables.saved_prompts.insert(prompt.id, prompt.clone());
        Ok(prompt)
    }

    async fn saved_prompts_for_teacher(&self, teacher_id: Uuid) -> StoreResult<Vec<SavedPrompt>> {
        let tables = self.read();
        let mut prompts: Vec<SavedPrompt> = tables
            .saved_prompts
            .values()
            .filter(|p| p.teacher_id == teacher_id)
            .cloned()
            .collect();
        prompts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(prompts)
    }

    async fn delete_saved_prompt(&self, teacher_id: Uuid, prompt_id: Uuid) -> StoreResult<()> {
        let mut tables = self.write();
        let prompt = tables
            .saved_prompts
            .get(&prompt_id)
            .ok_or_else(|| SwapError::NotFound("Saved prompt".to_string()))?;
        if prompt.teacher_id != teacher_id {
            return Err(SwapError::Precondition(
                "Only the owner can delete a saved prompt.".to_string(),
            ));
        }
        tables.saved_prompts.remove(&prompt_id);
        Ok(())
    }

    async fn append_log_event(
        &self,
        kind: LogKind,
        user_id: Option<Uuid>,
        payload: serde_json::Value,
    ) -> StoreResult<LogEvent> {
        let mut tables = self.write();
        let event = LogEvent {
            id: Uuid::new_v4(),
            event: kind,
            user_id,
            payload,
            created_at: Utc::now(),
        };
        tables.log_events.push(event.clone());
        Ok(event)
    }

    async fn recent_log_events(&self, limit: usize) -> StoreResult<Vec<LogEvent>> {
        let tables = self.read();
        Ok(tables.log_events.iter().rev().take(limit).cloned().collect())
    }

    async fn active_sessions(&self) -> StoreResult<Vec<(Session, Course)>> {
        let tables = self.read();
        Ok(tables
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .filter_map(|s| {
                tables
                    .courses
                    .get(&s.course_id)
                    .map(|c| (s.clone(), c.clone()))
            })
            .collect())
    }

    async fn all_consented_thoughts(&self) -> StoreResult<Vec<ThoughtWithAuthor>> {
        let tables = self.read();
        Ok(tables
            .thoughts
            .values()
            .filter(|t| {
                tables
                    .users
                    .get(&t.author_id)
                    .map(|u| u.consent_given)
                    .unwrap_or(false)
            })
            .map(|t| tables.join_thought(t))
            .collect())
    }

    async fn all_consented_swap_requests(&self) -> StoreResult<Vec<SwapRequest>> {
        let tables = self.read();
        Ok(tables
            .swap_requests
            .iter()
            .filter(|r| {
                tables
                    .users
                    .get(&r.student_id)
                    .map(|u| u.consent_given)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn user_stats(&self) -> StoreResult<UserStats> {
        let tables = self.read();
        Ok(UserStats {
            total_users: tables.users.len(),
            total_consented: tables.users.values().filter(|u| u.consent_given).count(),
        })
    }
}
