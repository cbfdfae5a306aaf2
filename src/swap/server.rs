use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, RwLock};
use tokio::time::sleep;
use uuid::Uuid;
use warp::ws::Message;

use crate::error::{Result, SwapError};
use crate::store::{LogKind, PromptKind, Role, SessionStatus, Store, User};

use super::admin::{self, AdminSnapshot};
use super::engine::{self, Recipient, ThoughtCard};
use super::events::{PreviousSessionInfo, ServerEvent, ThoughtInfo};
use super::logger::EventLogger;
use super::registry::{generate_join_code, normalize_join_code, RoomRegistry, JOIN_CODE_ATTEMPTS};
use super::room::{ActivePrompt, DistributionSlot, Participant, Phase, Room};

/// Re-swap quota a new session starts with
pub const DEFAULT_MAX_SWAP_REQUESTS: u32 = 1;

/// A resolved, registered client connection
pub struct ConnectionHandle {
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
    pub join_code: Option<String>,
    pub sender: mpsc::UnboundedSender<Message>,
}

pub struct ThoughtSwapServer {
    store: Arc<dyn Store>,
    registry: RoomRegistry,
    connections: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
    logger: EventLogger,
    survey_url: Option<String>,
    teacher_grace: Duration,
}

impl ThoughtSwapServer {
    pub fn new(
        store: Arc<dyn Store>,
        survey_url: Option<String>,
        teacher_grace: Duration,
    ) -> Arc<Self> {
        let logger = EventLogger::new(store.clone());
        Arc::new(Self {
            store,
            registry: RoomRegistry::new(),
            connections: Arc::new(RwLock::new(HashMap::new())),
            logger,
            survey_url,
            teacher_grace,
        })
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn logger(&self) -> &EventLogger {
        &self.logger
    }

    // --- Connection table ---

    pub async fn register_connection(
        &self,
        connection_id: Uuid,
        user: &User,
        sender: mpsc::UnboundedSender<Message>,
    ) {
        let mut connections = self.connections.write().await;
        connections.insert(
            connection_id,
            ConnectionHandle {
                user_id: user.id,
                name: user.name.clone(),
                role: user.role,
                join_code: None,
                sender,
            },
        );
        tracing::info!(connection_id = %connection_id, user_id = %user.id, "Connection registered");
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn set_join_code(&self, connection_id: Uuid, join_code: Option<String>) {
        let mut connections = self.connections.write().await;
        if let Some(handle) = connections.get_mut(&connection_id) {
            handle.join_code = join_code;
        }
    }

    // --- Fan-out primitives ---
    //
    // Sends are non-blocking enqueues onto the recipient's outbox; a closed
    // or saturated outbox drops the frame and logs.

    pub async fn send(&self, connection_id: Uuid, event: &ServerEvent) {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize outbound event");
                return;
            }
        };
        let connections = self.connections.read().await;
        if let Some(handle) = connections.get(&connection_id) {
            if handle.sender.send(frame).is_err() {
                tracing::debug!(connection_id = %connection_id, "Dropping frame for closed outbox");
            }
        }
    }

    async fn send_to_conns(&self, conns: &[Uuid], event: &ServerEvent) {
        for &conn in conns {
            self.send(conn, event).await;
        }
    }

    async fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) {
        let conns: Vec<Uuid> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(_, h)| h.user_id == user_id)
                .map(|(id, _)| *id)
                .collect()
        };
        self.send_to_conns(&conns, event).await;
    }

    // --- Room lookup ---

    /// Resolve a join code to a live room, distinguishing a finished session
    /// from a code that never existed.
    async fn room_for(&self, join_code: &str) -> Result<Arc<Room>> {
        let code = normalize_join_code(join_code);
        if let Some(room) = self.registry.lookup(&code).await {
            return Ok(room);
        }
        match self.store.find_any_session_by_join_code(&code).await? {
            Some((session, _)) if session.status == SessionStatus::Completed => {
                Err(SwapError::SessionEnded)
            }
            _ => Err(SwapError::InvalidRoomCode),
        }
    }

    fn ensure_owner(room: &Room, user: &User) -> Result<()> {
        if room.teacher_id != user.id {
            return Err(SwapError::Forbidden);
        }
        Ok(())
    }

    // --- Session lifecycle ---

    pub async fn start_class(&self, connection_id: Uuid, user: &User) -> Result<()> {
        let title = format!("{}'s class", user.name);
        let mut rng = StdRng::from_entropy();

        let mut created = None;
        for _ in 0..JOIN_CODE_ATTEMPTS {
            let code = generate_join_code(&mut rng);
            match self
                .store
                .create_course_with_session(user.id, &title, &code, DEFAULT_MAX_SWAP_REQUESTS)
                .await
            {
                Ok(pair) => {
                    created = Some(pair);
                    break;
                }
                Err(SwapError::Conflict(_)) => {
                    tracing::debug!(join_code = %code, "Join code collision, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        let (course, session) = created.ok_or_else(|| {
            SwapError::internal("could not allocate a unique join code")
        })?;

        let room = Arc::new(Room::new(
            course.join_code.clone(),
            session.id,
            course.id,
            user.id,
            session.max_swap_requests,
        ));
        {
            let mut state = room.lock().await;
            state.add_participant(Participant {
                connection_id,
                user_id: user.id,
                name: user.name.clone(),
                role: Role::Teacher,
            });
            state.teacher_connection = Some(connection_id);
            state.teacher_epoch += 1;
        }
        self.registry.insert(room.clone()).await;
        self.set_join_code(connection_id, Some(course.join_code.clone()))
            .await;

        tracing::info!(
            join_code = %course.join_code,
            session_id = %session.id,
            teacher_id = %user.id,
            "Class started"
        );

        self.send(
            connection_id,
            &ServerEvent::ClassStarted {
                join_code: course.join_code.clone(),
                session_id: session.id,
                max_swap_requests: session.max_swap_requests,
            },
        )
        .await;
        self.broadcast_participants(&room).await?;

        self.logger.log(
            LogKind::StartClass,
            Some(user.id),
            serde_json::json!({ "joinCode": course.join_code, "sessionId": session.id }),
        );
        Ok(())
    }

    pub async fn rejoin_class(
        &self,
        connection_id: Uuid,
        user: &User,
        join_code: &str,
    ) -> Result<()> {
        let code = normalize_join_code(join_code);

        let room = match self.registry.lookup(&code).await {
            Some(room) => {
                Self::ensure_owner(&room, user)?;
                room
            }
            None => match self.store.find_active_session_by_join_code(&code).await? {
                Some((session, course)) => {
                    if course.teacher_id != user.id {
                        return Err(SwapError::Forbidden);
                    }
                    // Rebuild the room from the store. The distribution is
                    // volatile and does not survive a room teardown.
                    let room = Arc::new(Room::new(
                        code.clone(),
                        session.id,
                        course.id,
                        user.id,
                        session.max_swap_requests,
                    ));
                    if let Some(prompt_use) = self.store.latest_prompt_use(session.id).await? {
                        room.lock().await.set_prompt(ActivePrompt {
                            id: prompt_use.id,
                            content: prompt_use.content,
                            kind: prompt_use.kind,
                            options: prompt_use.options,
                        });
                    }
                    self.registry.insert(room.clone()).await;
                    tracing::info!(join_code = %code, "Room rebuilt from store on teacher rejoin");
                    room
                }
                None => {
                    return match self.store.find_any_session_by_join_code(&code).await? {
                        Some((session, _)) if session.status == SessionStatus::Completed => {
                            Err(SwapError::SessionEnded)
                        }
                        _ => Err(SwapError::InvalidRoomCode),
                    };
                }
            },
        };

        let (participants, distribution, prompt, max_swap_requests) = {
            let mut state = room.lock().await;
            state.add_participant(Participant {
                connection_id,
                user_id: user.id,
                name: user.name.clone(),
                role: Role::Teacher,
            });
            state.teacher_connection = Some(connection_id);
            state.teacher_epoch += 1;
            (
                state.participants_snapshot(),
                state.distribution_snapshot(),
                state.prompt.clone(),
                state.max_swap_requests,
            )
        };
        self.set_join_code(connection_id, Some(code.clone())).await;

        let thoughts = match &prompt {
            Some(prompt) => self.store.list_thoughts(prompt.id).await?,
            None => Vec::new(),
        };

        self.send(
            connection_id,
            &ServerEvent::ClassStarted {
                join_code: code.clone(),
                session_id: room.session_id,
                max_swap_requests,
            },
        )
        .await;
        self.send(
            connection_id,
            &ServerEvent::ParticipantsUpdate {
                participants,
                submission_count: thoughts.len(),
            },
        )
        .await;
        self.send(
            connection_id,
            &ServerEvent::ThoughtsUpdate {
                thoughts: thought_infos(&thoughts),
            },
        )
        .await;
        self.send(connection_id, &ServerEvent::DistributionUpdate { distribution })
            .await;

        self.logger.log(
            LogKind::JoinRoom,
            Some(user.id),
            serde_json::json!({ "joinCode": code, "rejoin": true }),
        );
        Ok(())
    }

    pub async fn join_room(&self, connection_id: Uuid, user: &User, join_code: &str) -> Result<()> {
        let room = self.room_for(join_code).await?;

        let (prompt, slot) = {
            let mut state = room.lock().await;
            state.add_participant(Participant {
                connection_id,
                user_id: user.id,
                name: user.name.clone(),
                role: user.role,
            });
            if user.id == room.teacher_id {
                state.teacher_connection = Some(connection_id);
                state.teacher_epoch += 1;
            }
            // Rebind the distribution slot so a reconnect keeps its thought
            if let Some(slot) = state.distribution.get_mut(&user.id) {
                slot.connection_id = connection_id;
            }
            (state.prompt.clone(), state.distribution.get(&user.id).cloned())
        };
        self.set_join_code(connection_id, Some(room.join_code.clone()))
            .await;

        tracing::info!(
            connection_id = %connection_id,
            user_id = %user.id,
            join_code = %room.join_code,
            "Participant joined room"
        );

        self.send(
            connection_id,
            &ServerEvent::JoinSuccess {
                join_code: room.join_code.clone(),
            },
        )
        .await;

        if user.role == Role::Student {
            self.restore_student(connection_id, user, prompt.as_ref(), slot.as_ref())
                .await?;
        }
        self.broadcast_participants(&room).await?;

        self.logger.log(
            LogKind::JoinRoom,
            Some(user.id),
            serde_json::json!({ "joinCode": room.join_code }),
        );
        Ok(())
    }

    /// State restoration for a (re)joining student: the distribution entry
    /// wins, then a submitted-but-waiting state, then the open prompt.
    async fn restore_student(
        &self,
        connection_id: Uuid,
        user: &User,
        prompt: Option<&ActivePrompt>,
        slot: Option<&DistributionSlot>,
    ) -> Result<()> {
        use super::events::RestoreStatus;

        if let Some(slot) = slot {
            self.send(
                connection_id,
                &ServerEvent::ReceiveSwap {
                    content: slot.content.clone(),
                },
            )
            .await;
            self.send(
                connection_id,
                &ServerEvent::RestoreState {
                    status: RestoreStatus::Discussing,
                    prompt: prompt.map(|p| p.content.clone()),
                    prompt_use_id: prompt.map(|p| p.id),
                    kind: prompt.map(|p| p.kind),
                    options: prompt.map(|p| p.options.clone()),
                },
            )
            .await;
            return Ok(());
        }

        let prompt = match prompt {
            Some(prompt) => prompt,
            None => return Ok(()),
        };

        let has_submitted = self
            .store
            .list_thoughts(prompt.id)
            .await?
            .iter()
            .any(|t| t.author_id == user.id);

        if has_submitted {
            self.send(
                connection_id,
                &ServerEvent::RestoreState {
                    status: RestoreStatus::Submitted,
                    prompt: Some(prompt.content.clone()),
                    prompt_use_id: Some(prompt.id),
                    kind: Some(prompt.kind),
                    options: Some(prompt.options.clone()),
                },
            )
            .await;
        } else {
            self.send(
                connection_id,
                &ServerEvent::NewPrompt {
                    content: prompt.content.clone(),
                    prompt_use_id: prompt.id,
                    kind: prompt.kind,
                    options: prompt.options.clone(),
                },
            )
            .await;
        }
        Ok(())
    }

    // --- Prompts & thoughts ---

    pub async fn send_prompt(
        &self,
        user: &User,
        join_code: &str,
        content: &str,
        kind: PromptKind,
        options: Option<Vec<String>>,
    ) -> Result<()> {
        let room = self.room_for(join_code).await?;
        Self::ensure_owner(&room, user)?;

        let options = super::room::validate_prompt(content, kind, options)?;
        let prompt_use = self
            .store
            .append_prompt_use(room.session_id, content.trim(), kind, options)
            .await?;

        let (all_conns, teacher_conns) = {
            let mut state = room.lock().await;
            state.set_prompt(ActivePrompt {
                id: prompt_use.id,
                content: prompt_use.content.clone(),
                kind: prompt_use.kind,
                options: prompt_use.options.clone(),
            });
            (state.all_connections(), state.teacher_connections())
        };

        self.send_to_conns(
            &all_conns,
            &ServerEvent::NewPrompt {
                content: prompt_use.content.clone(),
                prompt_use_id: prompt_use.id,
                kind: prompt_use.kind,
                options: prompt_use.options.clone(),
            },
        )
        .await;
        self.send_to_conns(&teacher_conns, &ServerEvent::ThoughtsUpdate { thoughts: vec![] })
            .await;

        self.logger.log(
            LogKind::SendPrompt,
            Some(user.id),
            serde_json::json!({ "joinCode": room.join_code, "promptUseId": prompt_use.id }),
        );
        Ok(())
    }

    pub async fn submit_thought(
        &self,
        connection_id: Uuid,
        user: &User,
        join_code: &str,
        content: &str,
        prompt_use_id: Uuid,
    ) -> Result<()> {
        let room = self.room_for(join_code).await?;

        let current = {
            let state = room.lock().await;
            if !state.participants.contains_key(&connection_id) {
                return Err(SwapError::precondition("You are not in this room."));
            }
            state.prompt.as_ref().map(|p| p.id)
        };
        match current {
            // A submission for an older prompt is stale: discard without error
            Some(current_id) if current_id == prompt_use_id => {}
            _ => {
                tracing::debug!(
                    connection_id = %connection_id,
                    prompt_use_id = %prompt_use_id,
                    "Discarding stale thought submission"
                );
                return Ok(());
            }
        }

        if content.trim().is_empty() {
            return Err(SwapError::precondition("Thought cannot be empty."));
        }

        self.store
            .insert_thought(prompt_use_id, user.id, content.trim())
            .await?;
        self.broadcast_thoughts(&room, prompt_use_id).await?;

        self.logger.log(
            LogKind::SubmitThought,
            Some(user.id),
            serde_json::json!({ "joinCode": room.join_code, "promptUseId": prompt_use_id }),
        );
        Ok(())
    }

    pub async fn delete_thought(
        &self,
        user: &User,
        join_code: &str,
        thought_id: Uuid,
    ) -> Result<()> {
        let room = self.room_for(join_code).await?;
        Self::ensure_owner(&room, user)?;

        let prompt_use_id = {
            let state = room.lock().await;
            state
                .prompt
                .as_ref()
                .map(|p| p.id)
                .ok_or_else(|| SwapError::NotFound("Thought".to_string()))?
        };

        // Only thoughts live under the current prompt are deletable here;
        // anything else is not this room's to touch.
        let live = self.store.list_thoughts(prompt_use_id).await?;
        if !live.iter().any(|t| t.id == thought_id) {
            return Err(SwapError::NotFound("Thought".to_string()));
        }

        let (deleted, _) = self.store.delete_thought(thought_id).await?;
        self.broadcast_thoughts(&room, prompt_use_id).await?;
        self.send_to_user(
            deleted.author_id,
            &ServerEvent::ThoughtDeleted {
                message: "Your thought was removed by the teacher. You may submit a new one."
                    .to_string(),
            },
        )
        .await;

        self.logger.log(
            LogKind::DeleteThought,
            Some(user.id),
            serde_json::json!({ "joinCode": room.join_code, "thoughtId": thought_id }),
        );
        Ok(())
    }

    // --- The swap ---

    pub async fn trigger_swap(
        &self,
        connection_id: Uuid,
        user: &User,
        join_code: &str,
    ) -> Result<()> {
        let room = self.room_for(join_code).await?;
        Self::ensure_owner(&room, user)?;

        let (prompt_use_id, recipients) = {
            let state = room.lock().await;
            let prompt = state
                .prompt
                .as_ref()
                .ok_or_else(|| SwapError::precondition("Send a prompt before swapping."))?;
            let recipients: Vec<Recipient> = state
                .students()
                .into_iter()
                .map(|p| Recipient {
                    connection_id: p.connection_id,
                    user_id: p.user_id,
                    name: p.name.clone(),
                })
                .collect();
            (prompt.id, recipients)
        };

        let thoughts = self.store.list_thoughts(prompt_use_id).await?;
        if thoughts.is_empty() {
            return Err(SwapError::precondition(
                "No thoughts have been submitted yet.",
            ));
        }

        let cards: Vec<ThoughtCard> = thoughts
            .iter()
            .map(|t| ThoughtCard {
                content: t.content.clone(),
                author_user_id: t.author_id,
                author_name: t.author_name.clone(),
            })
            .collect();

        let assignments = {
            let mut rng = StdRng::from_entropy();
            engine::assign(&cards, &recipients, &mut rng)
        };

        let mut slots = HashMap::new();
        for recipient in &recipients {
            if let Some(assignment) = assignments.get(&recipient.connection_id) {
                slots.insert(
                    recipient.user_id,
                    DistributionSlot {
                        connection_id: recipient.connection_id,
                        student_name: recipient.name.clone(),
                        content: assignment.content.clone(),
                        author_user_id: assignment.author_user_id,
                        author_name: assignment.author_name.clone(),
                    },
                );
            }
        }

        let (distribution, teacher_conns) = {
            let mut state = room.lock().await;
            state.record_distribution(slots);
            (state.distribution_snapshot(), state.teacher_connections())
        };

        for recipient in &recipients {
            if let Some(assignment) = assignments.get(&recipient.connection_id) {
                self.send(
                    recipient.connection_id,
                    &ServerEvent::ReceiveSwap {
                        content: assignment.content.clone(),
                    },
                )
                .await;
            }
        }
        self.send_to_conns(&teacher_conns, &ServerEvent::DistributionUpdate { distribution })
            .await;
        self.send(
            connection_id,
            &ServerEvent::SwapCompleted {
                count: assignments.len(),
            },
        )
        .await;

        tracing::info!(
            join_code = %room.join_code,
            recipients = assignments.len(),
            thoughts = thoughts.len(),
            "Swap distributed"
        );
        self.logger.log(
            LogKind::TriggerSwap,
            Some(user.id),
            serde_json::json!({ "joinCode": room.join_code, "count": assignments.len() }),
        );
        Ok(())
    }

    pub async fn request_new_thought(
        &self,
        connection_id: Uuid,
        user: &User,
        join_code: &str,
        current_thought_content: &str,
    ) -> Result<()> {
        let room = self.room_for(join_code).await?;

        let (prompt_use_id, max_swap_requests, student_name) = {
            let state = room.lock().await;
            let participant = state
                .participants
                .get(&connection_id)
                .ok_or_else(|| SwapError::precondition("You are not in this room."))?;
            if state.phase != Phase::Swapped {
                return Err(SwapError::precondition("No swap has happened yet."));
            }
            let prompt = state.prompt.as_ref().ok_or_else(|| {
                tracing::error!(join_code = %room.join_code, "Swapped room has no active prompt");
                SwapError::precondition("No swap has happened yet.")
            })?;
            (prompt.id, state.max_swap_requests, participant.name.clone())
        };

        let used = self
            .store
            .count_swap_requests(user.id, room.session_id)
            .await?;
        if used >= max_swap_requests {
            return Err(SwapError::Precondition(format!(
                "Limit reached: you have used all {} thought swaps for this session.",
                max_swap_requests
            )));
        }

        let thoughts = self.store.list_thoughts(prompt_use_id).await?;
        let eligible: Vec<_> = thoughts
            .into_iter()
            .filter(|t| t.author_id != user.id && t.content != current_thought_content)
            .collect();
        if eligible.is_empty() {
            return Err(SwapError::precondition(
                "No other thoughts are eligible for a swap right now.",
            ));
        }

        self.store
            .record_swap_request(user.id, room.session_id)
            .await?;

        let pick = {
            let mut rng = StdRng::from_entropy();
            engine::pick_random(&eligible, &mut rng)
                .cloned()
                .ok_or_else(|| SwapError::internal("eligible pool drained unexpectedly"))?
        };

        let (distribution, teacher_conns) = {
            let mut state = room.lock().await;
            state.distribution.insert(
                user.id,
                DistributionSlot {
                    connection_id,
                    student_name,
                    content: pick.content.clone(),
                    author_user_id: pick.author_id,
                    author_name: pick.author_name.clone(),
                },
            );
            (state.distribution_snapshot(), state.teacher_connections())
        };

        self.send(
            connection_id,
            &ServerEvent::ReceiveSwap {
                content: pick.content.clone(),
            },
        )
        .await;
        self.send_to_conns(&teacher_conns, &ServerEvent::DistributionUpdate { distribution })
            .await;

        self.logger.log(
            LogKind::RequestReswap,
            Some(user.id),
            serde_json::json!({ "joinCode": room.join_code }),
        );
        Ok(())
    }

    pub async fn reassign_distribution(
        &self,
        user: &User,
        join_code: &str,
        student_connection_id: Uuid,
    ) -> Result<()> {
        let room = self.room_for(join_code).await?;
        Self::ensure_owner(&room, user)?;

        let (prompt_use_id, target, current_content) = {
            let state = room.lock().await;
            if state.phase != Phase::Swapped {
                return Err(SwapError::precondition("No swap has happened yet."));
            }
            let target = state
                .participants
                .get(&student_connection_id)
                .cloned()
                .ok_or_else(|| SwapError::NotFound("Student".to_string()))?;
            let prompt_use_id = state
                .prompt
                .as_ref()
                .map(|p| p.id)
                .ok_or_else(|| SwapError::precondition("No swap has happened yet."))?;
            let current = state
                .distribution
                .get(&target.user_id)
                .map(|slot| slot.content.clone());
            (prompt_use_id, target, current)
        };

        let thoughts = self.store.list_thoughts(prompt_use_id).await?;
        let eligible: Vec<_> = thoughts
            .into_iter()
            .filter(|t| t.author_id != target.user_id)
            .collect();
        if eligible.is_empty() {
            return Err(SwapError::precondition(
                "No eligible thoughts for that student.",
            ));
        }

        // Prefer a thought that actually changes what the student sees
        let fresh: Vec<_> = eligible
            .iter()
            .filter(|t| Some(&t.content) != current_content.as_ref())
            .cloned()
            .collect();
        let pool = if fresh.is_empty() { &eligible } else { &fresh };

        let pick = {
            let mut rng = StdRng::from_entropy();
            engine::pick_random(pool, &mut rng)
                .cloned()
                .ok_or_else(|| SwapError::internal("eligible pool drained unexpectedly"))?
        };

        let (distribution, teacher_conns) = {
            let mut state = room.lock().await;
            state.distribution.insert(
                target.user_id,
                DistributionSlot {
                    connection_id: target.connection_id,
                    student_name: target.name.clone(),
                    content: pick.content.clone(),
                    author_user_id: pick.author_id,
                    author_name: pick.author_name.clone(),
                },
            );
            (state.distribution_snapshot(), state.teacher_connections())
        };

        self.send(
            target.connection_id,
            &ServerEvent::ReceiveSwap {
                content: pick.content.clone(),
            },
        )
        .await;
        self.send_to_conns(&teacher_conns, &ServerEvent::DistributionUpdate { distribution })
            .await;

        self.logger.log(
            LogKind::RequestReswap,
            Some(user.id),
            serde_json::json!({ "joinCode": room.join_code, "initiator": "teacher" }),
        );
        Ok(())
    }

    // --- Moderation & settings ---

    pub async fn reset_state(&self, user: &User, join_code: &str) -> Result<()> {
        let room = self.room_for(join_code).await?;
        Self::ensure_owner(&room, user)?;

        let (teacher_conns, student_conns) = {
            let mut state = room.lock().await;
            state.reset();
            (
                state.teacher_connections(),
                state
                    .students()
                    .iter()
                    .map(|p| p.connection_id)
                    .collect::<Vec<_>>(),
            )
        };

        self.send_to_conns(&teacher_conns, &ServerEvent::ThoughtsUpdate { thoughts: vec![] })
            .await;
        self.send_to_conns(
            &teacher_conns,
            &ServerEvent::DistributionUpdate {
                distribution: HashMap::new(),
            },
        )
        .await;
        self.send_to_conns(
            &student_conns,
            &ServerEvent::RestoreState {
                status: super::events::RestoreStatus::Idle,
                prompt: None,
                prompt_use_id: None,
                kind: None,
                options: None,
            },
        )
        .await;

        self.logger.log(
            LogKind::ResetState,
            Some(user.id),
            serde_json::json!({ "joinCode": room.join_code }),
        );
        Ok(())
    }

    pub async fn update_settings(
        &self,
        user: &User,
        join_code: &str,
        max_swap_requests: u32,
    ) -> Result<()> {
        let room = self.room_for(join_code).await?;
        Self::ensure_owner(&room, user)?;

        self.store
            .update_max_swap_requests(room.session_id, max_swap_requests)
            .await?;
        room.lock().await.max_swap_requests = max_swap_requests;

        self.logger.log(
            LogKind::UpdateSettings,
            Some(user.id),
            serde_json::json!({ "joinCode": room.join_code, "maxSwapRequests": max_swap_requests }),
        );
        Ok(())
    }

    pub async fn end_session(&self, user: &User, join_code: &str) -> Result<()> {
        let room = self.room_for(join_code).await?;
        Self::ensure_owner(&room, user)?;

        // The store commit precedes the fan-out that reports it
        self.store.complete_session(room.session_id).await?;
        self.finish_room(&room).await;

        self.logger.log(
            LogKind::EndSession,
            Some(user.id),
            serde_json::json!({ "joinCode": room.join_code, "sessionId": room.session_id }),
        );
        Ok(())
    }

    /// Notify everyone, detach them from the code, and drop the room.
    async fn finish_room(&self, room: &Arc<Room>) {
        let conns = {
            let state = room.lock().await;
            state.all_connections()
        };

        self.send_to_conns(
            &conns,
            &ServerEvent::SessionEnded {
                survey_link: self.survey_url.clone(),
            },
        )
        .await;

        {
            let mut connections = self.connections.write().await;
            for conn in &conns {
                if let Some(handle) = connections.get_mut(conn) {
                    handle.join_code = None;
                }
            }
        }

        self.registry.remove(&room.join_code).await;
        tracing::info!(join_code = %room.join_code, "Room destroyed");
    }

    // --- Consent, history, admin ---

    pub async fn update_consent(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        consent_given: bool,
    ) -> Result<()> {
        let user = self
            .store
            .record_consent(user_id, consent_given, Utc::now())
            .await?;
        self.send(
            connection_id,
            &ServerEvent::ConsentStatus {
                consent_given: user.consent_given,
                consent_date: user.consent_date,
            },
        )
        .await;

        self.logger.log(
            LogKind::UpdateConsent,
            Some(user_id),
            serde_json::json!({ "consentGiven": consent_given }),
        );
        Ok(())
    }

    pub async fn previous_sessions(&self, user: &User) -> Result<Vec<PreviousSessionInfo>> {
        let mut sessions = Vec::new();
        for (session, course) in self.store.sessions_for_teacher(user.id).await? {
            let prompts = self
                .store
                .prompt_uses_for_session(session.id)
                .await?
                .into_iter()
                .map(|p| p.content)
                .collect();
            sessions.push(PreviousSessionInfo {
                session_id: session.id,
                course_title: course.title,
                join_code: course.join_code,
                status: session.status,
                prompts,
                created_at: session.created_at,
            });
        }
        Ok(sessions)
    }

    pub async fn admin_snapshot(&self) -> Result<AdminSnapshot> {
        let active_users = self.connection_count().await;
        admin::collect_snapshot(self.store.as_ref(), active_users).await
    }

    // --- Disconnect path ---

    pub async fn handle_disconnect(self: Arc<Self>, connection_id: Uuid) {
        let handle = {
            let mut connections = self.connections.write().await;
            connections.remove(&connection_id)
        };
        let handle = match handle {
            Some(handle) => handle,
            None => return,
        };
        tracing::info!(connection_id = %connection_id, user_id = %handle.user_id, "Connection closed");

        let join_code = match handle.join_code {
            Some(code) => code,
            None => return,
        };
        let room = match self.registry.lookup(&join_code).await {
            Some(room) => room,
            None => return,
        };

        let teacher_left_epoch = {
            let mut state = room.lock().await;
            state.remove_participant(connection_id);
            if state.teacher_connection == Some(connection_id) {
                state.teacher_connection = None;
                Some(state.teacher_epoch)
            } else {
                None
            }
        };

        if let Err(e) = self.broadcast_participants(&room).await {
            tracing::warn!(join_code = %join_code, error = %e, "Participant broadcast failed");
        }

        if let Some(epoch) = teacher_left_epoch {
            if handle.user_id == room.teacher_id {
                let _ = self.clone().schedule_auto_end(room, epoch);
            }
        }
    }

    /// Teacher liveness debounce: a page reload gets `teacher_grace` to
    /// reconnect before every ACTIVE session owned by this teacher is
    /// auto-completed.
    fn schedule_auto_end(self: Arc<Self>, room: Arc<Room>, epoch: u64) -> tokio::task::JoinHandle<()> {
        let server = self;
        tokio::spawn(async move {
            sleep(server.teacher_grace).await;

            {
                let state = room.lock().await;
                if state.teacher_connection.is_some() || state.teacher_epoch != epoch {
                    tracing::debug!(join_code = %room.join_code, "Teacher rejoined, auto-end cancelled");
                    return;
                }
            }
            if server.registry.lookup(&room.join_code).await.is_none() {
                return;
            }

            let closed = match server
                .store
                .complete_active_sessions_for_teacher(room.teacher_id)
                .await
            {
                Ok(closed) => closed,
                Err(e) => {
                    tracing::error!(
                        teacher_id = %room.teacher_id,
                        error = %e,
                        "Auto-end failed to complete sessions"
                    );
                    return;
                }
            };

            for (session, course) in closed {
                tracing::info!(
                    join_code = %course.join_code,
                    session_id = %session.id,
                    "Session auto-ended after teacher disconnect"
                );
                server.logger.log(
                    LogKind::SessionAutoEnded,
                    Some(room.teacher_id),
                    serde_json::json!({ "joinCode": course.join_code, "sessionId": session.id }),
                );
                if let Some(live) = server.registry.lookup(&course.join_code).await {
                    server.finish_room(&live).await;
                }
            }
        })
    }

    // --- Shared broadcasts ---

    /// `PARTICIPANTS_UPDATE` to the room's teachers, with the live submission
    /// count for the current prompt.
    async fn broadcast_participants(&self, room: &Arc<Room>) -> Result<()> {
        let (participants, teacher_conns, prompt_use_id) = {
            let state = room.lock().await;
            (
                state.participants_snapshot(),
                state.teacher_connections(),
                state.prompt.as_ref().map(|p| p.id),
            )
        };
        let submission_count = match prompt_use_id {
            Some(id) => self.store.list_thoughts(id).await?.len(),
            None => 0,
        };
        self.send_to_conns(
            &teacher_conns,
            &ServerEvent::ParticipantsUpdate {
                participants,
                submission_count,
            },
        )
        .await;
        Ok(())
    }

    /// Teacher view refresh after a thought insert or delete.
    async fn broadcast_thoughts(&self, room: &Arc<Room>, prompt_use_id: Uuid) -> Result<()> {
        let thoughts = self.store.list_thoughts(prompt_use_id).await?;
        let (participants, teacher_conns) = {
            let state = room.lock().await;
            (state.participants_snapshot(), state.teacher_connections())
        };
        self.send_to_conns(
            &teacher_conns,
            &ServerEvent::ParticipantsUpdate {
                participants,
                submission_count: thoughts.len(),
            },
        )
        .await;
        self.send_to_conns(
            &teacher_conns,
            &ServerEvent::ThoughtsUpdate {
                thoughts: thought_infos(&thoughts),
            },
        )
        .await;
        Ok(())
    }
}

fn thought_infos(thoughts: &[crate::store::ThoughtWithAuthor]) -> Vec<ThoughtInfo> {
    thoughts
        .iter()
        .map(|t| ThoughtInfo {
            id: t.id,
            content: t.content.clone(),
            author_name: t.author_name.clone(),
        })
        .collect()
}
