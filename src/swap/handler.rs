//! Per-connection command dispatch.
//!
//! Every inbound event is authorized against the resolved user's stored
//! role; the handshake's role hint plays no part here. Authorization
//! failures are dropped silently so the protocol does not leak which
//! commands exist.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Result, SwapError};
use crate::store::{LogKind, PromptKind, Role, Store, User};

use super::events::{ClientEvent, ServerEvent};
use super::room::validate_prompt;
use super::server::ThoughtSwapServer;

pub struct EventHandler {
    server: Arc<ThoughtSwapServer>,
    connection_id: Uuid,
    user: User,
}

impl EventHandler {
    pub fn new(server: Arc<ThoughtSwapServer>, connection_id: Uuid, user: User) -> Self {
        Self {
            server,
            connection_id,
            user,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub async fn handle_event(&self, event: ClientEvent) {
        match self.dispatch(event).await {
            Ok(()) => {}
            Err(SwapError::Forbidden) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    user_id = %self.user.id,
                    role = ?self.user.role,
                    "Ignoring command the caller is not permitted to issue"
                );
            }
            Err(e) => {
                if matches!(e, SwapError::Store(_) | SwapError::Internal(_)) {
                    tracing::error!(
                        connection_id = %self.connection_id,
                        error = %e,
                        "Command handler failed"
                    );
                }
                self.server
                    .send(
                        self.connection_id,
                        &ServerEvent::Error {
                            message: e.client_message(),
                        },
                    )
                    .await;
            }
        }
    }

    fn require(&self, role: Role) -> Result<()> {
        if self.user.role == role {
            Ok(())
        } else {
            Err(SwapError::Forbidden)
        }
    }

    async fn dispatch(&self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::JoinRoom { join_code } => {
                self.server
                    .join_room(self.connection_id, &self.user, &join_code)
                    .await
            }
            ClientEvent::TeacherStartClass => {
                self.require(Role::Teacher)?;
                self.server.start_class(self.connection_id, &self.user).await
            }
            ClientEvent::TeacherRejoin { join_code } => {
                self.require(Role::Teacher)?;
                self.server
                    .rejoin_class(self.connection_id, &self.user, &join_code)
                    .await
            }
            ClientEvent::TeacherSendPrompt {
                join_code,
                content,
                kind,
                options,
            } => {
                self.require(Role::Teacher)?;
                self.server
                    .send_prompt(&self.user, &join_code, &content, kind, options)
                    .await
            }
            ClientEvent::TeacherDeleteThought {
                join_code,
                thought_id,
            } => {
                self.require(Role::Teacher)?;
                self.server
                    .delete_thought(&self.user, &join_code, thought_id)
                    .await
            }
            ClientEvent::TeacherReassignDistribution {
                join_code,
                student_connection_id,
            } => {
                self.require(Role::Teacher)?;
                self.server
                    .reassign_distribution(&self.user, &join_code, student_connection_id)
                    .await
            }
            ClientEvent::TeacherResetState { join_code } => {
                self.require(Role::Teacher)?;
                self.server.reset_state(&self.user, &join_code).await
            }
            ClientEvent::TriggerSwap { join_code } => {
                self.require(Role::Teacher)?;
                self.server
                    .trigger_swap(self.connection_id, &self.user, &join_code)
                    .await
            }
            ClientEvent::EndSession { join_code } => {
                self.require(Role::Teacher)?;
                self.server.end_session(&self.user, &join_code).await
            }
            ClientEvent::UpdateSessionSettings {
                join_code,
                max_swap_requests,
            } => {
                self.require(Role::Teacher)?;
                self.server
                    .update_settings(&self.user, &join_code, max_swap_requests)
                    .await
            }
            ClientEvent::SubmitThought {
                join_code,
                content,
                prompt_use_id,
            } => {
                self.require(Role::Student)?;
                self.server
                    .submit_thought(
                        self.connection_id,
                        &self.user,
                        &join_code,
                        &content,
                        prompt_use_id,
                    )
                    .await
            }
            ClientEvent::StudentRequestNewThought {
                join_code,
                current_thought_content,
            } => {
                self.require(Role::Student)?;
                self.server
                    .request_new_thought(
                        self.connection_id,
                        &self.user,
                        &join_code,
                        &current_thought_content,
                    )
                    .await
            }
            ClientEvent::UpdateConsent { consent_given } => {
                self.server
                    .update_consent(self.connection_id, self.user.id, consent_given)
                    .await
            }
            ClientEvent::SavePrompt {
                content,
                kind,
                options,
            } => {
                self.require(Role::Teacher)?;
                self.save_prompt(&content, kind, options).await
            }
            ClientEvent::GetSavedPrompts => {
                self.require(Role::Teacher)?;
                self.send_saved_prompts().await
            }
            ClientEvent::DeleteSavedPrompt { prompt_id } => {
                self.require(Role::Teacher)?;
                self.server
                    .store()
                    .delete_saved_prompt(self.user.id, prompt_id)
                    .await?;
                self.send_saved_prompts().await
            }
            ClientEvent::AdminJoin => {
                self.require(Role::Admin)?;
                self.send_admin_data(false).await
            }
            ClientEvent::AdminGetData => {
                self.require(Role::Admin)?;
                self.send_admin_data(true).await
            }
            ClientEvent::GetPreviousSessions => {
                self.require(Role::Teacher)?;
                let sessions = self.server.previous_sessions(&self.user).await?;
                self.server
                    .send(self.connection_id, &ServerEvent::PreviousSessions { sessions })
                    .await;
                Ok(())
            }
        }
    }

    async fn save_prompt(
        &self,
        content: &str,
        kind: PromptKind,
        options: Option<Vec<String>>,
    ) -> Result<()> {
        let options = validate_prompt(content, kind, options)?;
        self.server
            .store()
            .save_prompt(self.user.id, content.trim(), kind, options)
            .await?;
        self.send_saved_prompts().await
    }

    async fn send_saved_prompts(&self) -> Result<()> {
        let prompts = self
            .server
            .store()
            .saved_prompts_for_teacher(self.user.id)
            .await?;
        self.server
            .send(self.connection_id, &ServerEvent::SavedPromptsList { prompts })
            .await;
        Ok(())
    }

    async fn send_admin_data(&self, audit: bool) -> Result<()> {
        let snapshot = self.server.admin_snapshot().await?;
        self.server
            .send(self.connection_id, &ServerEvent::AdminDataUpdate(snapshot))
            .await;
        if audit {
            self.server
                .logger()
                .log(LogKind::AdminGetData, Some(self.user.id), serde_json::json!({}));
        }
        Ok(())
    }

    pub async fn cleanup(&self) {
        self.server
            .clone()
            .handle_disconnect(self.connection_id)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, Store, UserProfile};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use warp::ws::Message;

    struct TestClient {
        handler: EventHandler,
        rx: mpsc::UnboundedReceiver<Message>,
        buffered: Vec<serde_json::Value>,
    }

    impl TestClient {
        fn pump(&mut self) {
            while let Ok(message) = self.rx.try_recv() {
                let text = message.to_str().expect("text frame");
                self.buffered
                    .push(serde_json::from_str(text).expect("json frame"));
            }
        }

        /// Take every frame received so far.
        fn drain(&mut self) -> Vec<serde_json::Value> {
            self.pump();
            std::mem::take(&mut self.buffered)
        }

        /// Take the most recent frame of the given type, leaving the rest
        /// buffered for later expectations.
        fn expect(&mut self, event_type: &str) -> serde_json::Value {
            self.pump();
            let position = self
                .buffered
                .iter()
                .rposition(|f| f["type"] == event_type)
                .unwrap_or_else(|| panic!("no {} frame received", event_type));
            self.buffered.remove(position)
        }

        async fn send(&self, event: ClientEvent) {
            self.handler.handle_event(event).await;
        }
    }

    async fn test_server(grace_ms: u64) -> Arc<ThoughtSwapServer> {
        let store = Arc::new(InMemoryStore::new());
        ThoughtSwapServer::new(store, None, Duration::from_millis(grace_ms))
    }

    async fn connect(server: &Arc<ThoughtSwapServer>, email: &str, name: &str, role: Role) -> TestClient {
        let user = server
            .store()
            .upsert_user(UserProfile {
                external_id: None,
                email: email.to_string(),
                name: name.to_string(),
                role,
            })
            .await
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        server.register_connection(connection_id, &user, tx).await;
        TestClient {
            handler: EventHandler::new(server.clone(), connection_id, user),
            rx,
            buffered: Vec::new(),
        }
    }

    async fn start_class(teacher: &mut TestClient) -> String {
        teacher.send(ClientEvent::TeacherStartClass).await;
        let started = teacher.expect("CLASS_STARTED");
        started["payload"]["joinCode"].as_str().unwrap().to_string()
    }

    async fn send_text_prompt(teacher: &mut TestClient, join_code: &str, content: &str) -> Uuid {
        teacher
            .send(ClientEvent::TeacherSendPrompt {
                join_code: join_code.to_string(),
                content: content.to_string(),
                kind: PromptKind::Text,
                options: None,
            })
            .await;
        let prompt = teacher.expect("NEW_PROMPT");
        prompt["payload"]["promptUseId"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_two_students_exchange_thoughts() {
        let server = test_server(1000).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;
        let mut s2 = connect(&server, "s2@school.edu", "Grace", Role::Student).await;

        let code = start_class(&mut teacher).await;
        s1.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        s2.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        s1.expect("JOIN_SUCCESS");
        s2.expect("JOIN_SUCCESS");

        let prompt_use_id = send_text_prompt(&mut teacher, &code, "Why?").await;
        s1.expect("NEW_PROMPT");
        s2.expect("NEW_PROMPT");

        s1.send(ClientEvent::SubmitThought {
            join_code: code.clone(),
            content: "A".to_string(),
            prompt_use_id,
        })
        .await;
        s2.send(ClientEvent::SubmitThought {
            join_code: code.clone(),
            content: "B".to_string(),
            prompt_use_id,
        })
        .await;

        let update = teacher.expect("PARTICIPANTS_UPDATE");
        assert_eq!(update["payload"]["submissionCount"], 2);

        teacher
            .send(ClientEvent::TriggerSwap { join_code: code.clone() })
            .await;

        // With two students the no-own-thought constraint forces an exchange
        let swap1 = s1.expect("RECEIVE_SWAP");
        assert_eq!(swap1["payload"]["content"], "B");
        let swap2 = s2.expect("RECEIVE_SWAP");
        assert_eq!(swap2["payload"]["content"], "A");

        let completed = teacher.expect("SWAP_COMPLETED");
        assert_eq!(completed["payload"]["count"], 2);
        let distribution = teacher.expect("DISTRIBUTION_UPDATE");
        assert_eq!(
            distribution["payload"]["distribution"]
                .as_object()
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_single_submitter_gets_their_own_thought_back() {
        let server = test_server(1000).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;
        let mut s2 = connect(&server, "s2@school.edu", "Grace", Role::Student).await;

        let code = start_class(&mut teacher).await;
        s1.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        s2.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;

        let prompt_use_id = send_text_prompt(&mut teacher, &code, "Why?").await;
        s1.send(ClientEvent::SubmitThought {
            join_code: code.clone(),
            content: "A".to_string(),
            prompt_use_id,
        })
        .await;

        teacher
            .send(ClientEvent::TriggerSwap { join_code: code.clone() })
            .await;

        assert_eq!(s1.expect("RECEIVE_SWAP")["payload"]["content"], "A");
        assert_eq!(s2.expect("RECEIVE_SWAP")["payload"]["content"], "A");
        assert_eq!(teacher.expect("SWAP_COMPLETED")["payload"]["count"], 2);
    }

    #[tokio::test]
    async fn test_reswap_quota_is_enforced() {
        let server = test_server(1000).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;
        let mut s2 = connect(&server, "s2@school.edu", "Grace", Role::Student).await;
        let mut s3 = connect(&server, "s3@school.edu", "Edsger", Role::Student).await;

        let code = start_class(&mut teacher).await;
        for client in [&s1, &s2, &s3] {
            client
                .send(ClientEvent::JoinRoom { join_code: code.clone() })
                .await;
        }
        let prompt_use_id = send_text_prompt(&mut teacher, &code, "Why?").await;
        for (client, content) in [(&s1, "A"), (&s2, "B"), (&s3, "C")] {
            client
                .send(ClientEvent::SubmitThought {
                    join_code: code.clone(),
                    content: content.to_string(),
                    prompt_use_id,
                })
                .await;
        }
        teacher
            .send(ClientEvent::TriggerSwap { join_code: code.clone() })
            .await;
        let current = s1.expect("RECEIVE_SWAP")["payload"]["content"]
            .as_str()
            .unwrap()
            .to_string();

        // maxSwapRequests defaults to 1: first request succeeds
        s1.send(ClientEvent::StudentRequestNewThought {
            join_code: code.clone(),
            current_thought_content: current.clone(),
        })
        .await;
        let reswap = s1.expect("RECEIVE_SWAP");
        let fresh = reswap["payload"]["content"].as_str().unwrap().to_string();
        assert_ne!(fresh, current);

        // Second request trips the quota
        s1.send(ClientEvent::StudentRequestNewThought {
            join_code: code.clone(),
            current_thought_content: fresh,
        })
        .await;
        let error = s1.expect("ERROR");
        assert!(error["payload"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Limit reached"));

        let count = server
            .store()
            .count_swap_requests(s1.handler.user.id, {
                let (session, _) = server
                    .store()
                    .find_any_session_by_join_code(&code)
                    .await
                    .unwrap()
                    .unwrap();
                session.id
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_teacher_delete_allows_resubmission() {
        let server = test_server(1000).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;

        let code = start_class(&mut teacher).await;
        s1.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        let prompt_use_id = send_text_prompt(&mut teacher, &code, "Why?").await;

        s1.send(ClientEvent::SubmitThought {
            join_code: code.clone(),
            content: "A".to_string(),
            prompt_use_id,
        })
        .await;
        let thoughts = teacher.expect("THOUGHTS_UPDATE");
        let thought_id: Uuid = thoughts["payload"]["thoughts"][0]["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();

        // Duplicate submission while the first is live is rejected
        s1.send(ClientEvent::SubmitThought {
            join_code: code.clone(),
            content: "A-dup".to_string(),
            prompt_use_id,
        })
        .await;
        s1.expect("ERROR");

        teacher
            .send(ClientEvent::TeacherDeleteThought {
                join_code: code.clone(),
                thought_id,
            })
            .await;
        s1.expect("THOUGHT_DELETED");

        s1.send(ClientEvent::SubmitThought {
            join_code: code.clone(),
            content: "A2".to_string(),
            prompt_use_id,
        })
        .await;

        let update = teacher.expect("PARTICIPANTS_UPDATE");
        assert_eq!(update["payload"]["submissionCount"], 1);
        let live = server.store().list_thoughts(prompt_use_id).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].content, "A2");
    }

    #[tokio::test]
    async fn test_unknown_join_code_is_rejected() {
        let server = test_server(1000).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;

        s1.send(ClientEvent::JoinRoom {
            join_code: "ZZZZZZ".to_string(),
        })
        .await;
        let error = s1.expect("ERROR");
        assert_eq!(error["payload"]["message"], "Invalid Room Code");
    }

    #[tokio::test]
    async fn test_student_commands_on_teacher_events_are_silently_ignored() {
        let server = test_server(1000).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;

        let code = start_class(&mut teacher).await;
        s1.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        s1.drain();

        s1.send(ClientEvent::TriggerSwap { join_code: code.clone() }).await;
        s1.send(ClientEvent::EndSession { join_code: code.clone() }).await;

        // No ERROR, no acknowledgement: the commands do not exist for students
        assert!(s1.drain().is_empty());

        // And the session is untouched
        assert!(server
            .store()
            .find_active_session_by_join_code(&code)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_end_session_completes_store_and_destroys_room() {
        let server = test_server(1000).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;

        let code = start_class(&mut teacher).await;
        s1.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        s1.drain();

        teacher
            .send(ClientEvent::EndSession { join_code: code.clone() })
            .await;
        s1.expect("SESSION_ENDED");
        teacher.expect("SESSION_ENDED");

        // Subsequent joins see the completed session
        let mut s2 = connect(&server, "s2@school.edu", "Grace", Role::Student).await;
        s2.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        let error = s2.expect("ERROR");
        assert_eq!(error["payload"]["message"], "This class session has ended.");
    }

    #[tokio::test]
    async fn test_student_rejoin_restores_swapped_thought() {
        let server = test_server(1000).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;
        let mut s2 = connect(&server, "s2@school.edu", "Grace", Role::Student).await;

        let code = start_class(&mut teacher).await;
        s1.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        s2.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        let prompt_use_id = send_text_prompt(&mut teacher, &code, "Why?").await;
        for (client, content) in [(&s1, "A"), (&s2, "B")] {
            client
                .send(ClientEvent::SubmitThought {
                    join_code: code.clone(),
                    content: content.to_string(),
                    prompt_use_id,
                })
                .await;
        }
        teacher
            .send(ClientEvent::TriggerSwap { join_code: code.clone() })
            .await;
        let received = s1.expect("RECEIVE_SWAP")["payload"]["content"]
            .as_str()
            .unwrap()
            .to_string();

        // Drop the connection, come back on a fresh one
        s1.handler.cleanup().await;
        let mut rejoined = connect(&server, "s1@school.edu", "Ada", Role::Student).await;
        rejoined
            .send(ClientEvent::JoinRoom { join_code: code.clone() })
            .await;

        // Distribution is keyed by user, so the same thought comes back
        assert_eq!(
            rejoined.expect("RECEIVE_SWAP")["payload"]["content"],
            received.as_str()
        );
        assert_eq!(
            rejoined.expect("RESTORE_STATE")["payload"]["status"],
            "DISCUSSING"
        );
    }

    #[tokio::test]
    async fn test_teacher_disconnect_auto_ends_after_grace() {
        let server = test_server(40).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;

        let code = start_class(&mut teacher).await;
        s1.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        s1.drain();

        teacher.handler.cleanup().await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Past the debounce window the session must be COMPLETED
        let (session, _) = server
            .store()
            .find_any_session_by_join_code(&code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, crate::store::SessionStatus::Completed);
        s1.expect("SESSION_ENDED");
    }

    #[tokio::test]
    async fn test_teacher_rejoin_within_grace_keeps_session_alive() {
        let server = test_server(200).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let code = start_class(&mut teacher).await;

        teacher.handler.cleanup().await;

        // Page reload: back before the grace period expires
        let mut rejoined = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        rejoined
            .send(ClientEvent::TeacherRejoin { join_code: code.clone() })
            .await;
        rejoined.expect("CLASS_STARTED");

        tokio::time::sleep(Duration::from_millis(400)).await;
        let (session, _) = server
            .store()
            .find_any_session_by_join_code(&code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, crate::store::SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_zero_quota_blocks_every_reswap() {
        let server = test_server(1000).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;
        let mut s2 = connect(&server, "s2@school.edu", "Grace", Role::Student).await;

        let code = start_class(&mut teacher).await;
        teacher
            .send(ClientEvent::UpdateSessionSettings {
                join_code: code.clone(),
                max_swap_requests: 0,
            })
            .await;

        s1.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        s2.send(ClientEvent::JoinRoom { join_code: code.clone() }).await;
        let prompt_use_id = send_text_prompt(&mut teacher, &code, "Why?").await;
        for (client, content) in [(&s1, "A"), (&s2, "B")] {
            client
                .send(ClientEvent::SubmitThought {
                    join_code: code.clone(),
                    content: content.to_string(),
                    prompt_use_id,
                })
                .await;
        }
        teacher
            .send(ClientEvent::TriggerSwap { join_code: code.clone() })
            .await;
        s1.drain();

        s1.send(ClientEvent::StudentRequestNewThought {
            join_code: code.clone(),
            current_thought_content: "B".to_string(),
        })
        .await;
        let error = s1.expect("ERROR");
        assert!(error["payload"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Limit reached"));
    }

    #[tokio::test]
    async fn test_teacher_reassignment_changes_the_targets_thought() {
        let server = test_server(1000).await;
        let mut teacher = connect(&server, "t@school.edu", "Dr. Smith", Role::Teacher).await;
        let mut s1 = connect(&server, "s1@school.edu", "Ada", Role::Student).await;
        let mut s2 = connect(&server, "s2@school.edu", "Grace", Role::Student).await;
        let mut s3 = connect(&server, "s3@school.edu", "Edsger", Role::Student).await;

        let code = start_class(&mut teacher).await;
        for client in [&s1, &s2, &s3] {
            client
                .send(ClientEvent::JoinRoom { join_code: code.clone() })
                .await;
        }
        let prompt_use_id = send_text_prompt(&mut teacher, &code, "Why?").await;
        for (client, content) in [(&s1, "A"), (&s2, "B"), (&s3, "C")] {
            client
                .send(ClientEvent::SubmitThought {
                    join_code: code.clone(),
                    content: content.to_string(),
                    prompt_use_id,
                })
                .await;
        }
        teacher
            .send(ClientEvent::TriggerSwap { join_code: code.clone() })
            .await;
        let before = s1.expect("RECEIVE_SWAP")["payload"]["content"]
            .as_str()
            .unwrap()
            .to_string();

        teacher
            .send(ClientEvent::TeacherReassignDistribution {
                join_code: code.clone(),
                student_connection_id: s1.handler.connection_id(),
            })
            .await;
        let after = s1.expect("RECEIVE_SWAP")["payload"]["content"]
            .as_str()
            .unwrap()
            .to_string();

        assert_ne!(after, before);
        assert_ne!(after, "A");
    }
}
