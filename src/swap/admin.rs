//! Read-only aggregation over live rooms and the store, filtered by consent.
//!
//! Computed on demand; the admin client polls on its own cadence.

use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{LogEvent, SessionStatus, Store, SwapRequest, ThoughtWithAuthor};

/// How many recent log events ride along in a snapshot
pub const RECENT_LOG_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSnapshot {
    pub sessions: Vec<AdminSessionInfo>,
    pub thoughts: Vec<ThoughtWithAuthor>,
    pub swaps: Vec<SwapRequest>,
    pub logs: Vec<LogEvent>,
    pub stats: AdminStatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSessionInfo {
    pub session_id: Uuid,
    pub course_title: String,
    pub join_code: String,
    pub status: SessionStatus,
    pub max_swap_requests: u32,
    pub prompt_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatsSnapshot {
    pub total_consented: usize,
    pub total_users: usize,
    pub active_users: usize,
    pub active_sessions: usize,
    pub total_thoughts: usize,
    pub total_swaps: usize,
}

pub async fn collect_snapshot(store: &dyn Store, active_users: usize) -> Result<AdminSnapshot> {
    let mut sessions = Vec::new();
    for (session, course) in store.active_sessions().await? {
        let prompt_count = store.prompt_uses_for_session(session.id).await?.len();
        sessions.push(AdminSessionInfo {
            session_id: session.id,
            course_title: course.title,
            join_code: course.join_code,
            status: session.status,
            max_swap_requests: session.max_swap_requests,
            prompt_count,
        });
    }

    let thoughts = store.all_consented_thoughts().await?;
    let swaps = store.all_consented_swap_requests().await?;
    let logs = store.recent_log_events(RECENT_LOG_LIMIT).await?;
    let users = store.user_stats().await?;

    let stats = AdminStatsSnapshot {
        total_consented: users.total_consented,
        total_users: users.total_users,
        active_users,
        active_sessions: sessions.len(),
        total_thoughts: thoughts.len(),
        total_swaps: swaps.len(),
    };

    Ok(AdminSnapshot {
        sessions,
        thoughts,
        swaps,
        logs,
        stats,
    })
}
