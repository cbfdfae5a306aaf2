//! Process-wide mapping from join code to live Room.
//!
//! Uniqueness of active codes is guaranteed by the store, never in memory:
//! a code only enters the registry after `create_course_with_session` (or an
//! active-session lookup) has vouched for it.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::RwLock;

use super::room::Room;

/// Attempts at a unique join code before the start request fails
pub const JOIN_CODE_ATTEMPTS: usize = 10;

const JOIN_CODE_LEN: usize = 6;
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, Arc<Room>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, room: Arc<Room>) {
        let mut rooms = self.rooms.write().await;
        rooms.insert(room.join_code.clone(), room);
    }

    pub async fn lookup(&self, join_code: &str) -> Option<Arc<Room>> {
        let rooms = self.rooms.read().await;
        rooms.get(&normalize_join_code(join_code)).cloned()
    }

    pub async fn remove(&self, join_code: &str) -> Option<Arc<Room>> {
        let mut rooms = self.rooms.write().await;
        rooms.remove(&normalize_join_code(join_code))
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Join codes are case-normalized on input
pub fn normalize_join_code(join_code: &str) -> String {
    join_code.trim().to_ascii_uppercase()
}

/// 6 characters uniformly random over `[A-Z0-9]`
pub fn generate_join_code(rng: &mut impl Rng) -> String {
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.gen_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}
