//! Identity resolution and consent.
//!
//! The handshake carries `{email, name, role}` as hints only; the stored
//! User record is authoritative for every policy decision afterwards.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Result, SwapError};
use crate::store::{Role, Store, User, UserProfile};

/// Emails with this prefix resolve as throwaway guest accounts
pub const GUEST_EMAIL_PREFIX: &str = "guest_";

/// Identity hints from the connection handshake
#[derive(Debug, Clone, Default)]
pub struct IdentityHints {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

/// Resolve the handshake hints to a persistent user.
///
/// Guests are upserted from the hints with a synthesized external id; anyone
/// else must already exist in the store (created through the LMS callback).
pub async fn resolve_identity(store: &dyn Store, hints: &IdentityHints) -> Result<User> {
    let email = hints
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| SwapError::Auth("handshake carried no email".to_string()))?;

    if email.to_lowercase().starts_with(GUEST_EMAIL_PREFIX) {
        let profile = UserProfile {
            external_id: Some(format!("guest:{}", Uuid::new_v4())),
            email: email.to_string(),
            name: hints
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Guest".to_string()),
            role: parse_role_hint(hints.role.as_deref()).unwrap_or(Role::Student),
        };
        return store.upsert_user(profile).await;
    }

    store
        .find_user_by_email(email)
        .await?
        .ok_or_else(|| SwapError::Auth(format!("no account for {}", email)))
}

/// Role hints are case-insensitive; an unparseable hint is no hint at all.
pub fn parse_role_hint(role: Option<&str>) -> Option<Role> {
    match role?.trim().to_ascii_uppercase().as_str() {
        "STUDENT" => Some(Role::Student),
        "TEACHER" => Some(Role::Teacher),
        "ADMIN" => Some(Role::Admin),
        _ => None,
    }
}

/// Profile handed back by the external LMS after the OAuth code exchange
#[derive(Debug, Clone)]
pub struct AuthProfile {
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// The OAuth collaborator boundary. The real exchange lives outside this
/// process; the callback shim only needs this seam.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, code: &str) -> Result<AuthProfile>;
}

/// Development stand-in: every code is rejected.
pub struct RejectAllAuthenticator;

#[async_trait]
impl Authenticator for RejectAllAuthenticator {
    async fn authenticate(&self, _code: &str) -> Result<AuthProfile> {
        Err(SwapError::Auth("no authenticator configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_guest_resolution_creates_a_user() {
        let store = InMemoryStore::new();
        let hints = IdentityHints {
            email: Some("guest_abc@thoughtswap.local".to_string()),
            name: Some("Ada".to_string()),
            role: Some("teacher".to_string()),
        };

        let user = resolve_identity(&store, &hints).await.unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(user.role, Role::Teacher);
        assert!(user.external_id.unwrap().starts_with("guest:"));
    }

    #[tokio::test]
    async fn test_unknown_email_fails_authentication() {
        let store = InMemoryStore::new();
        let hints = IdentityHints {
            email: Some("nobody@school.edu".to_string()),
            name: None,
            role: None,
        };

        let err = resolve_identity(&store, &hints).await.unwrap_err();
        assert!(matches!(err, SwapError::Auth(_)));
    }

    #[tokio::test]
    async fn test_stored_role_wins_over_handshake_hint() {
        let store = InMemoryStore::new();
        store
            .upsert_user(UserProfile {
                external_id: Some("lms-1".to_string()),
                email: "ada@school.edu".to_string(),
                name: "Ada".to_string(),
                role: Role::Student,
            })
            .await
            .unwrap();

        let hints = IdentityHints {
            email: Some("ada@school.edu".to_string()),
            name: Some("Ada".to_string()),
            role: Some("TEACHER".to_string()),
        };
        let user = resolve_identity(&store, &hints).await.unwrap();
        assert_eq!(user.role, Role::Student);
    }

    #[test]
    fn test_role_hint_parsing() {
        assert_eq!(parse_role_hint(Some("teacher")), Some(Role::Teacher));
        assert_eq!(parse_role_hint(Some(" ADMIN ")), Some(Role::Admin));
        assert_eq!(parse_role_hint(Some("wizard")), None);
        assert_eq!(parse_role_hint(None), None);
    }
}
