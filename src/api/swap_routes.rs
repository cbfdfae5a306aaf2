use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use warp::http::Uri;
use warp::Filter;

use crate::swap::identity::{Authenticator, IdentityHints};
use crate::swap::ThoughtSwapServer;
use crate::store::{Store, UserProfile};

use super::swap_websocket;

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    email: Option<String>,
    name: Option<String>,
    role: Option<String>,
}

pub fn swap_websocket_route(
    server: Arc<ThoughtSwapServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("ws")
        .and(warp::query::<HandshakeQuery>())
        .and(warp::ws())
        .and(with_server(server))
        .map(
            |query: HandshakeQuery, ws: warp::ws::Ws, server: Arc<ThoughtSwapServer>| {
                let hints = IdentityHints {
                    email: query.email,
                    name: query.name,
                    role: query.role,
                };
                ws.on_upgrade(move |websocket| {
                    swap_websocket::handle_swap_websocket(websocket, server, hints)
                })
            },
        )
}

pub fn health_route() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "service": "ThoughtSwap Session Server",
            "version": env!("CARGO_PKG_VERSION")
        }))
    })
}

#[derive(Debug, Deserialize)]
pub struct OauthCallbackQuery {
    code: Option<String>,
    #[allow(dead_code)]
    state: Option<String>,
    error: Option<String>,
}

/// Thin shim for the LMS OAuth callback: exchange the code through the
/// collaborator, upsert the user, and bounce to the UI with the resolved
/// identity in the query string. Errors are echoed onto the redirect.
pub fn auth_callback_route(
    server: Arc<ThoughtSwapServer>,
    authenticator: Arc<dyn Authenticator>,
    redirect_url: String,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("auth" / "callback")
        .and(warp::get())
        .and(warp::query::<OauthCallbackQuery>())
        .and(with_server(server))
        .and(warp::any().map(move || authenticator.clone()))
        .and(warp::any().map(move || redirect_url.clone()))
        .and_then(handle_oauth_callback)
}

async fn handle_oauth_callback(
    query: OauthCallbackQuery,
    server: Arc<ThoughtSwapServer>,
    authenticator: Arc<dyn Authenticator>,
    redirect_url: String,
) -> Result<impl warp::Reply, warp::Rejection> {
    let location = if let Some(error) = query.error {
        format!("{}?error={}", redirect_url, urlencoding::encode(&error))
    } else {
        match query.code {
            None => format!("{}?error=missing_code", redirect_url),
            Some(code) => match authenticator.authenticate(&code).await {
                Ok(profile) => {
                    let upserted = server
                        .store()
                        .upsert_user(UserProfile {
                            external_id: Some(profile.external_id),
                            email: profile.email,
                            name: profile.name,
                            role: profile.role,
                        })
                        .await;
                    match upserted {
                        Ok(user) => format!(
                            "{}?name={}&role={}&email={}",
                            redirect_url,
                            urlencoding::encode(&user.name),
                            urlencoding::encode(&role_label(user.role)),
                            urlencoding::encode(&user.email)
                        ),
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to upsert authenticated user");
                            format!("{}?error=internal", redirect_url)
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "OAuth code exchange failed");
                    format!("{}?error=auth_failed", redirect_url)
                }
            },
        }
    };

    let uri: Uri = location
        .parse()
        .unwrap_or_else(|_| Uri::from_static("/"));
    Ok(warp::redirect::temporary(uri))
}

fn role_label(role: crate::store::Role) -> String {
    match role {
        crate::store::Role::Student => "STUDENT".to_string(),
        crate::store::Role::Teacher => "TEACHER".to_string(),
        crate::store::Role::Admin => "ADMIN".to_string(),
    }
}

fn with_server(
    server: Arc<ThoughtSwapServer>,
) -> impl Filter<Extract = (Arc<ThoughtSwapServer>,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}
