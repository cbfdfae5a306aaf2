use std::env;
use std::net::{Ipv4Addr, SocketAddrV4};

pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

pub struct SessionConfig {
    /// Where the OAuth callback redirects after resolving an identity
    pub ui_redirect_url: String,
    /// Optional survey link included in SESSION_ENDED
    pub survey_url: Option<String>,
    /// Grace period before a teacher disconnect auto-ends their sessions
    pub teacher_grace_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .expect("Invalid SERVER_PORT"),
            },
            session: SessionConfig {
                ui_redirect_url: env::var("UI_REDIRECT_URL")
                    .unwrap_or_else(|_| "http://localhost:5173/auth".to_string()),
                survey_url: env::var("SURVEY_URL").ok(),
                teacher_grace_secs: env::var("TEACHER_DISCONNECT_GRACE_SECS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .expect("Invalid TEACHER_DISCONNECT_GRACE_SECS"),
            },
        }
    }

    /// Socket address the session server binds. The server is IPv4-only;
    /// anything unparseable falls back to all interfaces with a warning.
    pub fn bind_address(&self) -> SocketAddrV4 {
        let ip = match self.server.host.trim() {
            "" | "0.0.0.0" => Ipv4Addr::UNSPECIFIED,
            "localhost" => Ipv4Addr::LOCALHOST,
            host => host.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    host = %host,
                    "SERVER_HOST is not an IPv4 address, binding 0.0.0.0"
                );
                Ipv4Addr::UNSPECIFIED
            }),
        };
        SocketAddrV4::new(ip, self.server.port)
    }
}
