/// Realtime gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HS256 secret used to verify handshake tokens. When `None`, every
    /// connection attempt is refused.
    pub jwt_secret: Option<String>,
    /// PostgreSQL connection string. When `None`, the in-memory store is used.
    pub database_url: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Number of recent messages sent to a client after it joins a room.
    pub history_limit: usize,
    /// Maximum length (in characters) of chat and direct message content.
    pub max_message_length: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// Endpoint that receives notification requests. Notifications are only
    /// logged when unset.
    pub notify_webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: optional_var("JWT_SECRET"),
            database_url: optional_var("DATABASE_URL"),
            port: parsed_var("PORT", 4100),
            history_limit: parsed_var("HISTORY_LIMIT", 50),
            max_message_length: parsed_var("MAX_MESSAGE_LENGTH", 4000),
            outbound_buffer: parsed_var("OUTBOUND_BUFFER", 256).max(1),
            notify_webhook_url: optional_var("NOTIFY_WEBHOOK_URL"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            database_url: None,
            port: 4100,
            history_limit: 50,
            max_message_length: 4000,
            outbound_buffer: 256,
            notify_webhook_url: None,
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
