use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Messages store location: file path for the embedded driver, full DSN
    /// for the external one. Unset means `MEDIA_ROOT/messages.db`.
    pub data_dsn: Option<String>,
    /// Sessions store location; falls back to `DATA_DSN`, then to
    /// `MEDIA_ROOT/session.db`.
    pub sessions_dsn: Option<String>,
    /// Base directory for downloaded media and the embedded databases.
    pub media_root: PathBuf,
    /// HTTP listen port.
    pub port: u16,
    /// Object-store location for session backup (embedded sessions only).
    /// Either a bare bucket name or a full base URL.
    pub session_bucket: Option<String>,
    /// Object name inside the bucket.
    pub session_object: String,
    /// Log level when RUST_LOG is not set: debug|info|warn|error.
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            data_dsn: None,
            sessions_dsn: None,
            media_root: PathBuf::from("./store"),
            port: 8080,
            session_bucket: None,
            session_object: "session.db".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dsn) = std::env::var("DATA_DSN") {
            if !dsn.trim().is_empty() {
                config.data_dsn = Some(dsn);
            }
        }

        if let Ok(dsn) = std::env::var("SESSIONS_DSN") {
            if !dsn.trim().is_empty() {
                config.sessions_dsn = Some(dsn);
            }
        }

        if let Ok(root) = std::env::var("MEDIA_ROOT") {
            if !root.trim().is_empty() {
                config.media_root = PathBuf::from(root);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                config.port = parsed;
            } else {
                tracing::warn!(value = %port, "Invalid PORT, using default");
            }
        }

        if let Ok(bucket) = std::env::var("SESSION_BUCKET") {
            if !bucket.trim().is_empty() {
                config.session_bucket = Some(bucket.trim().to_string());
            }
        }

        if let Ok(object) = std::env::var("SESSION_OBJECT") {
            if !object.trim().is_empty() {
                config.session_object = object.trim().to_string();
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            match level.as_str() {
                "debug" | "info" | "warn" | "error" => config.log_level = level,
                other => {
                    tracing::warn!(value = %other, "Invalid LOG_LEVEL, using default");
                }
            }
        }

        config
    }

    pub fn listen_addr(&self) -> std::net::SocketAddr {
        ([0, 0, 0, 0], self.port).into()
    }

    /// Location of the embedded messages database when `DATA_DSN` is unset.
    pub fn default_messages_path(&self) -> PathBuf {
        self.media_root.join("messages.db")
    }

    /// Location of the embedded session database when neither DSN applies.
    pub fn default_session_path(&self) -> PathBuf {
        self.media_root.join("session.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.media_root, PathBuf::from("./store"));
        assert_eq!(config.session_object, "session.db");
        assert_eq!(config.listen_addr(), ([0, 0, 0, 0], 8080).into());
    }

    #[test]
    fn embedded_defaults_live_under_media_root() {
        let config = BridgeConfig {
            media_root: PathBuf::from("/data"),
            ..BridgeConfig::default()
        };
        assert_eq!(config.default_messages_path(), PathBuf::from("/data/messages.db"));
        assert_eq!(config.default_session_path(), PathBuf::from("/data/session.db"));
    }
}
