use anyhow::{Context, Result};
use std::time::Duration;
use tracing::warn;

/// Relay configuration, built once at startup and passed by reference into
/// every component.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub imap_server: String,
    pub imap_port: u16,
    pub username: String,
    pub password: String,
    pub folder_inbox: String,
    pub folder_moved: String,
    pub folder_quarantine: String,
    pub max_message_size: u32,
    pub idle_timeout: Duration,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub notify_to: String,
    pub import_url: String,
}

impl RelayConfig {
    /// Load from `.env` / environment variables.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = Self {
            imap_server: Self::env_required("RELAY_IMAP_SERVER")?,
            imap_port: Self::env_parse("RELAY_IMAP_PORT", 993)?,
            username: Self::env_required("RELAY_USERNAME")?,
            password: Self::env_required("RELAY_PASSWORD")?,
            folder_inbox: Self::env_or("RELAY_FOLDER_INBOX", "INBOX"),
            folder_moved: Self::env_or("RELAY_FOLDER_MOVED", "Moved"),
            folder_quarantine: Self::env_or("RELAY_FOLDER_QUARANTINE", "Quarantine"),
            max_message_size: Self::env_parse("RELAY_MAX_MESSAGE_SIZE", 20_000_000)?,
            idle_timeout: Duration::from_secs(Self::env_parse("RELAY_IDLE_TIMEOUT_SECS", 600)?),
            smtp_server: Self::env_or("RELAY_SMTP_SERVER", "localhost"),
            smtp_port: Self::env_parse("RELAY_SMTP_PORT", 587)?,
            notify_to: Self::env_required("RELAY_NOTIFY_TO")?,
            import_url: Self::env_required("RELAY_IMPORT_URL")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Deadline for any single protocol round-trip. A stalled operation must
    /// never silently hang past the server's own keep-alive expectations.
    pub fn op_timeout(&self) -> Duration {
        self.idle_timeout * 2
    }

    /// Window after which a missing watchdog pulse counts as a hang.
    pub fn liveness_window(&self) -> Duration {
        self.idle_timeout * 3
    }

    fn validate(&self) -> Result<()> {
        if self.imap_port == 0 {
            anyhow::bail!("Invalid IMAP port: {}", self.imap_port);
        }
        if self.smtp_port == 0 {
            anyhow::bail!("Invalid SMTP port: {}", self.smtp_port);
        }
        if self.imap_server.is_empty() {
            anyhow::bail!("IMAP server cannot be empty");
        }
        if self.max_message_size == 0 {
            anyhow::bail!("Max message size must be greater than 0");
        }
        if self.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }
        if self.idle_timeout > Duration::from_secs(1740) {
            // RFC 2177 asks clients to re-issue IDLE at least every 29 minutes.
            warn!(
                "Idle timeout {:?} exceeds the 29 minute IDLE re-issue window",
                self.idle_timeout
            );
        }

        let folders = [
            &self.folder_inbox,
            &self.folder_moved,
            &self.folder_quarantine,
        ];
        if folders.iter().any(|f| f.is_empty()) {
            anyhow::bail!("Folder names cannot be empty");
        }
        if self.folder_moved == self.folder_inbox || self.folder_quarantine == self.folder_inbox {
            anyhow::bail!("Moved/quarantine folders must differ from the inbox");
        }

        Ok(())
    }

    fn env_or(key: &str, default: &str) -> String {
        std::env::var(key).unwrap_or_else(|_| default.to_string())
    }

    fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        match std::env::var(key) {
            Ok(val) => val
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
            Err(_) => Ok(default),
        }
    }

    fn env_required(key: &str) -> Result<String> {
        std::env::var(key).context(format!("{} not set in .env file", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RelayConfig {
        RelayConfig {
            imap_server: "imap.example.com".into(),
            imap_port: 993,
            username: "relay@example.com".into(),
            password: "secret".into(),
            folder_inbox: "INBOX".into(),
            folder_moved: "Moved".into(),
            folder_quarantine: "Quarantine".into(),
            max_message_size: 1000,
            idle_timeout: Duration::from_secs(600),
            smtp_server: "smtp.example.com".into(),
            smtp_port: 587,
            notify_to: "ops@example.com".into(),
            import_url: "https://importer.example.com/ingest".into(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_op_timeout_is_twice_idle_budget() {
        let config = base_config();
        assert_eq!(config.op_timeout(), Duration::from_secs(1200));
    }

    #[test]
    fn test_rejects_inbox_as_target_folder() {
        let mut config = base_config();
        config.folder_quarantine = "INBOX".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_max_size() {
        let mut config = base_config();
        config.max_message_size = 0;
        assert!(config.validate().is_err());
    }
}
