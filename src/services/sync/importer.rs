use crate::core::config::RelayConfig;
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// The external importer rejected or failed on a message. Never retried;
/// the message routes straight to quarantine.
#[derive(Error, Debug)]
#[error("import failed: {0}")]
pub struct ImportError(pub String);

/// External message sink. Receives the full raw RFC822 bytes of one message.
#[async_trait]
pub trait MessageImporter: Send + Sync {
    async fn import(&self, raw: &[u8]) -> Result<(), ImportError>;
}

/// POSTs raw messages to the configured import endpoint.
pub struct HttpImporter {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpImporter {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            endpoint: config.import_url.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MessageImporter for HttpImporter {
    async fn import(&self, raw: &[u8]) -> Result<(), ImportError> {
        info!("Importing {} bytes via {}", raw.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "message/rfc822")
            .body(raw.to_vec())
            .send()
            .await
            .map_err(|e| ImportError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ImportError(format!("{}: {}", status, detail)));
        }

        info!("Import accepted ({})", status);
        Ok(())
    }
}
