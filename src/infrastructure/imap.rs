use crate::core::config::RelayConfig;
use crate::core::error::{SyncError, SyncResult};
use crate::services::sync::idle::await_long_poll;
use crate::services::sync::mailbox::{IdleOutcome, Mailbox, MailboxView, MessageMeta, Uid};
use async_imap::extensions::idle::IdleResponse;
use async_trait::async_trait;
use futures::{pin_mut, StreamExt};
use mail_parser::MessageParser;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_native_tls::TlsConnector;
use tracing::{debug, info, warn};

pub type ImapSession = async_imap::Session<tokio_native_tls::TlsStream<TcpStream>>;

/// Messages awaiting intake: everything in the inbox that is not already
/// flagged for removal by an earlier (possibly interrupted) relocation.
const PENDING_CRITERION: &str = "UNDELETED";

/// One authenticated IMAP connection plus the folder state bound to it.
///
/// The session slot is taken for the duration of an IDLE and restored on the
/// way out; it is dropped, never repaired, after a fatal error.
pub struct ImapMailbox {
    server: String,
    port: u16,
    username: String,
    password: String,
    op_timeout: Duration,
    session: Option<ImapSession>,
}

impl ImapMailbox {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            server: config.imap_server.clone(),
            port: config.imap_port,
            username: config.username.clone(),
            password: config.password.clone(),
            op_timeout: config.op_timeout(),
            session: None,
        }
    }

    fn session(&mut self) -> SyncResult<&mut ImapSession> {
        self.session
            .as_mut()
            .ok_or_else(|| SyncError::Connect("IMAP session not connected".into()))
    }

    /// LIST every folder on the server. Used by the connectivity check only.
    pub async fn list_folders(&mut self) -> SyncResult<Vec<String>> {
        let limit = self.op_timeout;
        let session = self.session()?;
        bounded(limit, async {
            let mut stream = session
                .list(Some(""), Some("*"))
                .await
                .map_err(|e| SyncError::Connect(format!("list: {}", e)))?;

            let mut names = Vec::new();
            while let Some(name) = stream.next().await {
                let name = name.map_err(|e| SyncError::Connect(format!("list: {}", e)))?;
                names.push(name.name().to_string());
            }
            Ok(names)
        })
        .await
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn connect(&mut self) -> SyncResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        info!("Connecting to {}:{}...", self.server, self.port);
        let session = bounded(self.op_timeout, async {
            let tcp_stream = TcpStream::connect((self.server.as_str(), self.port))
                .await
                .map_err(|e| SyncError::Connect(format!("dial: {}", e)))?;

            let native_tls = native_tls::TlsConnector::builder()
                .build()
                .map_err(|e| SyncError::Connect(format!("tls setup: {}", e)))?;
            let connector = TlsConnector::from(native_tls);

            let tls_stream = connector
                .connect(&self.server, tcp_stream)
                .await
                .map_err(|e| SyncError::Connect(format!("tls handshake: {}", e)))?;

            let client = async_imap::Client::new(tls_stream);

            client
                .login(&self.username, &self.password)
                .await
                .map_err(|e| SyncError::Auth(e.0.to_string()))
        })
        .await?;

        info!("Logged in as {}", self.username);
        self.session = Some(session);
        Ok(())
    }

    async fn logout(&mut self) -> SyncResult<()> {
        // The session is taken up front: even a hung LOGOUT leaves the slot
        // empty, so the next connect builds a fresh connection.
        if let Some(mut session) = self.session.take() {
            bounded(self.op_timeout, async {
                session
                    .logout()
                    .await
                    .map_err(|e| SyncError::Connect(format!("logout: {}", e)))
            })
            .await?;
        }
        Ok(())
    }

    async fn select(&mut self, folder: &str) -> SyncResult<MailboxView> {
        let limit = self.op_timeout;
        let session = self.session()?;
        let mailbox = bounded(limit, async {
            session
                .select(folder)
                .await
                .map_err(|e| SyncError::Connect(format!("select {:?}: {}", folder, e)))
        })
        .await?;

        debug!("Selected {:?}: {} messages", folder, mailbox.exists);
        Ok(MailboxView {
            exists: mailbox.exists,
        })
    }

    async fn search_pending(&mut self) -> SyncResult<Vec<Uid>> {
        let limit = self.op_timeout;
        let session = self.session()?;
        let uids = bounded(limit, async {
            session
                .uid_search(PENDING_CRITERION)
                .await
                .map_err(|e| SyncError::Fetch(format!("search: {}", e)))
        })
        .await?;

        let mut refs: Vec<Uid> = uids.into_iter().collect();
        // Newest first.
        refs.sort_unstable_by(|a, b| b.cmp(a));
        Ok(refs)
    }

    async fn fetch_meta(&mut self, uid: Uid) -> SyncResult<Option<MessageMeta>> {
        let limit = self.op_timeout;
        let session = self.session()?;
        bounded(limit, async {
            let mut stream = session
                .uid_fetch(uid.to_string(), "(UID ENVELOPE FLAGS RFC822.SIZE)")
                .await
                .map_err(|e| SyncError::Fetch(format!("uid {} meta: {}", uid, e)))?;

            let mut meta = None;
            while let Some(fetch) = stream.next().await {
                let fetch = fetch.map_err(|e| SyncError::Fetch(format!("uid {} meta: {}", uid, e)))?;
                if meta.is_some() {
                    continue;
                }

                let envelope = match fetch.envelope() {
                    Some(envelope) => envelope,
                    None => continue,
                };
                // A missing size would let anything through the size gate.
                let size = fetch
                    .size
                    .ok_or_else(|| SyncError::Fetch(format!("uid {}: no size returned", uid)))?;
                meta = Some(MessageMeta {
                    subject: decode_subject(envelope.subject.as_deref()),
                    message_id: decode_field(envelope.message_id.as_deref()),
                    flags: fetch.flags().map(|f| format!("{:?}", f)).collect(),
                    size,
                });
            }
            Ok(meta)
        })
        .await
    }

    async fn fetch_body(&mut self, uid: Uid) -> SyncResult<Option<Vec<u8>>> {
        let limit = self.op_timeout;
        let session = self.session()?;
        bounded(limit, async {
            let mut stream = session
                .uid_fetch(uid.to_string(), "RFC822")
                .await
                .map_err(|e| SyncError::Fetch(format!("uid {} body: {}", uid, e)))?;

            let mut body = None;
            while let Some(fetch) = stream.next().await {
                let fetch = fetch.map_err(|e| SyncError::Fetch(format!("uid {} body: {}", uid, e)))?;
                if body.is_none() {
                    body = fetch.body().map(|b| b.to_vec());
                }
            }
            Ok(body)
        })
        .await
    }

    async fn copy(&mut self, refs: &[Uid], target: &str) -> SyncResult<()> {
        if refs.is_empty() {
            return Ok(());
        }
        let set = uid_set(refs);
        let limit = self.op_timeout;
        let session = self.session()?;
        bounded(limit, async {
            session
                .uid_copy(&set, target)
                .await
                .map_err(|e| SyncError::Command {
                    op: "copy",
                    reason: format!("{} to {:?}: {}", set, target, e),
                })
        })
        .await
    }

    async fn mark_deleted(&mut self, refs: &[Uid]) -> SyncResult<()> {
        if refs.is_empty() {
            return Ok(());
        }
        let set = uid_set(refs);
        let limit = self.op_timeout;
        let session = self.session()?;
        bounded(limit, async {
            let mut stream = session
                .uid_store(&set, "+FLAGS (\\Deleted)")
                .await
                .map_err(|e| SyncError::Command {
                    op: "store",
                    reason: format!("{}: {}", set, e),
                })?;
            while let Some(res) = stream.next().await {
                res.map_err(|e| SyncError::Command {
                    op: "store",
                    reason: format!("{}: {}", set, e),
                })?;
            }
            Ok(())
        })
        .await
    }

    async fn expunge(&mut self) -> SyncResult<()> {
        let limit = self.op_timeout;
        let session = self.session()?;
        bounded(limit, async {
            let stream = session.expunge().await.map_err(|e| SyncError::Command {
                op: "expunge",
                reason: e.to_string(),
            })?;
            // The unsolicited-response stream is not Unpin.
            pin_mut!(stream);
            while let Some(res) = stream.next().await {
                res.map_err(|e| SyncError::Command {
                    op: "expunge",
                    reason: e.to_string(),
                })?;
            }
            Ok(())
        })
        .await
    }

    async fn idle_wait(&mut self, budget: Duration) -> SyncResult<IdleOutcome> {
        let session = self
            .session
            .take()
            .ok_or_else(|| SyncError::Connect("IMAP session not connected".into()))?;

        let mut handle = session.idle();
        if let Err(e) = handle.init().await {
            // The DONE teardown must run on every exit path, or the update
            // subscription keeps the connection wedged.
            if let Ok(session) = handle.done().await {
                self.session = Some(session);
            }
            return Err(SyncError::Idle(format!("init: {}", e)));
        }

        debug!("IDLE registered, waiting up to {:?}", budget);
        let (poll, stop_source) = handle.wait();
        let (result, timed_out) = await_long_poll(poll, stop_source, budget).await;

        match tokio::time::timeout(self.op_timeout, handle.done()).await {
            Ok(Ok(session)) => self.session = Some(session),
            Ok(Err(e)) => return Err(SyncError::Idle(format!("done: {}", e))),
            Err(_) => return Err(SyncError::Timeout(self.op_timeout)),
        }

        match result {
            Ok(IdleResponse::NewData(_)) => {
                debug!("IDLE: server notification received");
                Ok(IdleOutcome::Notified)
            }
            Ok(_) => {
                if timed_out {
                    debug!("IDLE: stopped by idle budget");
                } else {
                    warn!("IDLE: interrupted without notification or budget");
                }
                Ok(IdleOutcome::TimedOut)
            }
            Err(e) => Err(SyncError::Idle(e.to_string())),
        }
    }
}

fn uid_set(refs: &[Uid]) -> String {
    refs.iter()
        .map(|uid| uid.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_field(raw: Option<&[u8]>) -> String {
    raw.map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

/// Decodes an envelope subject, including RFC 2047 encoded words, by running
/// it through the header parser as a one-header message.
fn decode_subject(raw: Option<&[u8]>) -> String {
    let raw = match raw {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return String::new(),
    };
    let mut header = Vec::with_capacity(raw.len() + 13);
    header.extend_from_slice(b"Subject: ");
    header.extend_from_slice(raw);
    header.extend_from_slice(b"\r\n\r\n");
    MessageParser::default()
        .parse(header.as_slice())
        .and_then(|parsed| parsed.subject().map(|s| s.to_string()))
        .unwrap_or_else(|| String::from_utf8_lossy(raw).into_owned())
}

/// Bounds a single protocol round-trip so a stalled connection never hangs
/// the loop past the server's own keep-alive expectations.
async fn bounded<T, F>(limit: Duration, fut: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(SyncError::Timeout(limit)),
    }
}
