//! Answers to bot commands sent by chat users
//!
//! Only `/start` is understood. The reply carries the sender's Telegram id,
//! which the operator then adds to `notifier.recipients`. Updates are pulled
//! with `getUpdates` long polling; replies go out through
//! [`TelegramNotifier`].

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::telegram::{classify, TelegramConfig, TelegramNotifier};
use super::{Notifier, NotifyError, NotifyResult, Recipient};
use crate::utils::signalled;

/// Pause after a failed poll before asking again
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

/// Long-polling listener replying to `/start`
pub struct CommandListener {
    config: TelegramConfig,
    client: Client,
    replies: TelegramNotifier,
    poll_timeout: Duration,
}

impl CommandListener {
    pub fn new(config: TelegramConfig, poll_timeout: Duration) -> NotifyResult<Self> {
        let replies = TelegramNotifier::new(config.clone())?;
        let client = Client::builder()
            .build()
            .map_err(|e| NotifyError::InvalidConfig(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            replies,
            poll_timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/getUpdates",
            self.config.api_base.trim_end_matches('/'),
            self.config.token
        )
    }

    /// Fetch one batch of updates and answer the commands in it
    ///
    /// Returns the offset confirming every update of the batch. A reply
    /// that fails is logged and does not hold the offset back.
    pub async fn poll_once(&self, offset: i64) -> NotifyResult<i64> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: ["message"],
        };

        let response = self
            .client
            .post(self.endpoint())
            .timeout(self.poll_timeout + Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body: Option<UpdatesResponse> = response.json().await.ok();
        let updates = match body {
            Some(UpdatesResponse {
                ok: true, result, ..
            }) if status.is_success() => result,
            other => {
                return Err(NotifyError::Rejected {
                    status: status.as_u16(),
                    description: other
                        .and_then(|b| b.description)
                        .unwrap_or_else(|| status.to_string()),
                })
            }
        };

        let mut next = offset;
        for update in updates {
            next = next.max(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            if !is_start(message.text.as_deref()) {
                continue;
            }

            let chat = Recipient::new(message.chat.id.to_string());
            let reply = start_reply(message.from.map(|user| user.id));
            match self.replies.send(&chat, &reply, &[]).await {
                Ok(()) => info!(chat = %chat, "Answered /start"),
                Err(e) => warn!(chat = %chat, error = %e, "Failed to answer /start"),
            }
        }

        Ok(next)
    }

    /// Poll until shutdown
    ///
    /// Recoverable failures are retried after a pause. Anything else, such
    /// as a revoked token or a second poller on the same bot, ends the
    /// listener.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Listening for bot commands");
        let mut offset = 0;

        loop {
            let polled = tokio::select! {
                biased;
                _ = signalled(&mut shutdown) => break,
                polled = self.poll_once(offset) => polled,
            };

            match polled {
                Ok(next) => offset = next,
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "Polling bot updates failed, retrying");
                    tokio::select! {
                        biased;
                        _ = signalled(&mut shutdown) => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "Polling bot updates failed, giving up");
                    break;
                }
            }
        }

        debug!("Command listener stopped");
    }
}

/// Whether a message text invokes `/start`, possibly addressed as `/start@bot`
fn is_start(text: Option<&str>) -> bool {
    text.and_then(|t| t.split_whitespace().next())
        .and_then(|command| command.split('@').next())
        == Some("/start")
}

/// Reply to `/start`
pub fn start_reply(user_id: Option<i64>) -> String {
    match user_id {
        Some(id) => format!(
            "<b>Hello!</b> I'm a job tracker bot.\nYour ID: {id}.\nContact the administrator."
        ),
        None => "<b>Hello!</b>\nUnable to retrieve your ID.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_start() {
        assert!(is_start(Some("/start")));
        assert!(is_start(Some("/start@jobwatch_bot")));
        assert!(is_start(Some("  /start deep-link")));
        assert!(!is_start(Some("/stop")));
        assert!(!is_start(Some("start")));
        assert!(!is_start(Some("/started")));
        assert!(!is_start(None));
    }

    #[test]
    fn test_start_reply() {
        assert!(start_reply(Some(777)).contains("Your ID: 777."));
        assert!(start_reply(None).contains("Unable to retrieve your ID"));
    }

    #[test]
    fn test_request_shape() {
        let request = GetUpdatesRequest {
            offset: 12,
            timeout: 30,
            allowed_updates: ["message"],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["offset"], 12);
        assert_eq!(value["allowed_updates"][0], "message");
    }
}
