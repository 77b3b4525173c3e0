//! Telegram Bot API notifier
//!
//! Sends messages through `sendMessage` with HTML parse mode and an inline
//! keyboard holding one URL button per [`Action`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Action, Notifier, NotifyError, NotifyResult, Recipient};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    pub token: String,
    /// API root, overridable for self-hosted Bot API servers
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout() -> u64 {
    10
}

impl TelegramConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: default_api_base(),
            timeout_secs: default_timeout(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.token.trim().is_empty() {
            return Err("Bot token cannot be empty".to_string());
        }

        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err("API base must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: Vec<Vec<InlineKeyboardButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton<'a> {
    text: &'a str,
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> NotifyResult<Self> {
        config.validate().map_err(NotifyError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::InvalidConfig(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.token
        )
    }

    fn build_request<'a>(
        recipient: &'a Recipient,
        text: &'a str,
        actions: &'a [Action],
    ) -> SendMessageRequest<'a> {
        let reply_markup = (!actions.is_empty()).then(|| InlineKeyboardMarkup {
            inline_keyboard: actions
                .iter()
                .map(|action| {
                    vec![InlineKeyboardButton {
                        text: &action.label,
                        url: &action.url,
                    }]
                })
                .collect(),
        });

        SendMessageRequest {
            chat_id: recipient.as_str(),
            text,
            parse_mode: "HTML",
            reply_markup,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, recipient: &Recipient, text: &str, actions: &[Action]) -> NotifyResult<()> {
        let request = Self::build_request(recipient, text, actions);

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body: Option<ApiResponse> = response.json().await.ok();

        match body {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => {
                tracing::debug!(recipient = %recipient, "Telegram message delivered");
                Ok(())
            }
            other => Err(NotifyError::Rejected {
                status: status.as_u16(),
                description: other
                    .and_then(|b| b.description)
                    .unwrap_or_else(|| status.to_string()),
            }),
        }
    }
}

pub(super) fn classify(err: reqwest::Error) -> NotifyError {
    if err.is_timeout() {
        NotifyError::Timeout
    } else {
        NotifyError::Http(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telegram_config_validation() {
        assert!(TelegramConfig::new("123:ABC").validate().is_ok());
        assert!(TelegramConfig::new("  ").validate().is_err());
        assert!(TelegramConfig::new("123:ABC")
            .with_api_base("api.telegram.org")
            .validate()
            .is_err());
        assert!(TelegramConfig::new("123:ABC")
            .with_timeout(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_endpoint() {
        let notifier = TelegramNotifier::new(
            TelegramConfig::new("123:ABC").with_api_base("http://localhost:8081/"),
        )
        .unwrap();
        assert_eq!(
            notifier.endpoint(),
            "http://localhost:8081/bot123:ABC/sendMessage"
        );
    }

    #[test]
    fn test_request_payload_shape() {
        let recipient = Recipient::new("42");
        let actions = vec![Action::link("📌 Details", "https://hh.ru/vacancy/1")];
        let request = TelegramNotifier::build_request(&recipient, "<b>hi</b>", &actions);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["chat_id"], "42");
        assert_eq!(value["parse_mode"], "HTML");
        assert_eq!(
            value["reply_markup"]["inline_keyboard"][0][0]["url"],
            "https://hh.ru/vacancy/1"
        );

        let bare = TelegramNotifier::build_request(&recipient, "hi", &[]);
        let value = serde_json::to_value(&bare).unwrap();
        assert!(value.get("reply_markup").is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = TelegramNotifier::new(TelegramConfig::new(""));
        assert!(matches!(result, Err(NotifyError::InvalidConfig(_))));
    }
}
