//! Telegram Bot API client over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::posts::model::{MediaKind, MediaRef};
use crate::telegram::Messenger;
use crate::telegram::types::{InlineKeyboard, Message, Update};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Seconds the server holds a `getUpdates` request open.
pub const LONG_POLL_TIMEOUT_SECS: u64 = 30;

/// Longest flood-control wait honored before giving up on a call.
const MAX_FLOOD_WAIT: Duration = Duration::from_secs(30);

/// Bot API client.
pub struct TelegramBot {
    token: SecretString,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl TelegramBot {
    pub fn new(token: SecretString) -> Result<Self, ChannelError> {
        Self::with_base_url(token, DEFAULT_API_BASE)
    }

    pub fn with_base_url(token: SecretString, base_url: &str) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 15))
            .build()
            .map_err(|e| ChannelError::Http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.base_url,
            self.token.expose_secret()
        )
    }

    /// Call a Bot API method, waiting out short flood-control pauses once.
    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, ChannelError> {
        match self.call_once(method, body).await {
            Err(ChannelError::RateLimited {
                retry_after: Some(wait),
                ..
            }) if wait <= MAX_FLOOD_WAIT => {
                warn!(method, ?wait, "Telegram flood control, waiting");
                tokio::time::sleep(wait).await;
                self.call_once(method, body).await
            }
            other => other,
        }
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<T, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: {}", e.without_url())))?;

        let parsed: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: invalid response: {e}")))?;

        into_result(method, parsed)
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, ChannelError> {
        self.call_once(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": LONG_POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "channel_post", "callback_query"],
            }),
        )
        .await
    }

    /// Verify the token. Returns the bot's username.
    pub async fn get_me(&self) -> Result<String, ChannelError> {
        #[derive(Deserialize)]
        struct Me {
            #[serde(default)]
            username: Option<String>,
        }
        let me: Me = self.call("getMe", &json!({})).await?;
        Ok(me.username.unwrap_or_default())
    }
}

fn into_result<T>(method: &str, resp: ApiResponse<T>) -> Result<T, ChannelError> {
    if resp.ok {
        return resp.result.ok_or_else(|| {
            ChannelError::InvalidMessage(format!("{method}: ok response without result"))
        });
    }

    let code = resp.error_code.unwrap_or(0);
    if code == 429 {
        return Err(ChannelError::RateLimited {
            method: method.to_string(),
            retry_after: resp
                .parameters
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs),
        });
    }
    Err(ChannelError::Api {
        method: method.to_string(),
        code,
        description: resp.description.unwrap_or_default(),
    })
}

fn send_method(kind: MediaKind) -> (&'static str, &'static str) {
    match kind {
        MediaKind::Photo => ("sendPhoto", "photo"),
        MediaKind::Video => ("sendVideo", "video"),
        MediaKind::Document => ("sendDocument", "document"),
        MediaKind::Audio => ("sendAudio", "audio"),
        MediaKind::Voice => ("sendVoice", "voice"),
        MediaKind::Animation => ("sendAnimation", "animation"),
    }
}

/// `InputMedia` array for `sendMediaGroup`, caption on the first item only.
fn album_payload(media: &[MediaRef], caption: Option<&str>) -> Value {
    let items: Vec<Value> = media
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let mut item = json!({
                "type": m.kind.album_kind().as_str(),
                "media": m.file_id,
            });
            if let Some(caption) = caption.filter(|c| i == 0 && !c.is_empty()) {
                item["caption"] = json!(caption);
                item["parse_mode"] = json!("HTML");
            }
            item
        })
        .collect();
    Value::Array(items)
}

fn is_not_modified(err: &ChannelError) -> bool {
    matches!(err, ChannelError::Api { description, .. } if description.contains("message is not modified"))
}

// ── Messenger implementation ────────────────────────────────────────

#[async_trait]
impl Messenger for TelegramBot {
    async fn send_text(
        &self,
        chat_id: i64,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<i64, ChannelError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": html,
            "parse_mode": "HTML",
            "link_preview_options": { "is_disabled": true },
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = json!(kb);
        }
        let msg: Message = self.call("sendMessage", &body).await?;
        debug!(chat_id, message_id = msg.message_id, "Text sent");
        Ok(msg.message_id)
    }

    async fn send_media(
        &self,
        chat_id: i64,
        media: &MediaRef,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<i64, ChannelError> {
        let (method, field) = send_method(media.kind);
        let mut body = json!({ "chat_id": chat_id });
        body[field] = json!(media.file_id);
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            body["caption"] = json!(caption);
            body["parse_mode"] = json!("HTML");
        }
        if let Some(kb) = keyboard {
            body["reply_markup"] = json!(kb);
        }
        let msg: Message = self.call(method, &body).await?;
        debug!(chat_id, message_id = msg.message_id, kind = %media.kind, "Media sent");
        Ok(msg.message_id)
    }

    async fn send_album(
        &self,
        chat_id: i64,
        media: &[MediaRef],
        caption: Option<&str>,
    ) -> Result<Vec<i64>, ChannelError> {
        let body = json!({
            "chat_id": chat_id,
            "media": album_payload(media, caption),
        });
        let msgs: Vec<Message> = self.call("sendMediaGroup", &body).await?;
        debug!(chat_id, items = msgs.len(), "Album sent");
        Ok(msgs.into_iter().map(|m| m.message_id).collect())
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": html,
            "parse_mode": "HTML",
            "link_preview_options": { "is_disabled": true },
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = json!(kb);
        }
        match self.call::<Value>("editMessageText", &body).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError> {
        self.call::<bool>(
            "deleteMessage",
            &json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
        .map(|_| ())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "callback_query_id": callback_id, "show_alert": alert });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call::<bool>("answerCallbackQuery", &body)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot() -> TelegramBot {
        TelegramBot::new(SecretString::from("123:ABC")).unwrap()
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            bot().api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
        let custom =
            TelegramBot::with_base_url(SecretString::from("1:X"), "http://localhost:8081/").unwrap();
        assert_eq!(custom.api_url("sendPhoto"), "http://localhost:8081/bot1:X/sendPhoto");
    }

    #[test]
    fn ok_response_yields_result() {
        let resp: ApiResponse<Message> = serde_json::from_str(
            r#"{"ok":true,"result":{"message_id":9,"chat":{"id":1,"type":"private"}}}"#,
        )
        .unwrap();
        assert_eq!(into_result("sendMessage", resp).unwrap().message_id, 9);
    }

    #[test]
    fn flood_control_is_rate_limited() {
        let resp: ApiResponse<Value> = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 7","parameters":{"retry_after":7}}"#,
        )
        .unwrap();
        match into_result("sendMessage", resp) {
            Err(ChannelError::RateLimited { method, retry_after }) => {
                assert_eq!(method, "sendMessage");
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn api_error_keeps_description() {
        let resp: ApiResponse<Value> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: message is not modified"}"#,
        )
        .unwrap();
        let err = into_result("editMessageText", resp).unwrap_err();
        assert!(is_not_modified(&err));
        assert!(matches!(err, ChannelError::Api { code: 400, .. }));
    }

    #[test]
    fn album_caption_on_first_item_only() {
        let media = vec![
            MediaRef {
                kind: MediaKind::Photo,
                file_id: "a".into(),
            },
            MediaRef {
                kind: MediaKind::Voice,
                file_id: "b".into(),
            },
        ];
        let payload = album_payload(&media, Some("<b>Hi</b>"));
        assert_eq!(
            payload,
            json!([
                {"type": "photo", "media": "a", "caption": "<b>Hi</b>", "parse_mode": "HTML"},
                {"type": "document", "media": "b"}
            ])
        );
        assert_eq!(album_payload(&media, None)[0].get("caption"), None);
    }

    #[test]
    fn send_methods_by_kind() {
        assert_eq!(send_method(MediaKind::Photo), ("sendPhoto", "photo"));
        assert_eq!(send_method(MediaKind::Animation), ("sendAnimation", "animation"));
        assert_eq!(send_method(MediaKind::Voice), ("sendVoice", "voice"));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_http_error() {
        let bot = TelegramBot::with_base_url(SecretString::from("t"), "http://127.0.0.1:9").unwrap();
        let err = bot.send_text(1, "hi", None).await.unwrap_err();
        assert!(matches!(err, ChannelError::Http(_)));
        assert!(!err.to_string().contains("bott/"));
    }
}
