//! Operator private-chat interface: commands, follow-up input and button presses.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chat_id;
use crate::error::{DatabaseError, RelayError};
use crate::format::escape_html;
use crate::operator::callback::{AdminAction, AiAction, Callback, PostAction, SourceAction};
use crate::operator::keyboards;
use crate::operator::session::{OperatorSessions, PendingInput};
use crate::posts::PostService;
use crate::registry::ChannelRegistry;
use crate::rewrite::RewriteMode;
use crate::settings::{self, AVAILABLE_MODELS, SettingsStore};
use crate::store::Channel;
use crate::telegram::{CallbackQuery, InlineKeyboard, Message, Messenger};

/// Posts listed by `/posts`.
const POST_LIST_LIMIT: usize = 20;

/// Characters of a prompt shown in settings screens.
const PROMPT_PREVIEW_CHARS: usize = 600;

const FORWARD_SOURCE_HINT: &str = "📨 Forward me any post from the channel to monitor.\n\
The bot must be an admin there. Send /cancel to stop.";

const FORWARD_TARGET_HINT: &str = "📨 Forward me any post from the channel to publish into.\n\
The bot must be an admin there. Send /cancel to stop.";

pub struct OperatorHandler {
    messenger: Arc<dyn Messenger>,
    posts: Arc<PostService>,
    registry: Arc<ChannelRegistry>,
    settings: SettingsStore,
    sessions: Arc<OperatorSessions>,
    admin_ids: HashSet<i64>,
}

impl OperatorHandler {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        posts: Arc<PostService>,
        registry: Arc<ChannelRegistry>,
        settings: SettingsStore,
        sessions: Arc<OperatorSessions>,
        admin_ids: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            messenger,
            posts,
            registry,
            settings,
            sessions,
            admin_ids: admin_ids.into_iter().collect(),
        }
    }

    pub fn is_operator(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    // ── Messages ────────────────────────────────────────────────────

    /// Handle a private message. Messages from groups and channels are ignored.
    pub async fn handle_message(&self, msg: &Message) {
        if msg.chat.kind != "private" {
            return;
        }
        let chat_id = msg.chat.id;
        let user_id = msg.from.as_ref().map(|u| u.id).unwrap_or(chat_id);

        if !self.is_operator(user_id) {
            info!(user_id, "Rejected message from non-operator");
            self.reply(
                chat_id,
                &format!("⛔ Access denied.\nYour id: <code>{user_id}</code>"),
                None,
            )
            .await;
            return;
        }

        let text = msg.text_or_caption().trim();
        let result = if text.starts_with('/') {
            self.handle_command(user_id, text).await
        } else if let Some(pending) = self.sessions.take_pending(user_id).await {
            self.handle_pending(user_id, pending, msg).await
        } else if msg.forwarded_channel().is_some() {
            self.reply(chat_id, "ℹ️ Use /add_source or /set_target first.", None)
                .await;
            Ok(())
        } else {
            self.reply(chat_id, "Use /admin to open the menu.", None).await;
            Ok(())
        };

        if let Err(e) = result {
            warn!(user_id, "Operator request failed: {e}");
            self.reply(chat_id, notice_for(&e), None).await;
        }
    }

    async fn handle_command(&self, admin_id: i64, text: &str) -> Result<(), RelayError> {
        let (command, arg) = split_command(text);
        if command != "add_source" && command != "set_target" {
            self.sessions.set_pending(admin_id, None).await;
        }
        debug!(admin_id, command, "Operator command");

        match command {
            "start" => {
                self.reply(
                    admin_id,
                    "👋 <b>Post relay</b>\n\nNew posts from source channels show up here. \
                     Open one to rewrite it and publish it to the target channel.",
                    Some(&keyboards::start()),
                )
                .await;
            }
            "admin" => {
                self.reply(admin_id, "⚙️ <b>Admin menu</b>", Some(&keyboards::admin_menu()))
                    .await;
            }
            "posts" => self.list_posts(admin_id).await?,
            "add_source" => match arg {
                Some(arg) => {
                    let Some(id) = chat_id::parse(arg) else {
                        self.reply(admin_id, "⚠️ Invalid chat id", None).await;
                        return Ok(());
                    };
                    self.sessions.set_pending(admin_id, None).await;
                    self.add_source(admin_id, id, None).await?;
                }
                None => {
                    self.sessions
                        .set_pending(admin_id, Some(PendingInput::SourceForward))
                        .await;
                    self.reply(admin_id, FORWARD_SOURCE_HINT, None).await;
                }
            },
            "set_target" => match arg {
                Some(arg) => {
                    let Some(id) = chat_id::parse(arg) else {
                        self.reply(admin_id, "⚠️ Invalid chat id", None).await;
                        return Ok(());
                    };
                    self.sessions.set_pending(admin_id, None).await;
                    self.set_target(admin_id, id, None).await?;
                }
                None => {
                    self.sessions
                        .set_pending(admin_id, Some(PendingInput::TargetForward))
                        .await;
                    self.reply(admin_id, FORWARD_TARGET_HINT, None).await;
                }
            },
            "model" => match arg {
                Some(name) => self.set_model(admin_id, name).await?,
                None => {
                    let current = self.settings.model().await?;
                    self.sessions
                        .set_pending(admin_id, Some(PendingInput::Model))
                        .await;
                    self.reply(
                        admin_id,
                        &format!(
                            "🤖 Current model: <code>{}</code>\n\nPick one below or send a model name.",
                            escape_html(&current)
                        ),
                        Some(&keyboards::models(&current)),
                    )
                    .await;
                }
            },
            "prompt" => match arg.and_then(|a| a.parse::<RewriteMode>().ok()) {
                Some(mode) => {
                    let current = self.settings.prompt(mode).await?;
                    self.sessions
                        .set_pending(admin_id, Some(PendingInput::Prompt(mode)))
                        .await;
                    self.reply(
                        admin_id,
                        &format!(
                            "📝 <b>{} prompt</b>\n\n<pre>{}</pre>\n\nSend the new prompt, or /cancel.",
                            mode.label(),
                            escape_html(&truncate(&current, PROMPT_PREVIEW_CHARS))
                        ),
                        None,
                    )
                    .await;
                }
                None => {
                    self.reply(admin_id, "Usage: /prompt std | short | creative", None)
                        .await;
                }
            },
            "cancel" => self.reply(admin_id, "❌ Cancelled", None).await,
            _ => self.reply(admin_id, "Unknown command. Try /admin", None).await,
        }
        Ok(())
    }

    async fn handle_pending(
        &self,
        admin_id: i64,
        pending: PendingInput,
        msg: &Message,
    ) -> Result<(), RelayError> {
        let text = msg.text_or_caption().trim();
        match pending {
            PendingInput::SourceForward | PendingInput::TargetForward => {
                let Some((id, title)) = msg.forwarded_channel() else {
                    self.sessions.set_pending(admin_id, Some(pending)).await;
                    self.reply(
                        admin_id,
                        "⚠️ That is not a post forwarded from a channel. Try again or /cancel.",
                        None,
                    )
                    .await;
                    return Ok(());
                };
                if pending == PendingInput::SourceForward {
                    self.add_source(admin_id, id, title).await
                } else {
                    self.set_target(admin_id, id, title).await
                }
            }
            PendingInput::Prompt(mode) => {
                if let Err(notice) = settings::validate_prompt(text) {
                    self.sessions.set_pending(admin_id, Some(pending)).await;
                    self.reply(admin_id, notice, None).await;
                    return Ok(());
                }
                self.settings.set_prompt(mode, text).await?;
                self.reply(
                    admin_id,
                    &format!("✅ {} prompt updated", mode.label()),
                    Some(&keyboards::back_to_ai()),
                )
                .await;
                Ok(())
            }
            PendingInput::Model => {
                if let Err(notice) = settings::validate_model(text) {
                    self.sessions.set_pending(admin_id, Some(pending)).await;
                    self.reply(admin_id, notice, None).await;
                    return Ok(());
                }
                self.set_model(admin_id, text).await
            }
        }
    }

    async fn add_source(
        &self,
        admin_id: i64,
        id: i64,
        title: Option<String>,
    ) -> Result<(), RelayError> {
        let title = title.unwrap_or_else(|| id.to_string());
        let (channel, created) = self.registry.add_source(id, &title).await?;
        let html = if created {
            format!("✅ Source added: {}", describe(&channel))
        } else {
            format!("ℹ️ Already a source: {}", describe(&channel))
        };
        self.reply(admin_id, &html, Some(&keyboards::sources_menu()))
            .await;
        Ok(())
    }

    async fn set_target(
        &self,
        admin_id: i64,
        id: i64,
        title: Option<String>,
    ) -> Result<(), RelayError> {
        let title = title.unwrap_or_else(|| id.to_string());
        let channel = self.registry.set_target(id, &title).await?;
        info!(chat_id = channel.chat_id, "Target channel set");
        self.reply(
            admin_id,
            &format!("🎯 Target set: {}", describe(&channel)),
            Some(&keyboards::admin_menu()),
        )
        .await;
        Ok(())
    }

    async fn set_model(&self, admin_id: i64, name: &str) -> Result<(), RelayError> {
        let name = name.trim();
        if let Err(notice) = settings::validate_model(name) {
            self.reply(admin_id, notice, None).await;
            return Ok(());
        }
        self.settings.set_model(name).await?;
        self.reply(
            admin_id,
            &format!("✅ Model set: <code>{}</code>", escape_html(name)),
            Some(&keyboards::back_to_ai()),
        )
        .await;
        Ok(())
    }

    async fn list_posts(&self, admin_id: i64) -> Result<(), RelayError> {
        let posts = self.posts.list(POST_LIST_LIMIT).await?;
        if posts.is_empty() {
            self.reply(admin_id, "📭 No captured posts", None).await;
            return Ok(());
        }

        let mut html = String::from("📬 <b>Captured posts</b>\n");
        for post in &posts {
            let snippet = post.original_text.replace('\n', " ");
            let snippet = truncate(snippet.trim(), 40);
            let mark = if post.is_rewritten() { " ✍️" } else { "" };
            html.push_str(&format!(
                "\n#{}{} · {}",
                post.id,
                mark,
                if snippet.is_empty() {
                    "<i>no text</i>".to_string()
                } else {
                    escape_html(&snippet)
                }
            ));
        }
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        self.reply(admin_id, &html, Some(&keyboards::post_list(&ids)))
            .await;
        Ok(())
    }

    // ── Callbacks ───────────────────────────────────────────────────

    /// Handle a button press. Every query is answered exactly once.
    pub async fn handle_callback(&self, query: &CallbackQuery) {
        let user_id = query.from.id;
        if !self.is_operator(user_id) {
            info!(user_id, "Rejected callback from non-operator");
            self.answer(query, Some("⛔ Access denied"), true).await;
            return;
        }

        let Some(callback) = query.data.as_deref().and_then(Callback::parse) else {
            debug!(data = ?query.data, "Unrecognized callback");
            self.answer(query, Some("Unknown action"), true).await;
            return;
        };

        // Slow actions get their answer up front; the outcome follows as a message.
        let early = early_answer(&callback);
        if early.is_some() {
            self.answer(query, early, false).await;
        }

        match self.dispatch(user_id, query, callback).await {
            Ok(text) if early.is_none() => self.answer(query, text.as_deref(), false).await,
            Ok(text) => {
                if let Some(text) = text {
                    self.reply(user_id, &text, None).await;
                }
            }
            Err(e) => {
                warn!(user_id, callback = %callback, "Callback failed: {e}");
                if early.is_none() {
                    self.answer(query, Some(notice_for(&e)), true).await;
                } else {
                    self.reply(user_id, notice_for(&e), None).await;
                }
            }
        }
    }

    async fn dispatch(
        &self,
        admin_id: i64,
        query: &CallbackQuery,
        callback: Callback,
    ) -> Result<Option<String>, RelayError> {
        let origin = query.message.as_ref();
        match callback {
            Callback::Post { post_id, action } => {
                self.post_action(admin_id, origin, post_id, action).await
            }
            Callback::Source(action) => self.source_action(admin_id, origin, action).await,
            Callback::Admin(action) => self.admin_action(admin_id, origin, action).await,
            Callback::Ai(action) => self.ai_action(admin_id, origin, action).await,
        }
    }

    async fn post_action(
        &self,
        admin_id: i64,
        origin: Option<&Message>,
        post_id: i64,
        action: PostAction,
    ) -> Result<Option<String>, RelayError> {
        match action {
            PostAction::Open => {
                self.posts.open(admin_id, post_id).await?;
                Ok(None)
            }
            PostAction::Rewrite => {
                if !self.posts.rewrite_enabled() {
                    return Err(RelayError::RewriteDisabled);
                }
                self.edit(
                    admin_id,
                    origin,
                    &format!("👆 <b>Post #{post_id}</b>\n\nChoose a rewrite mode:"),
                    Some(&keyboards::rewrite_modes(post_id)),
                )
                .await?;
                Ok(None)
            }
            PostAction::RewriteWith(mode) => {
                self.posts.request_rewrite(admin_id, post_id, mode)?;
                self.edit(
                    admin_id,
                    origin,
                    &format!("⏳ Rewriting post #{post_id} ({})…", mode.label()),
                    None,
                )
                .await?;
                Ok(Some("⏳ Rewriting…".into()))
            }
            PostAction::Back => {
                self.edit(
                    admin_id,
                    origin,
                    &format!("👆 <b>Original post #{post_id}</b>\n\nChoose an action:"),
                    Some(&keyboards::post_actions(post_id)),
                )
                .await?;
                Ok(None)
            }
            PostAction::Publish => {
                self.posts.publish(admin_id, post_id).await?;
                self.remove_origin(admin_id, origin).await;
                Ok(Some("✅ Published!".into()))
            }
            PostAction::Delete => {
                let result = self.posts.delete(admin_id, post_id).await;
                self.remove_origin(admin_id, origin).await;
                result?;
                Ok(Some("🗑 Deleted".into()))
            }
            PostAction::Cancel => {
                self.posts.cancel(admin_id, post_id).await?;
                Ok(None)
            }
        }
    }

    async fn source_action(
        &self,
        admin_id: i64,
        origin: Option<&Message>,
        action: SourceAction,
    ) -> Result<Option<String>, RelayError> {
        match action {
            SourceAction::List => {
                self.show_source_list(admin_id, origin).await?;
                Ok(None)
            }
            SourceAction::Add => {
                self.sessions
                    .set_pending(admin_id, Some(PendingInput::SourceForward))
                    .await;
                self.edit(admin_id, origin, FORWARD_SOURCE_HINT, None).await?;
                Ok(None)
            }
            SourceAction::View(id) => {
                let channel = self.registry.get(id).await?;
                self.show_source(admin_id, origin, &channel).await?;
                Ok(None)
            }
            SourceAction::Toggle(id) => {
                let channel = self.registry.toggle(id).await?;
                self.show_source(admin_id, origin, &channel).await?;
                let notice = if channel.is_active { "▶️ Resumed" } else { "⏸ Paused" };
                Ok(Some(notice.to_string()))
            }
            SourceAction::Delete(id) => {
                self.registry.remove(id).await?;
                self.show_source_list(admin_id, origin).await?;
                Ok(Some("🗑 Source removed".into()))
            }
            SourceAction::Back => {
                self.show_sources_menu(admin_id, origin).await?;
                Ok(None)
            }
            SourceAction::Main => {
                self.edit(
                    admin_id,
                    origin,
                    "⚙️ <b>Admin menu</b>",
                    Some(&keyboards::admin_menu()),
                )
                .await?;
                Ok(None)
            }
        }
    }

    async fn admin_action(
        &self,
        admin_id: i64,
        origin: Option<&Message>,
        action: AdminAction,
    ) -> Result<Option<String>, RelayError> {
        self.sessions.set_pending(admin_id, None).await;
        match action {
            AdminAction::Menu => {
                self.edit(
                    admin_id,
                    origin,
                    "⚙️ <b>Admin menu</b>",
                    Some(&keyboards::admin_menu()),
                )
                .await?;
            }
            AdminAction::Sources => self.show_sources_menu(admin_id, origin).await?,
            AdminAction::SetTarget => {
                self.sessions
                    .set_pending(admin_id, Some(PendingInput::TargetForward))
                    .await;
                self.edit(admin_id, origin, FORWARD_TARGET_HINT, None).await?;
            }
            AdminAction::Links => {
                let target = self.registry.active_target().await?;
                let active_sources = self
                    .registry
                    .sources()
                    .await?
                    .iter()
                    .filter(|s| s.is_active)
                    .count();
                let target = target
                    .as_ref()
                    .map(describe)
                    .unwrap_or_else(|| "not set".to_string());
                self.edit(
                    admin_id,
                    origin,
                    &format!(
                        "🔌 <b>Connections</b>\n\n🎯 Target: {target}\n📡 Active sources: {active_sources}"
                    ),
                    Some(&keyboards::admin_menu()),
                )
                .await?;
            }
            AdminAction::Ai => self.show_ai_menu(admin_id, origin).await?,
        }
        Ok(None)
    }

    async fn ai_action(
        &self,
        admin_id: i64,
        origin: Option<&Message>,
        action: AiAction,
    ) -> Result<Option<String>, RelayError> {
        match action {
            AiAction::Models => {
                let current = self.settings.model().await?;
                self.edit(
                    admin_id,
                    origin,
                    "🤖 <b>Choose a model</b>\n\nOr send /model &lt;name&gt; for any other.",
                    Some(&keyboards::models(&current)),
                )
                .await?;
                Ok(None)
            }
            AiAction::Model(index) => {
                let Some(&model) = AVAILABLE_MODELS.get(index) else {
                    return Ok(Some("Unknown model".into()));
                };
                self.settings.set_model(model).await?;
                self.edit(
                    admin_id,
                    origin,
                    "🤖 <b>Choose a model</b>\n\nOr send /model &lt;name&gt; for any other.",
                    Some(&keyboards::models(model)),
                )
                .await?;
                Ok(Some(format!("✅ Model: {model}")))
            }
            AiAction::Show => {
                let snapshot = self.settings.snapshot().await?;
                let mut html = format!(
                    "📊 <b>AI settings</b>\n\n🤖 Model: <code>{}</code>",
                    escape_html(&snapshot.model)
                );
                for (mode, prompt) in &snapshot.prompts {
                    html.push_str(&format!(
                        "\n\n<b>{}</b> (/prompt {})\n<pre>{}</pre>",
                        mode.label(),
                        mode.token(),
                        escape_html(&truncate(prompt, PROMPT_PREVIEW_CHARS))
                    ));
                }
                self.edit(admin_id, origin, &html, Some(&keyboards::back_to_ai()))
                    .await?;
                Ok(None)
            }
            AiAction::Reset => {
                self.edit(
                    admin_id,
                    origin,
                    "🔄 Reset the model and all prompts to their defaults?",
                    Some(&keyboards::confirm_reset()),
                )
                .await?;
                Ok(None)
            }
            AiAction::ConfirmReset => {
                self.settings.reset().await?;
                self.show_ai_menu(admin_id, origin).await?;
                Ok(Some("✅ Settings reset".into()))
            }
            AiAction::Back => {
                self.sessions.set_pending(admin_id, None).await;
                self.show_ai_menu(admin_id, origin).await?;
                Ok(None)
            }
        }
    }

    // ── Screens ─────────────────────────────────────────────────────

    async fn show_sources_menu(
        &self,
        admin_id: i64,
        origin: Option<&Message>,
    ) -> Result<(), RelayError> {
        self.edit(
            admin_id,
            origin,
            "📡 <b>Sources</b>\n\nChannels the bot watches for new posts.",
            Some(&keyboards::sources_menu()),
        )
        .await
    }

    async fn show_source_list(
        &self,
        admin_id: i64,
        origin: Option<&Message>,
    ) -> Result<(), RelayError> {
        let sources = self.registry.sources().await?;
        if sources.is_empty() {
            return self
                .edit(
                    admin_id,
                    origin,
                    "📭 No sources yet",
                    Some(&keyboards::sources_menu()),
                )
                .await;
        }
        self.edit(
            admin_id,
            origin,
            "📋 <b>Sources</b>",
            Some(&keyboards::sources_list(&sources)),
        )
        .await
    }

    async fn show_source(
        &self,
        admin_id: i64,
        origin: Option<&Message>,
        channel: &Channel,
    ) -> Result<(), RelayError> {
        let status = if channel.is_active { "✅ active" } else { "⏸ paused" };
        self.edit(
            admin_id,
            origin,
            &format!(
                "📡 <b>{}</b>\n\nID: <code>{}</code>\nStatus: {status}",
                escape_html(&channel.title),
                channel.chat_id
            ),
            Some(&keyboards::source_actions(channel.id, channel.is_active)),
        )
        .await
    }

    async fn show_ai_menu(&self, admin_id: i64, origin: Option<&Message>) -> Result<(), RelayError> {
        let model = self.settings.model().await?;
        let rewriting = if self.posts.rewrite_enabled() {
            "enabled"
        } else {
            "disabled (ANTHROPIC_API_KEY is not set)"
        };
        self.edit(
            admin_id,
            origin,
            &format!(
                "⚙️ <b>AI settings</b>\n\n🤖 Model: <code>{}</code>\n✍️ Rewriting: {rewriting}\n\n\
                 Edit prompts with /prompt std | short | creative",
                escape_html(&model)
            ),
            Some(&keyboards::ai_menu()),
        )
        .await
    }

    // ── Transport helpers ───────────────────────────────────────────

    async fn reply(&self, chat_id: i64, html: &str, keyboard: Option<&InlineKeyboard>) {
        if let Err(e) = self.messenger.send_text(chat_id, html, keyboard).await {
            warn!(chat_id, "Failed to reply to operator: {e}");
        }
    }

    /// Replace the message the button was on, or send a new one when it is gone.
    async fn edit(
        &self,
        admin_id: i64,
        origin: Option<&Message>,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), RelayError> {
        match origin {
            Some(msg) => {
                self.messenger
                    .edit_text(msg.chat.id, msg.message_id, html, keyboard)
                    .await?
            }
            None => {
                self.messenger.send_text(admin_id, html, keyboard).await?;
            }
        }
        Ok(())
    }

    async fn remove_origin(&self, admin_id: i64, origin: Option<&Message>) {
        if let Some(msg) = origin
            && let Err(e) = self.messenger.delete_message(msg.chat.id, msg.message_id).await
        {
            debug!(admin_id, "Could not delete button message: {e}");
        }
    }

    async fn answer(&self, query: &CallbackQuery, text: Option<&str>, alert: bool) {
        if let Err(e) = self.messenger.answer_callback(&query.id, text, alert).await {
            warn!(callback_id = %query.id, "Failed to answer callback: {e}");
        }
    }
}

/// Answer sent before running an action that waits on external sends.
fn early_answer(callback: &Callback) -> Option<&'static str> {
    match callback {
        Callback::Post {
            action: PostAction::Publish,
            ..
        } => Some("⏳ Publishing…"),
        _ => None,
    }
}

/// Operator-facing notice, with a more specific wording for channel role clashes.
fn notice_for(err: &RelayError) -> &'static str {
    match err {
        RelayError::PersistenceFailure(DatabaseError::Constraint(_)) => {
            "⚠️ That channel already has the other role (source vs target)"
        }
        other => other.user_message(),
    }
}

/// Split `/cmd@bot args` into `("cmd", Some("args"))`.
fn split_command(text: &str) -> (&str, Option<&str>) {
    let text = text.trim_start_matches('/');
    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, Some(rest.trim()).filter(|r| !r.is_empty())),
        None => (text, None),
    };
    let command = head.split('@').next().unwrap_or(head);
    (command, rest)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

fn describe(channel: &Channel) -> String {
    format!(
        "{} (<code>{}</code>)",
        escape_html(&channel.title),
        channel.chat_id
    )
}
