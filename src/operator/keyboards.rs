//! Inline keyboards shown to operators.

use crate::operator::callback::{AdminAction, AiAction, Callback, PostAction, SourceAction};
use crate::rewrite::RewriteMode;
use crate::settings::AVAILABLE_MODELS;
use crate::store::Channel;
use crate::telegram::{InlineButton, InlineKeyboard};

fn button(text: impl Into<String>, callback: Callback) -> InlineButton {
    InlineButton::callback(text, callback.encode())
}

fn post_button(text: &str, post_id: i64, action: PostAction) -> InlineButton {
    button(text, Callback::post(post_id, action))
}

// ── Posts ───────────────────────────────────────────────────────────

/// Attached to the new-post notice.
pub fn notice(post_id: i64) -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![
        post_button("👁 Open", post_id, PostAction::Open),
        post_button("🗑 Delete", post_id, PostAction::Delete),
    ]])
}

/// Controls under the original post preview.
pub fn post_actions(post_id: i64) -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![
            post_button("✍️ Rewrite", post_id, PostAction::Rewrite),
            post_button("📤 Publish", post_id, PostAction::Publish),
        ],
        vec![post_button("🗑 Delete", post_id, PostAction::Delete)],
    ])
}

pub fn rewrite_modes(post_id: i64) -> InlineKeyboard {
    let emoji = |mode: RewriteMode| match mode {
        RewriteMode::Standard => "📝",
        RewriteMode::Short => "✂️",
        RewriteMode::Creative => "🎨",
    };
    let mut rows: Vec<Vec<InlineButton>> = RewriteMode::ALL
        .iter()
        .map(|&mode| {
            vec![post_button(
                &format!("{} {}", emoji(mode), mode.label()),
                post_id,
                PostAction::RewriteWith(mode),
            )]
        })
        .collect();
    rows.push(vec![post_button("◀️ Back", post_id, PostAction::Back)]);
    InlineKeyboard::new(rows)
}

/// Controls under a rewritten preview.
pub fn preview_actions(post_id: i64) -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![
            post_button("📤 Publish", post_id, PostAction::Publish),
            post_button("❌ Cancel", post_id, PostAction::Cancel),
        ],
        vec![post_button("🔄 Rewrite again", post_id, PostAction::Rewrite)],
    ])
}

/// Open buttons for the `/posts` listing.
pub fn post_list(post_ids: &[i64]) -> InlineKeyboard {
    InlineKeyboard::new(
        post_ids
            .chunks(4)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|&id| post_button(&format!("#{id}"), id, PostAction::Open))
                    .collect()
            })
            .collect(),
    )
}

// ── Admin menu ──────────────────────────────────────────────────────

pub fn start() -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![button(
        "⚙️ Admin",
        Callback::Admin(AdminAction::Menu),
    )]])
}

pub fn admin_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![button("📡 Sources", Callback::Admin(AdminAction::Sources))],
        vec![button("🎯 Target channel", Callback::Admin(AdminAction::SetTarget))],
        vec![button("🔌 Connections", Callback::Admin(AdminAction::Links))],
        vec![button("⚙️ AI settings", Callback::Admin(AdminAction::Ai))],
    ])
}

// ── Sources ─────────────────────────────────────────────────────────

pub fn sources_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![button("📋 List", Callback::Source(SourceAction::List))],
        vec![button("➕ Add", Callback::Source(SourceAction::Add))],
        vec![button("◀️ Back", Callback::Source(SourceAction::Main))],
    ])
}

pub fn sources_list(sources: &[Channel]) -> InlineKeyboard {
    let mut rows: Vec<Vec<InlineButton>> = sources
        .iter()
        .map(|src| {
            let status = if src.is_active { "✅" } else { "⏸" };
            vec![button(
                format!("{status} {}", src.title),
                Callback::Source(SourceAction::View(src.id)),
            )]
        })
        .collect();
    rows.push(vec![button("◀️ Back", Callback::Source(SourceAction::Back))]);
    InlineKeyboard::new(rows)
}

pub fn source_actions(channel_id: i64, is_active: bool) -> InlineKeyboard {
    let toggle = if is_active { "⏸ Pause" } else { "▶️ Resume" };
    InlineKeyboard::new(vec![
        vec![button(toggle, Callback::Source(SourceAction::Toggle(channel_id)))],
        vec![button("🗑 Delete", Callback::Source(SourceAction::Delete(channel_id)))],
        vec![button("◀️ Back", Callback::Source(SourceAction::List))],
    ])
}

// ── AI settings ─────────────────────────────────────────────────────

pub fn ai_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![button("🤖 Change model", Callback::Ai(AiAction::Models))],
        vec![button("📊 Show settings", Callback::Ai(AiAction::Show))],
        vec![button("🔄 Reset to defaults", Callback::Ai(AiAction::Reset))],
        vec![button("◀️ Back to menu", Callback::Admin(AdminAction::Menu))],
    ])
}

pub fn models(current: &str) -> InlineKeyboard {
    let mut rows: Vec<Vec<InlineButton>> = AVAILABLE_MODELS
        .iter()
        .enumerate()
        .map(|(index, &model)| {
            let text = if model == current {
                format!("✅ {model}")
            } else {
                model.to_string()
            };
            vec![button(text, Callback::Ai(AiAction::Model(index)))]
        })
        .collect();
    rows.push(vec![button("◀️ Back", Callback::Ai(AiAction::Back))]);
    InlineKeyboard::new(rows)
}

pub fn confirm_reset() -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![
        button("✅ Yes, reset", Callback::Ai(AiAction::ConfirmReset)),
        button("❌ Cancel", Callback::Ai(AiAction::Back)),
    ]])
}

pub fn back_to_ai() -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![button(
        "◀️ AI settings",
        Callback::Ai(AiAction::Back),
    )]])
}
