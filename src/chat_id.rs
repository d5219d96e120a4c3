//! Channel identifier transforms.
//!
//! Telegram addresses a channel two ways: the raw platform id (`1234567890`)
//! and the Bot API id (`-1001234567890`). Channels are stored and compared in
//! Bot API form; the raw form is accepted wherever an operator types an id.

/// Offset between raw channel ids and Bot API channel ids.
pub const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Largest magnitude of any chat id; the platform guarantees at most 52 significant bits.
pub const MAX_CHAT_ID: i64 = (1 << 52) - 1;

/// Raw platform id → Bot API id. `None` when the result would not be a chat id.
pub fn to_bot_api(raw: i64) -> Option<i64> {
    CHANNEL_ID_OFFSET
        .checked_add(raw)?
        .checked_neg()
        .filter(|id| *id >= -MAX_CHAT_ID)
}

/// Bot API id → raw platform id, if `id` is in channel form.
pub fn to_raw(id: i64) -> Option<i64> {
    if id <= -CHANNEL_ID_OFFSET {
        id.checked_neg()?.checked_sub(CHANNEL_ID_OFFSET)
    } else {
        None
    }
}

/// Normalize any accepted spelling of a channel id to Bot API form.
///
/// Positive values are treated as raw channel ids. Negative values are already
/// chat ids (channel or group) and pass through unchanged. Ids outside the
/// platform range give `None`.
pub fn canonicalize(id: i64) -> Option<i64> {
    let id = if id > 0 { to_bot_api(id)? } else { id };
    (id != 0 && id >= -MAX_CHAT_ID).then_some(id)
}

/// Both keys a channel can be looked up by.
pub fn lookup_keys(bot_api_id: i64) -> impl Iterator<Item = i64> {
    std::iter::once(bot_api_id).chain(to_raw(bot_api_id))
}

/// Parse an operator-typed id such as `-1001234567890` or `1234567890`.
pub fn parse(input: &str) -> Option<i64> {
    input.trim().parse::<i64>().ok().and_then(canonicalize)
}
