//! Telegram HTML formatting: markdown conversion and tag-safe splitting.
//!
//! Captured posts and rewrite output arrive as lightweight markdown
//! (`**bold**`, `_italic_`, `[label](url)`). Everything sent to Telegram uses
//! `parse_mode=HTML`, so text is converted once at render time and then cut
//! into pieces that respect the platform limits without leaving a tag or an
//! element half-open.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Maximum length of a Telegram text message.
pub const TEXT_LIMIT: usize = 4096;

/// Maximum length of a media caption.
pub const CAPTION_LIMIT: usize = 1024;

/// Elements that must be closed inside the chunk that opens them.
const PAIRED_TAGS: &[&str] = &[
    "a",
    "b",
    "strong",
    "i",
    "em",
    "u",
    "ins",
    "s",
    "strike",
    "del",
    "code",
    "pre",
    "span",
    "tg-spoiler",
    "blockquote",
];

static EXISTING_HTML_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(b|i|u|s|a|code|pre|strong|em)\b").unwrap());
static LINK_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\((https?://[^)]+)\)").unwrap());
static LINK_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\s*(https?://\S+)").unwrap());
static BOLD_STAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static BOLD_UNDERSCORE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.+?)__").unwrap());
static STRIKE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.+?)~~").unwrap());
static CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`(.+?)`").unwrap());
static ITALIC_UNDERSCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b_([^_\n]+?)_\b").unwrap());
static ITALIC_STAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+?)\*").unwrap());
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9-]*)[^>]*>").unwrap());

/// Escape text for Telegram HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Convert lightweight markdown into Telegram HTML.
///
/// Text that already contains Telegram HTML tags (typical for rewrite output)
/// is returned trimmed but otherwise untouched.
pub fn md_to_html(text: &str) -> String {
    let raw = text.trim();
    if raw.is_empty() {
        return String::new();
    }
    if EXISTING_HTML_RE.is_match(raw) {
        return raw.to_string();
    }

    // Pull links out first so their URLs survive escaping and emphasis rules.
    let mut links: Vec<(String, String)> = Vec::new();
    let raw = LINK_PAREN_RE.replace_all(raw, |caps: &Captures| {
        let token = link_token(links.len());
        links.push((caps[1].to_string(), caps[2].to_string()));
        token
    });
    let raw = LINK_BARE_RE.replace_all(&raw, |caps: &Captures| {
        let token = link_token(links.len());
        links.push((caps[1].to_string(), caps[2].to_string()));
        token
    });

    let escaped = escape_html(&raw);
    let mut html = apply_emphasis(&escaped);

    for (i, (label, url)) in links.iter().enumerate() {
        let label_html = apply_emphasis(&escape_html(label));
        let anchor = format!("<a href=\"{}\">{}</a>", escape_html(url), label_html);
        html = html.replace(&link_token(i), &anchor);
    }

    html.trim().to_string()
}

fn link_token(index: usize) -> String {
    format!("§§LINK{index}§§")
}

fn apply_emphasis(text: &str) -> String {
    let text = BOLD_STAR_RE.replace_all(text, "<b>$1</b>");
    let text = BOLD_UNDERSCORE_RE.replace_all(&text, "<b>$1</b>");
    let text = STRIKE_RE.replace_all(&text, "<s>$1</s>");
    let text = CODE_RE.replace_all(&text, "<code>$1</code>");
    let text = ITALIC_UNDERSCORE_RE.replace_all(&text, "<i>$1</i>");
    let text = ITALIC_STAR_RE.replace_all(&text, "<i>$1</i>");
    text.into_owned()
}

/// Split HTML into messages of at most `limit` characters without breaking
/// tags or leaving elements open.
pub fn split_html_safe(html: &str, limit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = html.trim().to_string();

    while !rest.is_empty() {
        if char_len(&rest) <= limit {
            parts.push(rest);
            break;
        }

        let (head, tail) = split_head(&rest, limit);
        if head.is_empty() || char_len(&tail) >= char_len(&rest) {
            // Limit too small for the markup; fall back to a plain cut.
            let hard = byte_offset(&rest, limit.max(1));
            parts.push(rest[..hard].to_string());
            rest = rest[hard..].trim_start().to_string();
            continue;
        }
        parts.push(head);
        rest = tail;
    }

    parts
}

/// Split HTML into a caption of at most `caption_limit` characters and the
/// remaining tail, which is sent as follow-up text messages.
pub fn split_caption_and_tail(html: &str, caption_limit: usize) -> (String, String) {
    if char_len(html) <= caption_limit {
        return (html.to_string(), String::new());
    }
    split_head(html, caption_limit)
}

struct OpenTag {
    name: String,
    start: usize,
    markup: String,
}

/// Cut `html` into a head of at most `limit` characters and the remainder.
fn split_head(html: &str, limit: usize) -> (String, String) {
    let cut = boundary_cut(html, limit);
    let open = open_elements(&html[..cut]);

    match open.first() {
        None => (
            html[..cut].trim_end().to_string(),
            html[cut..].trim_start().to_string(),
        ),
        Some(outer) if outer.start > 0 => (
            html[..outer.start].trim_end().to_string(),
            html[outer.start..].trim_start().to_string(),
        ),
        Some(_) => {
            // The element opens at the very start and runs past the limit:
            // close it in this chunk and reopen it in the next one.
            let reserve: usize = open.iter().map(|t| t.name.len() + 3).sum();
            let cut = if reserve < limit {
                boundary_cut(html, limit - reserve)
            } else {
                cut
            };
            let open = open_elements(&html[..cut]);
            let closing: String = open.iter().rev().map(|t| format!("</{}>", t.name)).collect();
            let reopening: String = open.iter().map(|t| t.markup.as_str()).collect();
            (
                format!("{}{}", html[..cut].trim_end(), closing),
                format!("{}{}", reopening, html[cut..].trim_start()),
            )
        }
    }
}

/// Byte index of a cut point at most `limit` characters in, preferring a
/// newline, then a space, and never landing inside a tag.
fn boundary_cut(html: &str, limit: usize) -> usize {
    let hard = byte_offset(html, limit);
    if hard >= html.len() {
        return html.len();
    }

    let min_cut = (limit * 3 / 10).max(50).min(limit);
    let far_enough = |pos: usize| pos > 0 && char_len(&html[..pos]) >= min_cut;
    let head = &html[..hard];

    let mut cut = match head.rfind('\n') {
        Some(pos) if far_enough(pos) => pos,
        _ => match head.rfind(' ') {
            Some(pos) if far_enough(pos) => pos,
            _ => hard,
        },
    };

    if let Some(open) = html[..cut].rfind('<') {
        if !html[open..cut].contains('>') && open > 0 {
            cut = open;
        }
    }

    if cut == 0 { hard } else { cut }
}

/// Paired elements still open at the end of `html`, outermost first.
fn open_elements(html: &str) -> Vec<OpenTag> {
    let mut stack: Vec<OpenTag> = Vec::new();
    for caps in TAG_RE.captures_iter(html) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let name = caps[2].to_ascii_lowercase();
        if !PAIRED_TAGS.contains(&name.as_str()) {
            continue;
        }
        if &caps[1] == "/" {
            if let Some(pos) = stack.iter().rposition(|t| t.name == name) {
                stack.truncate(pos);
            }
        } else {
            stack.push(OpenTag {
                name,
                start: whole.start(),
                markup: whole.as_str().to_string(),
            });
        }
    }
    stack
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `chars`-th character, or the string length.
fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}
