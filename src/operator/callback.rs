//! Inline button callback tokens.
//!
//! Tokens are colon-separated and must stay within Telegram's 64-byte
//! `callback_data` limit:
//!
//! ```text
//! p:<post_id>:open | rewrite | rw:<std|short|creative> | back | publish | delete | cancel
//! src:list | add | view:<id> | toggle:<id> | delete:<id> | back | main
//! adm:menu | sources | set_target | links | ai
//! ai:models | model:<index> | show | reset | confirm_reset | back
//! ```

use std::fmt;
use std::str::FromStr;

use crate::rewrite::RewriteMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Open,
    /// Show the mode picker.
    Rewrite,
    RewriteWith(RewriteMode),
    /// Back from the mode picker to the post controls.
    Back,
    Publish,
    Delete,
    /// Drop the rewrite and show the original again.
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceAction {
    List,
    Add,
    View(i64),
    Toggle(i64),
    Delete(i64),
    Back,
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Menu,
    Sources,
    SetTarget,
    Links,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiAction {
    Models,
    /// Index into `settings::AVAILABLE_MODELS`.
    Model(usize),
    Show,
    Reset,
    ConfirmReset,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Post { post_id: i64, action: PostAction },
    Source(SourceAction),
    Admin(AdminAction),
    Ai(AiAction),
}

impl Callback {
    pub fn post(post_id: i64, action: PostAction) -> Self {
        Self::Post { post_id, action }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let parts: Vec<&str> = data.split(':').collect();
        let callback = match parts.as_slice() {
            ["p", id, rest @ ..] => {
                let post_id = id.parse().ok()?;
                let action = match rest {
                    ["open"] => PostAction::Open,
                    ["rewrite"] => PostAction::Rewrite,
                    ["rw", mode] => PostAction::RewriteWith(mode.parse().ok()?),
                    ["back"] => PostAction::Back,
                    ["publish"] => PostAction::Publish,
                    ["delete"] => PostAction::Delete,
                    ["cancel"] => PostAction::Cancel,
                    _ => return None,
                };
                Self::Post { post_id, action }
            }
            ["src", rest @ ..] => Self::Source(match rest {
                ["list"] => SourceAction::List,
                ["add"] => SourceAction::Add,
                ["view", id] => SourceAction::View(id.parse().ok()?),
                ["toggle", id] => SourceAction::Toggle(id.parse().ok()?),
                ["delete", id] => SourceAction::Delete(id.parse().ok()?),
                ["back"] => SourceAction::Back,
                ["main"] => SourceAction::Main,
                _ => return None,
            }),
            ["adm", action] => Self::Admin(match *action {
                "menu" => AdminAction::Menu,
                "sources" => AdminAction::Sources,
                "set_target" => AdminAction::SetTarget,
                "links" => AdminAction::Links,
                "ai" => AdminAction::Ai,
                _ => return None,
            }),
            ["ai", rest @ ..] => Self::Ai(match rest {
                ["models"] => AiAction::Models,
                ["model", index] => AiAction::Model(index.parse().ok()?),
                ["show"] => AiAction::Show,
                ["reset"] => AiAction::Reset,
                ["confirm_reset"] => AiAction::ConfirmReset,
                ["back"] => AiAction::Back,
                _ => return None,
            }),
            _ => return None,
        };
        Some(callback)
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post { post_id, action } => {
                write!(f, "p:{post_id}:")?;
                match action {
                    PostAction::Open => f.write_str("open"),
                    PostAction::Rewrite => f.write_str("rewrite"),
                    PostAction::RewriteWith(mode) => write!(f, "rw:{}", mode.token()),
                    PostAction::Back => f.write_str("back"),
                    PostAction::Publish => f.write_str("publish"),
                    PostAction::Delete => f.write_str("delete"),
                    PostAction::Cancel => f.write_str("cancel"),
                }
            }
            Self::Source(action) => match action {
                SourceAction::List => f.write_str("src:list"),
                SourceAction::Add => f.write_str("src:add"),
                SourceAction::View(id) => write!(f, "src:view:{id}"),
                SourceAction::Toggle(id) => write!(f, "src:toggle:{id}"),
                SourceAction::Delete(id) => write!(f, "src:delete:{id}"),
                SourceAction::Back => f.write_str("src:back"),
                SourceAction::Main => f.write_str("src:main"),
            },
            Self::Admin(action) => f.write_str(match action {
                AdminAction::Menu => "adm:menu",
                AdminAction::Sources => "adm:sources",
                AdminAction::SetTarget => "adm:set_target",
                AdminAction::Links => "adm:links",
                AdminAction::Ai => "adm:ai",
            }),
            Self::Ai(action) => match action {
                AiAction::Models => f.write_str("ai:models"),
                AiAction::Model(index) => write!(f, "ai:model:{index}"),
                AiAction::Show => f.write_str("ai:show"),
                AiAction::Reset => f.write_str("ai:reset"),
                AiAction::ConfirmReset => f.write_str("ai:confirm_reset"),
                AiAction::Back => f.write_str("ai:back"),
            },
        }
    }
}

impl FromStr for Callback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unrecognized callback: {s}"))
    }
}
