//! Server description ("message of the day") parsing.
//!
//! A status response carries its description either as a bare string or as a
//! chat-component object whose `extra` array holds styled spans. Both forms
//! are turned into a [`Motd`], which keeps the spans and their style flags but
//! leaves rendering (HTML, ANSI, rich text) to the caller.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text used when a response has no usable description.
pub const NO_MOTD: &str = "No MOTD";

/// The sixteen named chat colors and their hex values.
const NAMED_COLORS: &[(&str, &str)] = &[
    ("black", "#000000"),
    ("dark_blue", "#0000AA"),
    ("dark_green", "#00AA00"),
    ("dark_aqua", "#00AAAA"),
    ("dark_red", "#AA0000"),
    ("dark_purple", "#AA00AA"),
    ("gold", "#FFAA00"),
    ("gray", "#AAAAAA"),
    ("dark_gray", "#555555"),
    ("blue", "#5555FF"),
    ("green", "#55FF55"),
    ("aqua", "#55FFFF"),
    ("red", "#FF5555"),
    ("light_purple", "#FF55FF"),
    ("yellow", "#FFFF55"),
    ("white", "#FFFFFF"),
];

/// Resolve a named chat color to its hex form. Anything else (already hex,
/// or unknown) is returned unchanged.
pub fn resolve_color(color: &str) -> String {
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == color)
        .map(|(_, hex)| (*hex).to_string())
        .unwrap_or_else(|| color.to_string())
}

/// Style flags attached to one span of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    /// Hex color (`#RRGGBB`) or a pass-through value the server sent.
    pub color: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub underlined: bool,
    pub strikethrough: bool,
    pub obfuscated: bool,
}

impl TextStyle {
    /// `true` when no style is applied at all.
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }
}

/// A run of text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledSpan {
    pub text: String,
    pub style: TextStyle,
}

/// A parsed server description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Motd {
    PlainText(String),
    Styled(Vec<StyledSpan>),
}

impl Motd {
    /// Build a [`Motd`] from the `description` field of a status response.
    pub fn from_description(description: &Value) -> Self {
        match description {
            Value::String(s) => Motd::PlainText(s.clone()),
            Value::Object(map) => match map.get("extra").and_then(Value::as_array) {
                Some(extra) => {
                    let mut spans = Vec::with_capacity(extra.len() + 1);
                    if let Some(text) = map.get("text").and_then(Value::as_str) {
                        if !text.is_empty() {
                            spans.push(parse_span(text, description));
                        }
                    }
                    for part in extra {
                        match part {
                            Value::String(s) => spans.push(StyledSpan {
                                text: s.clone(),
                                style: TextStyle::default(),
                            }),
                            Value::Object(obj) => {
                                if let Some(text) = obj.get("text").and_then(Value::as_str) {
                                    spans.push(parse_span(text, part));
                                }
                            }
                            _ => {}
                        }
                    }
                    Motd::Styled(spans)
                }
                None => match map.get("text").and_then(Value::as_str) {
                    Some(text) => Motd::PlainText(text.to_string()),
                    None => Motd::PlainText(NO_MOTD.to_string()),
                },
            },
            _ => Motd::PlainText(NO_MOTD.to_string()),
        }
    }

    /// Concatenated text with legacy `§` formatting codes removed.
    pub fn plain_text(&self) -> String {
        let raw = match self {
            Motd::PlainText(s) => s.clone(),
            Motd::Styled(spans) => spans.iter().map(|s| s.text.as_str()).collect(),
        };
        strip_formatting_codes(&raw)
    }

    /// Ordered spans; a plain description yields a single unstyled span.
    pub fn spans(&self) -> Vec<StyledSpan> {
        match self {
            Motd::PlainText(s) => vec![StyledSpan {
                text: s.clone(),
                style: TextStyle::default(),
            }],
            Motd::Styled(spans) => spans.clone(),
        }
    }
}

impl Default for Motd {
    fn default() -> Self {
        Motd::PlainText(NO_MOTD.to_string())
    }
}

fn parse_span(text: &str, component: &Value) -> StyledSpan {
    let flag = |key: &str| component.get(key).and_then(Value::as_bool).unwrap_or(false);
    StyledSpan {
        text: text.to_string(),
        style: TextStyle {
            color: component
                .get("color")
                .and_then(Value::as_str)
                .map(resolve_color),
            bold: flag("bold"),
            italic: flag("italic"),
            underlined: flag("underlined"),
            strikethrough: flag("strikethrough"),
            obfuscated: flag("obfuscated"),
        },
    }
}

fn formatting_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"§[0-9a-fk-or]").expect("static regex"))
}

/// Remove legacy `§x` color/format codes.
pub fn strip_formatting_codes(s: &str) -> String {
    formatting_code_re().replace_all(s, "").into_owned()
}

/// Flatten a MOTD so it fits on a single log line.
pub fn single_line(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
