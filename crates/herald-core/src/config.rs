//! Per-exchange configuration.
//!
//! Configuration files may spell flags loosely (`true`, `"yes"`, `1`,
//! `"0"`...). Raw entries are normalized exactly once, when they are turned
//! into [`ExchangeSettings`]; nothing downstream sees a loose value.

use herald_protocol::ExchangeKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A loosely-typed boolean as found in configuration files.
///
/// Any value deserializes: shapes that are not scalars (arrays, tables,
/// datetimes) land in `Other` and normalize to `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseBool {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Other(Value),
}

impl LooseBool {
    /// Normalize to a plain boolean.
    ///
    /// Only recognized truthy spellings are `true`; anything else, including
    /// values that do not parse, is `false`.
    #[must_use]
    pub fn normalize(&self) -> bool {
        match self {
            LooseBool::Bool(value) => *value,
            LooseBool::Int(value) => *value == 1,
            LooseBool::Float(value) => *value == 1.0,
            LooseBool::Text(text) => parse_bool(text),
            LooseBool::Other(_) => false,
        }
    }
}

impl From<bool> for LooseBool {
    fn from(value: bool) -> Self {
        LooseBool::Bool(value)
    }
}

impl From<&str> for LooseBool {
    fn from(value: &str) -> Self {
        LooseBool::Text(value.to_string())
    }
}

impl From<i64> for LooseBool {
    fn from(value: i64) -> Self {
        LooseBool::Int(value)
    }
}

/// Permissive boolean parse. Total: unknown input is `false`.
#[must_use]
pub fn parse_bool(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Exchange configuration exactly as written in a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawExchangeConfig {
    /// Durable exchange. Also drives the passive flag.
    pub durable: Option<LooseBool>,
    /// Remove the exchange once unbound.
    pub auto_delete: Option<LooseBool>,
    /// Internal exchange.
    pub internal: Option<LooseBool>,
    /// Exchange type override.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Normalized settings for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSettings {
    /// Durable exchange.
    pub durable: bool,
    /// Remove the exchange once unbound.
    pub auto_delete: bool,
    /// Internal exchange.
    pub internal: bool,
    /// Exchange type override; `None` uses the resolver default.
    pub kind: Option<ExchangeKind>,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            durable: false,
            auto_delete: true,
            internal: false,
            kind: None,
        }
    }
}

impl From<&RawExchangeConfig> for ExchangeSettings {
    fn from(raw: &RawExchangeConfig) -> Self {
        let defaults = Self::default();
        let flag = |value: &Option<LooseBool>, default: bool| {
            value.as_ref().map_or(default, LooseBool::normalize)
        };

        Self {
            durable: flag(&raw.durable, defaults.durable),
            auto_delete: flag(&raw.auto_delete, defaults.auto_delete),
            internal: flag(&raw.internal, defaults.internal),
            kind: raw.kind.as_deref().map(ExchangeKind::from),
        }
    }
}

impl From<RawExchangeConfig> for ExchangeSettings {
    fn from(raw: RawExchangeConfig) -> Self {
        Self::from(&raw)
    }
}
