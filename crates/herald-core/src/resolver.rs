//! Exchange configuration resolver.
//!
//! Maps a channel name to the topology its exchange is declared with. Every
//! channel resolves: channels without configuration get the defaults.

use crate::config::{ExchangeSettings, RawExchangeConfig};
use herald_protocol::{ExchangeKind, ExchangeTopology};
use std::collections::HashMap;
use tracing::info;

/// Resolves exchange topology per channel.
#[derive(Debug, Clone, Default)]
pub struct ExchangeResolver {
    /// Explicit settings indexed by channel name.
    exchanges: HashMap<String, ExchangeSettings>,
    /// Type used when a channel does not override it.
    default_kind: ExchangeKind,
}

impl ExchangeResolver {
    /// Create a resolver with no explicit exchanges.
    #[must_use]
    pub fn new(default_kind: ExchangeKind) -> Self {
        Self {
            exchanges: HashMap::new(),
            default_kind,
        }
    }

    /// Create a resolver from raw configuration entries, normalizing them.
    #[must_use]
    pub fn from_config<I>(default_kind: ExchangeKind, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, RawExchangeConfig)>,
    {
        let exchanges: HashMap<_, _> = entries
            .into_iter()
            .map(|(name, raw)| (name, ExchangeSettings::from(raw)))
            .collect();

        info!(
            default_kind = %default_kind,
            configured = exchanges.len(),
            "Loaded exchange configuration"
        );

        Self {
            exchanges,
            default_kind,
        }
    }

    /// Add settings for a channel.
    #[must_use]
    pub fn with_exchange(mut self, channel: impl Into<String>, settings: ExchangeSettings) -> Self {
        self.exchanges.insert(channel.into(), settings);
        self
    }

    /// Get the default exchange type.
    #[must_use]
    pub fn default_kind(&self) -> &ExchangeKind {
        &self.default_kind
    }

    /// Get the explicit settings for a channel, if any.
    #[must_use]
    pub fn settings(&self, channel: &str) -> Option<&ExchangeSettings> {
        self.exchanges.get(channel)
    }

    /// Resolve the topology for a channel.
    #[must_use]
    pub fn resolve(&self, channel: &str) -> ExchangeTopology {
        let Some(settings) = self.settings(channel) else {
            return ExchangeTopology::with_kind(self.default_kind.clone());
        };

        ExchangeTopology {
            kind: settings
                .kind
                .clone()
                .unwrap_or_else(|| self.default_kind.clone()),
            // Passive follows `durable`, as deployed configurations expect.
            // A durable exchange is therefore never created by Herald and
            // must exist on the broker beforehand.
            passive: settings.durable,
            durable: settings.durable,
            auto_delete: settings.auto_delete,
            internal: settings.internal,
        }
    }
}
