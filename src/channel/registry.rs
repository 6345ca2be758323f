//! Channel registry.
//!
//! Lookup of channel definitions by name and shortcut, plus default channel
//! resolution. The registry is replaced wholesale on reload.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use super::ChannelDefinition;
use crate::error::ChatError;

/// Immutable-per-reload set of channel definitions.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    /// Definitions in registry order.
    channels: Vec<ChannelDefinition>,
    /// Index into `channels` by name.
    by_name: HashMap<String, usize>,
    /// Index into `channels` by shortcut.
    by_shortcut: HashMap<String, usize>,
    /// Configured default channel name.
    default_name: String,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from definitions.
    pub fn from_definitions(
        definitions: Vec<ChannelDefinition>,
        default_name: impl Into<String>,
    ) -> Self {
        let mut registry = Self::new();
        registry.load(definitions, default_name);
        registry
    }

    /// Replace the entire registry.
    ///
    /// Duplicate names or shortcuts are logged and the later definition is
    /// dropped. Returns the number of channels loaded.
    pub fn load(
        &mut self,
        definitions: Vec<ChannelDefinition>,
        default_name: impl Into<String>,
    ) -> usize {
        info!("Loading {} channel definitions", definitions.len());

        let mut next = Self {
            default_name: default_name.into(),
            ..Self::default()
        };

        for definition in definitions {
            if next.by_name.contains_key(&definition.name) {
                warn!(
                    "Duplicate channel name '{}'. Ignoring subsequent definition.",
                    definition.name
                );
                continue;
            }
            if next.by_shortcut.contains_key(&definition.shortcut) {
                warn!(
                    "Duplicate channel shortcut '{}'. Ignoring subsequent definition.",
                    definition.shortcut
                );
                continue;
            }

            let index = next.channels.len();
            next.by_name.insert(definition.name.clone(), index);
            next.by_shortcut.insert(definition.shortcut.clone(), index);
            debug!("Loaded channel: {}", definition.name);
            next.channels.push(definition);
        }

        *self = next;
        info!("Finished loading chat channels. Total loaded: {}", self.len());
        self.len()
    }

    /// Look up a channel by name.
    pub fn by_name(&self, name: &str) -> Option<&ChannelDefinition> {
        self.by_name.get(name).map(|&i| &self.channels[i])
    }

    /// Look up a channel by shortcut (case-sensitive).
    pub fn by_shortcut(&self, shortcut: &str) -> Option<&ChannelDefinition> {
        self.by_shortcut.get(shortcut).map(|&i| &self.channels[i])
    }

    /// All channels in registry order.
    pub fn all(&self) -> &[ChannelDefinition] {
        &self.channels
    }

    /// Always-on channels in registry order.
    pub fn always_on(&self) -> impl Iterator<Item = &ChannelDefinition> {
        self.channels.iter().filter(|c| c.always_on)
    }

    /// Check whether a channel name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Configured default channel name.
    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Resolve the default channel.
    ///
    /// Falls back to the first always-on channel, then to the first channel.
    /// An empty registry yields [`ChatError::NoChannelsConfigured`].
    pub fn resolve_default(&self) -> Result<&ChannelDefinition, ChatError> {
        if let Some(channel) = self.by_name(&self.default_name) {
            return Ok(channel);
        }

        let fallback = self
            .always_on()
            .next()
            .or_else(|| self.channels.first());

        match fallback {
            Some(channel) => {
                warn!(
                    "Default channel '{}' not found. Using '{}' as fallback default.",
                    self.default_name, channel.name
                );
                Ok(channel)
            }
            None => {
                error!("No channels loaded. Cannot determine a default channel.");
                Err(ChatError::NoChannelsConfigured)
            }
        }
    }
}
