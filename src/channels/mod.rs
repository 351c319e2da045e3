//! In-memory channel registry.
//!
//! Holds the live set of channel definitions. Mutated by the management
//! API and the schedule controller; everything else treats a lookup as a
//! point-in-time snapshot.

pub mod region;

use crate::config::{ChannelDefinition, VariantDefinition};
use dashmap::DashMap;

/// Variant tag used when a viewer does not request a specific variant.
pub const DEFAULT_VARIANT: &str = "default";

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: DashMap<u64, ChannelDefinition>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_channels(channels: impl IntoIterator<Item = ChannelDefinition>) -> Self {
        let registry = Self::new();
        for channel in channels {
            registry.channels.insert(channel.id, channel);
        }
        registry
    }

    pub fn get(&self, id: u64) -> Option<ChannelDefinition> {
        self.channels.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: u64) -> bool {
        self.channels.contains_key(&id)
    }

    pub fn insert(&self, channel: ChannelDefinition) {
        self.channels.insert(channel.id, channel);
    }

    pub fn remove(&self, id: u64) -> Option<ChannelDefinition> {
        self.channels.remove(&id).map(|(_, channel)| channel)
    }

    /// Replace a channel in place. Returns false when the id is unknown.
    pub fn update(&self, id: u64, channel: ChannelDefinition) -> bool {
        match self.channels.get_mut(&id) {
            Some(mut entry) => {
                *entry = channel;
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of all definitions, ordered by id.
    pub fn snapshot(&self) -> Vec<ChannelDefinition> {
        let mut channels: Vec<_> = self
            .channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        channels.sort_by_key(|c| c.id);
        channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Smallest unused positive id, for API-created channels.
    pub fn next_id(&self) -> u64 {
        self.channels
            .iter()
            .map(|entry| *entry.key())
            .max()
            .map_or(1, |max| max + 1)
    }
}

impl ChannelDefinition {
    pub fn variant(&self, name: &str) -> Option<&VariantDefinition> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Effective definition for a request that selected `variant`.
    ///
    /// Each field the variant sets replaces the parent field wholesale;
    /// fields it leaves unset are inherited. Sub-fields are never merged.
    pub fn with_variant(&self, variant: &VariantDefinition) -> ChannelDefinition {
        let mut effective = self.clone();
        if let Some(source) = &variant.source {
            effective.source = source.clone();
        }
        if let Some(profile) = &variant.profile {
            effective.profile = Some(profile.clone());
        }
        if let Some(custom) = &variant.custom_command {
            effective.custom_command = Some(custom.clone());
        }
        if let Some(handler) = &variant.handler {
            effective.handler = Some(handler.clone());
        }
        if let Some(options) = &variant.input_options {
            effective.input_options = Some(options.clone());
        }
        if let Some(args) = &variant.input_args {
            effective.input_args = Some(args.clone());
        }
        effective
    }
}
