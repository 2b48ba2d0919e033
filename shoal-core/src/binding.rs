// ABOUTME: Immutable room binding between one backend's rooms and logical rooms
// ABOUTME: Built once from the [bindings] config table and shared by both bridge directions

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;

use crate::message::ChannelType;

/// Raw `[bindings]` table: logical room -> (backend tag -> backend room id)
pub type BindingsConfig = BTreeMap<String, BTreeMap<String, String>>;

/// Room mapping for a single backend.
///
/// Both lookups are total over the configured rooms; a room that is not in the
/// binding is simply not relayed.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    channel: Option<ChannelType>,
    to_logical: HashMap<String, String>,
    to_backend: HashMap<String, String>,
}

impl Binding {
    /// Build the binding for `channel` out of the full bindings table.
    ///
    /// Fails if two logical rooms claim the same backend room.
    pub fn for_channel(bindings: &BindingsConfig, channel: ChannelType) -> Result<Self> {
        let pairs = bindings.iter().filter_map(|(logical, backends)| {
            backends
                .get(channel.as_str())
                .map(|room| (room.clone(), logical.clone()))
        });
        let mut binding = Self::from_pairs(pairs)?;
        binding.channel = Some(channel);
        Ok(binding)
    }

    /// Build a binding from `(backend room, logical room)` pairs
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut to_logical = HashMap::new();
        let mut to_backend = HashMap::new();
        for (room, logical) in pairs {
            if let Some(existing) = to_logical.get(&room) {
                anyhow::bail!(
                    "Backend room '{}' is bound to both '{}' and '{}'",
                    room,
                    existing,
                    logical
                );
            }
            to_backend.insert(logical.clone(), room.clone());
            to_logical.insert(room, logical);
        }
        Ok(Self {
            channel: None,
            to_logical,
            to_backend,
        })
    }

    /// Backend this binding was built for, if built from config
    pub fn channel(&self) -> Option<ChannelType> {
        self.channel
    }

    /// Logical room for a backend room id
    pub fn logical_room(&self, backend_room: &str) -> Option<&str> {
        self.to_logical.get(backend_room).map(String::as_str)
    }

    /// Backend room id for a logical room
    pub fn backend_room(&self, logical_room: &str) -> Option<&str> {
        self.to_backend.get(logical_room).map(String::as_str)
    }

    /// All bound `(backend room, logical room)` pairs, sorted by backend room
    pub fn rooms(&self) -> Vec<(&str, &str)> {
        let mut rooms: Vec<_> = self
            .to_logical
            .iter()
            .map(|(room, logical)| (room.as_str(), logical.as_str()))
            .collect();
        rooms.sort();
        rooms
    }

    pub fn is_empty(&self) -> bool {
        self.to_logical.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_logical.len()
    }
}
