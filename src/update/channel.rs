use super::version::{VersionCatalog, VersionRecord};
use crate::error::{BootError, Result};
use std::fmt;

pub type Selector = fn(&VersionCatalog) -> Result<&VersionRecord>;

/// A named update track and the rule that picks its version.
#[derive(Clone)]
pub struct Channel {
    name: String,
    select: Selector,
}

impl Channel {
    pub fn new(name: &str, select: Selector) -> Self {
        Self {
            name: name.to_uppercase(),
            select,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn select<'a>(&self, catalog: &'a VersionCatalog) -> Result<&'a VersionRecord> {
        (self.select)(catalog)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::empty()
            .register("LATEST", VersionCatalog::latest)
            .register("STABLE", VersionCatalog::stable)
    }
}

impl ChannelRegistry {
    pub fn empty() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Add a channel, replacing any existing one with the same name.
    pub fn register(mut self, name: &str, select: Selector) -> Self {
        let channel = Channel::new(name, select);
        self.channels.retain(|c| c.name != channel.name);
        self.channels.push(channel);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<&Channel> {
        let wanted = name.trim();
        self.channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BootError::UnknownChannel(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::version::Status;

    fn catalog() -> VersionCatalog {
        VersionCatalog::new(vec![
            VersionRecord::new("stable-1", 100, Status::Stable),
            VersionRecord::new("stable-2", 200, Status::Stable),
            VersionRecord::new("latest-1", 300, Status::Latest),
            VersionRecord::new("old", 50, Status::Outdated),
        ])
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = ChannelRegistry::default();
        assert_eq!(registry.resolve("stable").unwrap().name(), "STABLE");
        assert_eq!(registry.resolve(" Latest ").unwrap().name(), "LATEST");
    }

    #[test]
    fn test_unknown_channel() {
        let registry = ChannelRegistry::default();
        match registry.resolve("nightly") {
            Err(BootError::UnknownChannel(name)) => assert_eq!(name, "nightly"),
            other => panic!("unexpected: {:?}", other.map(|c| c.name().to_string())),
        }
    }

    #[test]
    fn test_stable_channel_picks_newest_stable() {
        let registry = ChannelRegistry::default();
        let catalog = catalog();
        let stable = registry.resolve("STABLE").unwrap().select(&catalog).unwrap();
        assert_eq!(stable.name(), "stable-2");
        let latest = registry.resolve("LATEST").unwrap().select(&catalog).unwrap();
        assert_eq!(latest.name(), "latest-1");
    }

    #[test]
    fn test_channels_are_data() {
        fn outdated(catalog: &VersionCatalog) -> Result<&VersionRecord> {
            catalog.find_by_status(Status::Outdated)
        }

        let registry = ChannelRegistry::default().register("legacy", outdated);
        assert_eq!(registry.names(), vec!["LATEST", "STABLE", "LEGACY"]);
        let catalog = catalog();
        let picked = registry.resolve("legacy").unwrap().select(&catalog).unwrap();
        assert_eq!(picked.name(), "old");
    }
}
