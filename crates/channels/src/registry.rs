use {
    super::plugin::{ChannelDescriptor, ChannelPlugin},
    std::collections::HashMap,
};

/// Registry of all loaded channel plugins.
pub struct ChannelRegistry {
    plugins: HashMap<String, Box<dyn ChannelPlugin>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn ChannelPlugin>) {
        self.plugins.insert(plugin.id().to_string(), plugin);
    }

    pub fn get(&self, id: &str) -> Option<&dyn ChannelPlugin> {
        self.plugins.get(id).map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Box<dyn ChannelPlugin>> {
        self.plugins.get_mut(id)
    }

    pub fn list(&self) -> Vec<&str> {
        self.plugins.keys().map(|s| s.as_str()).collect()
    }

    /// Identity descriptors of every registered plugin.
    pub fn descriptors(&self) -> Vec<ChannelDescriptor> {
        self.plugins.values().map(|p| p.descriptor()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::plugin::{
            ChannelCapabilities, ChannelOutbound, ChannelStatus, ChatType,
        },
        async_trait::async_trait,
    };

    struct FakePlugin;

    #[async_trait]
    impl ChannelPlugin for FakePlugin {
        fn descriptor(&self) -> ChannelDescriptor {
            ChannelDescriptor {
                id: "fake",
                label: "Fake",
                chat_types: &[ChatType::Direct],
                capabilities: ChannelCapabilities {
                    media: false,
                    reactions: false,
                    edit: false,
                    delete: false,
                },
            }
        }

        async fn start_account(
            &mut self,
            _account_id: &str,
            _config: serde_json::Value,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop_account(&mut self, _account_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn outbound(&self) -> Option<&dyn ChannelOutbound> {
            None
        }

        fn status(&self) -> Option<&dyn ChannelStatus> {
            None
        }
    }

    #[test]
    fn register_and_lookup_by_id() {
        let mut registry = ChannelRegistry::new();
        registry.register(Box::new(FakePlugin));

        assert_eq!(registry.list(), ["fake"]);
        assert!(registry.get("fake").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.descriptors()[0].label, "Fake");
    }
}
