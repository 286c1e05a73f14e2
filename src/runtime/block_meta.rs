/// Static information about a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMeta {
    type_name: String,
    instance_name: Option<String>,
    enabled: bool,
}

impl BlockMeta {
    fn new(type_name: String, instance_name: Option<String>, enabled: bool) -> BlockMeta {
        BlockMeta {
            type_name,
            instance_name,
            enabled,
        }
    }

    /// Name of the block type, e.g., `Copy`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Unique name of this instance, assigned when added to a flowgraph.
    pub fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }

    /// Set the instance name.
    pub fn set_instance_name(&mut self, name: &str) {
        self.instance_name = Some(name.to_string());
    }

    /// Disabled blocks are bypassed or elided when the flowgraph is committed.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the block.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Builder for [`BlockMeta`].
pub struct BlockMetaBuilder {
    type_name: String,
    instance_name: Option<String>,
    enabled: bool,
}

impl BlockMetaBuilder {
    /// Start a builder for the given block type.
    pub fn new(type_name: &str) -> BlockMetaBuilder {
        BlockMetaBuilder {
            type_name: type_name.to_string(),
            instance_name: None,
            enabled: true,
        }
    }

    /// Preferred instance name. It is made unique when the block is added to a flowgraph.
    pub fn instance_name(&mut self, name: &str) -> &mut BlockMetaBuilder {
        self.instance_name = Some(name.to_string());
        self
    }

    /// Create the block in disabled state.
    pub fn disabled(&mut self) -> &mut BlockMetaBuilder {
        self.enabled = false;
        self
    }

    /// Build the meta data.
    pub fn build(&self) -> BlockMeta {
        BlockMeta::new(
            self.type_name.clone(),
            self.instance_name.clone(),
            self.enabled,
        )
    }
}
