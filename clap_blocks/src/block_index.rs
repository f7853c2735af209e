//! Block index configuration
use block_index::{EncryptionSettingNode, IndexTreeNode, OrdinalAad};
use bytes::Bytes;
use snafu::{ensure, OptionExt, Snafu};

#[derive(Debug, Clone, Copy, Snafu)]
#[expect(missing_docs)]
pub enum BlockIndexConfigError {
    #[snafu(display(
        "--block-index-encryption requires --block-index-key-name / BLOCK_INDEX_KEY_NAME"
    ))]
    MissingKeyName,

    #[snafu(display("--block-index-key-name must not be empty"))]
    EmptyKeyName,
}

/// Configuration of the per-block statistics index
#[derive(Debug, Clone, clap::Parser)]
pub struct BlockIndexConfig {
    /// Build a statistics tree for every sealed block.
    ///
    /// Readers use the tree to skip blocks that cannot match a query. Blocks
    /// written without one are always read.
    #[clap(
        long = "block-index-enabled",
        env = "BLOCK_INDEX_ENABLED",
        default_value = "true",
        action = clap::ArgAction::Set
    )]
    pub enabled: bool,

    /// Encrypt the payload of every tree node.
    ///
    /// Requires `--block-index-key-name`.
    #[clap(
        long = "block-index-encryption",
        env = "BLOCK_INDEX_ENCRYPTION",
        default_value = "false",
        action
    )]
    pub encryption: bool,

    /// Name of the key, as known to the key store, that node payloads are
    /// encrypted under.
    #[clap(long = "block-index-key-name", env = "BLOCK_INDEX_KEY_NAME", action)]
    pub key_name: Option<String>,

    /// Fixed prefix of the additional authenticated data bound into every
    /// encrypted node.
    #[clap(long = "block-index-aad-prefix", env = "BLOCK_INDEX_AAD_PREFIX", action)]
    pub aad_prefix: Option<String>,
}

impl BlockIndexConfig {
    /// A fresh tree root if statistics trees are enabled.
    pub fn new_tree(&self) -> Option<IndexTreeNode> {
        self.enabled.then(block_index::new_node)
    }

    /// The encryption setting applied to every node, or `None` when trees are
    /// written in the clear.
    pub fn encryption_setting(
        &self,
    ) -> Result<Option<EncryptionSettingNode>, BlockIndexConfigError> {
        if !self.encryption {
            return Ok(None);
        }
        let key_name = self.key_name.as_deref().context(MissingKeyNameSnafu)?;
        ensure!(!key_name.is_empty(), EmptyKeyNameSnafu);
        Ok(Some(EncryptionSettingNode::encrypted(key_name)))
    }

    /// The authenticated data context for the tree of the block `identifier`.
    pub fn aad_context(&self, identifier: impl Into<Bytes>) -> OrdinalAad {
        let aad = OrdinalAad::new(identifier);
        match &self.aad_prefix {
            Some(prefix) => aad.with_prefix(prefix.clone()),
            None => aad,
        }
    }
}
