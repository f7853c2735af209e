//! Statistics trees whose node payloads are individually encrypted.
//!
//! Key management and the cipher itself are supplied by the caller through
//! [`KeyStore`] and [`CipherProvider`]. Every node visited during a write or
//! read draws one ordinal from the [`AadContext`], whether or not that node
//! is encrypted, so the ordinals seen by writer and reader stay in lockstep.

use std::{collections::HashMap, fmt, sync::Arc};

use bytes::Bytes;
use observability_deps::tracing::{trace, warn};
use snafu::{OptionExt, ResultExt};

use crate::{
    codec::{BinaryReader, BinaryWriter},
    error::{
        CipherConstructionSnafu, DynError, EncryptionSnafu, KeyLookupSnafu, MalformedSnafu,
        MissingKeyNameSnafu, Result,
    },
    registry::{wire_code, IndexTypeRegistry},
    statistic::StatisticIndex,
    tree::{ensure_depth, IndexTreeNode},
};

/// Key material handed out by a [`KeyStore`].
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey(Bytes);

impl EncryptionKey {
    /// Wraps raw key material.
    pub fn new(material: impl Into<Bytes>) -> Self {
        Self(material.into())
    }

    /// The raw key material.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey(<{} bytes redacted>)", self.0.len())
    }
}

/// Looks up keys by name.
pub trait KeyStore: fmt::Debug + Send + Sync {
    /// Returns the key called `name`.
    fn get_key(&self, name: &str) -> Result<EncryptionKey, DynError>;
}

/// Identifies what a cipher is protecting.
///
/// Ciphers for different modules must not produce interchangeable
/// ciphertexts, even when they are built from the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleTag {
    /// Column values.
    ColumnData,
    /// Statistics tree payloads.
    BlockIndex,
}

impl ModuleTag {
    /// Byte written into the authenticated data.
    pub fn code(self) -> u8 {
        match self {
            Self::ColumnData => 0,
            Self::BlockIndex => 1,
        }
    }
}

/// Authenticated encryption primitive.
pub trait Cipher: fmt::Debug + Send + Sync {
    /// Encrypts `plaintext`, binding it to `aad`.
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Bytes, DynError>;

    /// Decrypts `ciphertext`, failing if it or `aad` was tampered with or the key is wrong.
    fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Bytes, DynError>;
}

/// Builds ciphers from keys.
pub trait CipherProvider: fmt::Debug + Send + Sync {
    /// Returns a cipher for `key` scoped to `module`.
    fn cipher(&self, key: &EncryptionKey, module: ModuleTag) -> Result<Arc<dyn Cipher>, DynError>;
}

/// Source of the additional authenticated data bound into each node.
pub trait AadContext: fmt::Debug + Send {
    /// Returns the current ordinal and advances it.
    fn next_ordinal(&mut self) -> u64;

    /// Identifies the file or block the tree belongs to.
    fn identifier(&self) -> &[u8];

    /// Optional fixed prefix.
    fn prefix(&self) -> Option<&[u8]>;

    /// Authenticated data for the node drawn at `ordinal`:
    /// `len(prefix) ++ prefix ++ len(identifier) ++ identifier ++ module code ++
    /// ordinal`, with `u32` lengths and all integers big-endian. A missing
    /// prefix has length zero.
    fn aad(&self, module: ModuleTag, ordinal: u64) -> Vec<u8> {
        let prefix = self.prefix().unwrap_or_default();
        let identifier = self.identifier();
        let mut aad = Vec::with_capacity(prefix.len() + identifier.len() + 17);
        for field in [prefix, identifier] {
            aad.extend_from_slice(&(field.len() as u32).to_be_bytes());
            aad.extend_from_slice(field);
        }
        aad.push(module.code());
        aad.extend_from_slice(&ordinal.to_be_bytes());
        aad
    }
}

/// An [`AadContext`] counting up from zero.
///
/// Writer and reader of one tree must each start from a fresh context with
/// the same identifier and prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinalAad {
    prefix: Option<Bytes>,
    identifier: Bytes,
    next: u64,
}

impl OrdinalAad {
    /// Creates a context for `identifier` starting at ordinal zero.
    pub fn new(identifier: impl Into<Bytes>) -> Self {
        Self {
            prefix: None,
            identifier: identifier.into(),
            next: 0,
        }
    }

    /// Sets the fixed prefix.
    pub fn with_prefix(mut self, prefix: impl Into<Bytes>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

impl AadContext for OrdinalAad {
    fn next_ordinal(&mut self) -> u64 {
        let ordinal = self.next;
        self.next += 1;
        ordinal
    }

    fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    fn prefix(&self) -> Option<&[u8]> {
        self.prefix.as_deref()
    }
}

/// Per-path description of which nodes are encrypted, and under which key.
pub trait EncryptionSetting: fmt::Debug + Send + Sync {
    /// Whether this node's payload is encrypted.
    fn is_encrypt_node(&self) -> bool;

    /// Key used when [`EncryptionSetting::is_encrypt_node`] is true.
    fn key_name(&self) -> Option<&str>;

    /// Setting of the child called `name`.
    ///
    /// `None` means the child inherits this setting.
    fn child(&self, name: &str) -> Option<&dyn EncryptionSetting>;
}

/// A concrete [`EncryptionSetting`] tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionSettingNode {
    encrypt: bool,
    key_name: Option<String>,
    children: HashMap<String, EncryptionSettingNode>,
}

impl EncryptionSettingNode {
    /// A node written in the clear.
    pub fn plaintext() -> Self {
        Self::default()
    }

    /// A node encrypted under `key_name`.
    pub fn encrypted(key_name: impl Into<String>) -> Self {
        Self {
            encrypt: true,
            key_name: Some(key_name.into()),
            children: HashMap::new(),
        }
    }

    /// A node that must be encrypted but names no key.
    ///
    /// Serialising under such a setting fails.
    pub fn encrypted_without_key() -> Self {
        Self {
            encrypt: true,
            ..Default::default()
        }
    }

    /// Overrides the setting of child `name`.
    pub fn with_child(mut self, name: impl Into<String>, child: Self) -> Self {
        self.children.insert(name.into(), child);
        self
    }
}

impl EncryptionSetting for EncryptionSettingNode {
    fn is_encrypt_node(&self) -> bool {
        self.encrypt
    }

    fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    fn child(&self, name: &str) -> Option<&dyn EncryptionSetting> {
        self.children
            .get(name)
            .map(|child| child as &dyn EncryptionSetting)
    }
}

/// The collaborators of one serialise or deserialise call.
///
/// Ciphers are built once per key name and reused for the rest of the call.
#[derive(Debug)]
pub struct CryptoContext<'a> {
    key_store: &'a dyn KeyStore,
    ciphers: &'a dyn CipherProvider,
    aad: &'a mut dyn AadContext,
    cache: HashMap<String, Arc<dyn Cipher>>,
}

impl<'a> CryptoContext<'a> {
    /// Creates a context.
    pub fn new(
        key_store: &'a dyn KeyStore,
        ciphers: &'a dyn CipherProvider,
        aad: &'a mut dyn AadContext,
    ) -> Self {
        Self {
            key_store,
            ciphers,
            aad,
            cache: HashMap::new(),
        }
    }

    fn cipher(&mut self, key_name: &str) -> Result<Arc<dyn Cipher>> {
        if let Some(cipher) = self.cache.get(key_name) {
            return Ok(Arc::clone(cipher));
        }

        let key = self
            .key_store
            .get_key(key_name)
            .context(KeyLookupSnafu { key_name })?;
        let cipher = self
            .ciphers
            .cipher(&key, ModuleTag::BlockIndex)
            .context(CipherConstructionSnafu { key_name })?;
        self.cache.insert(key_name.to_owned(), Arc::clone(&cipher));
        Ok(cipher)
    }

    fn decrypt(
        &mut self,
        key_name: &str,
        ordinal: u64,
        ciphertext: &[u8],
    ) -> Result<Bytes, DynError> {
        let cipher = self.cipher(key_name)?;
        cipher.decrypt(ciphertext, &self.aad.aad(ModuleTag::BlockIndex, ordinal))
    }
}

/// A statistics tree together with the name of its root node.
///
/// Unlike [`IndexTreeNode::serialize`], each node carries its own name inside
/// its (possibly encrypted) payload, so names are only recoverable by readers
/// holding the right key.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedIndexTreeNode {
    node_name: String,
    tree: IndexTreeNode,
}

impl EncryptedIndexTreeNode {
    /// An empty tree whose root is called `node_name`.
    pub fn new(node_name: impl Into<String>) -> Self {
        Self::from_tree(node_name, IndexTreeNode::new())
    }

    /// Wraps an existing tree.
    pub fn from_tree(node_name: impl Into<String>, tree: IndexTreeNode) -> Self {
        Self {
            node_name: node_name.into(),
            tree,
        }
    }

    /// Name of the root node.
    ///
    /// Empty if the root was read without access to its key.
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// The tree.
    pub fn tree(&self) -> &IndexTreeNode {
        &self.tree
    }

    /// The tree, for accumulation.
    pub fn tree_mut(&mut self) -> &mut IndexTreeNode {
        &mut self.tree
    }

    /// Unwraps the tree.
    pub fn into_tree(self) -> IndexTreeNode {
        self.tree
    }

    /// Encodes the tree, encrypting nodes as `setting` dictates.
    ///
    /// A disabled root encodes to zero bytes.
    pub fn serialize(
        &self,
        setting: &dyn EncryptionSetting,
        ctx: &mut CryptoContext<'_>,
    ) -> Result<Bytes> {
        let mut w = BinaryWriter::default();
        if !self.tree.is_disabled() {
            write_node(&mut w, &self.tree, &self.node_name, &self.node_name, setting, ctx)?;
        }
        let bytes = w.finish();
        trace!(
            node = %self.node_name,
            bytes = bytes.len(),
            "serialized encrypted block index tree"
        );
        Ok(bytes)
    }

    /// Decodes a tree written by [`EncryptedIndexTreeNode::serialize`].
    ///
    /// Nodes that cannot be decrypted keep no statistic. Their children are
    /// still decoded but cannot be attached, as the node name is part of the
    /// encrypted payload. Trees nested deeper than
    /// [`MAX_TREE_DEPTH`](crate::tree::MAX_TREE_DEPTH) are rejected as
    /// malformed.
    pub fn deserialize(data: &[u8], ctx: &mut CryptoContext<'_>) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::from_tree(String::new(), IndexTreeNode::disabled()));
        }
        let mut r = BinaryReader::new(data);
        let (node_name, tree) = read_node(&mut r, ctx, 0)?;
        r.finish("encrypted block index node")?;
        Ok(Self::from_tree(node_name.unwrap_or_default(), tree))
    }
}

fn write_node(
    w: &mut BinaryWriter,
    node: &IndexTreeNode,
    name: &str,
    path: &str,
    setting: &dyn EncryptionSetting,
    ctx: &mut CryptoContext<'_>,
) -> Result<()> {
    let ordinal = ctx.aad.next_ordinal();
    let record = node_record(name, node.stored_statistic());

    if setting.is_encrypt_node() {
        let key_name = setting.key_name().context(MissingKeyNameSnafu { path })?;
        let cipher = ctx.cipher(key_name)?;
        let aad = ctx.aad.aad(ModuleTag::BlockIndex, ordinal);
        let payload = cipher
            .encrypt(&record, &aad)
            .context(EncryptionSnafu { path })?;
        w.put_u8(1);
        w.put_str(key_name);
        write_body(w, node, &payload, path, setting, ctx)
    } else {
        w.put_u8(0);
        w.put_str("");
        write_body(w, node, &record, path, setting, ctx)
    }
}

fn write_body(
    w: &mut BinaryWriter,
    node: &IndexTreeNode,
    payload: &[u8],
    path: &str,
    setting: &dyn EncryptionSetting,
    ctx: &mut CryptoContext<'_>,
) -> Result<()> {
    let live: Vec<_> = node
        .children()
        .filter(|(_, child)| !child.is_disabled())
        .collect();
    w.put_len(live.len());
    w.put_len_prefixed(payload);

    for (name, child) in live {
        let child_setting = setting.child(name).unwrap_or(setting);
        let child_path = format!("{path}.{name}");
        let slot = w.begin_len();
        write_node(w, child, name, &child_path, child_setting, ctx)?;
        w.end_len(slot);
    }
    Ok(())
}

/// `name ++ type code ++ statistic payload`; no statistic writes an empty code.
fn node_record(name: &str, statistic: Option<&StatisticIndex>) -> Bytes {
    let mut w = BinaryWriter::default();
    w.put_str(name);
    match statistic {
        Some(statistic) => {
            w.put_str(wire_code(statistic.index_type()));
            let slot = w.begin_len();
            statistic.write_binary(&mut w);
            w.end_len(slot);
        }
        None => {
            w.put_str("");
            w.put_len(0);
        }
    }
    w.finish()
}

fn parse_record(record: &[u8]) -> Result<(String, Option<StatisticIndex>)> {
    let mut r = BinaryReader::new(record);
    let name = r.get_string("node name")?;
    let code = r.get_string("statistic type")?;
    let payload = r.get_len_prefixed()?;
    r.finish("node record")?;

    if code.is_empty() {
        if !payload.is_empty() {
            return MalformedSnafu {
                reason: format!("node '{name}' has a statistic payload but no type"),
            }
            .fail();
        }
        return Ok((name, None));
    }
    let mut statistic = IndexTypeRegistry::global().resolve_code(&code)?;
    statistic.set_from_binary(payload)?;
    Ok((name, Some(statistic)))
}

fn read_node(
    r: &mut BinaryReader<'_>,
    ctx: &mut CryptoContext<'_>,
    depth: usize,
) -> Result<(Option<String>, IndexTreeNode)> {
    ensure_depth(depth)?;
    let ordinal = ctx.aad.next_ordinal();
    let encrypted = match r.get_u8()? {
        0 => false,
        1 => true,
        flag => {
            return MalformedSnafu {
                reason: format!("encryption flag must be 0 or 1, got {flag}"),
            }
            .fail()
        }
    };
    let key_name = r.get_string("key name")?;
    let count = r.get_len()?;
    let payload = r.get_len_prefixed()?;

    let (name, statistic) = if encrypted {
        let record = ctx
            .decrypt(&key_name, ordinal, payload)
            .and_then(|record| parse_record(&record).map_err(DynError::from));
        match record {
            Ok((name, statistic)) => (Some(name), statistic),
            Err(e) => {
                warn!(
                    %key_name,
                    ordinal,
                    error = %e,
                    "failed to decrypt block index node, treating its statistic as absent"
                );
                (None, None)
            }
        }
    } else {
        let (name, statistic) = parse_record(payload)?;
        (Some(name), statistic)
    };

    let mut node = IndexTreeNode::new();
    if let Some(statistic) = statistic {
        node.set_statistic(statistic);
    }
    for _ in 0..count {
        let mut child = BinaryReader::new(r.get_len_prefixed()?);
        let (child_name, child_node) = read_node(&mut child, ctx, depth + 1)?;
        child.finish("encrypted block index node")?;
        if let Some(child_name) = child_name {
            node.insert_child(child_name, child_node);
        }
    }
    Ok((name, node))
}
