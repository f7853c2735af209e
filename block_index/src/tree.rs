//! The statistics tree of one block, mirroring the column hierarchy.

use std::collections::BTreeMap;

use bytes::Bytes;
use observability_deps::tracing::{debug, trace};
use snafu::ensure;

use crate::{
    codec::{BinaryReader, BinaryWriter},
    error::{MalformedSnafu, Result},
    predicate::{Decision, Predicate},
    registry::{wire_code, IndexTypeRegistry},
    statistic::StatisticIndex,
};

static UNSUPPORTED: StatisticIndex = StatisticIndex::Unsupported;

/// Deepest nesting accepted when decoding a tree.
pub const MAX_TREE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum NodeState {
    Active {
        statistic: Option<StatisticIndex>,
        children: BTreeMap<String, IndexTreeNode>,
    },
    /// The column path saw incompatible statistic types. Terminal.
    Disabled,
}

/// A node of the statistics tree.
///
/// A node holds at most one statistic plus named children. Installing a
/// statistic whose type differs from the one already held disables the node
/// for good: it drops its statistic and children and every later evaluation
/// under it answers [`Decision::MustRead`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexTreeNode {
    state: NodeState,
}

impl Default for IndexTreeNode {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexTreeNode {
    /// An empty, active node.
    pub fn new() -> Self {
        Self {
            state: NodeState::Active {
                statistic: None,
                children: BTreeMap::new(),
            },
        }
    }

    /// A node that has already been disabled.
    pub fn disabled() -> Self {
        Self {
            state: NodeState::Disabled,
        }
    }

    /// Returns true once the node has been disabled.
    pub fn is_disabled(&self) -> bool {
        matches!(self.state, NodeState::Disabled)
    }

    /// Disables the node, dropping its statistic and children.
    pub fn disable(&mut self) {
        self.state = NodeState::Disabled;
    }

    /// Returns the child called `name`, creating it if needed.
    ///
    /// A disabled node has no children and never gains any, so this returns
    /// `None` for it.
    pub fn get_or_create_child(&mut self, name: &str) -> Option<&mut Self> {
        match &mut self.state {
            NodeState::Active { children, .. } => {
                Some(children.entry(name.to_owned()).or_default())
            }
            NodeState::Disabled => None,
        }
    }

    /// The child called `name`, if present.
    pub fn child(&self, name: &str) -> Option<&Self> {
        match &self.state {
            NodeState::Active { children, .. } => children.get(name),
            NodeState::Disabled => None,
        }
    }

    /// Children in name order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &Self)> + '_ {
        let children = match &self.state {
            NodeState::Active { children, .. } => Some(children),
            NodeState::Disabled => None,
        };
        children
            .into_iter()
            .flatten()
            .map(|(name, child)| (name.as_str(), child))
    }

    /// The node at `path` below this one. An empty path is this node.
    pub fn find(&self, path: &[&str]) -> Option<&Self> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    pub(crate) fn insert_child(&mut self, name: String, child: Self) {
        if let NodeState::Active { children, .. } = &mut self.state {
            children.insert(name, child);
        }
    }

    /// Installs `statistic`, or merges it into the one already held.
    ///
    /// A merge between different variants disables the node. Calls on a
    /// disabled node are ignored.
    pub fn set_statistic(&mut self, statistic: StatisticIndex) {
        let NodeState::Active { statistic: held, .. } = &mut self.state else {
            return;
        };

        let existing = match held {
            None => {
                *held = Some(statistic);
                return;
            }
            Some(existing) => {
                if existing.merge(&statistic) {
                    return;
                }
                existing.index_type()
            }
        };

        debug!(
            %existing,
            incoming = %statistic.index_type(),
            "block index statistic type mismatch, disabling node"
        );
        self.disable();
    }

    /// The held statistic, or [`StatisticIndex::Unsupported`] if there is none.
    pub fn statistic(&self) -> &StatisticIndex {
        self.stored_statistic().unwrap_or(&UNSUPPORTED)
    }

    /// The held statistic, if any.
    pub fn stored_statistic(&self) -> Option<&StatisticIndex> {
        match &self.state {
            NodeState::Active { statistic, .. } => statistic.as_ref(),
            NodeState::Disabled => None,
        }
    }

    /// Evaluates `predicate` against the statistic at `path`.
    ///
    /// Missing paths, disabled nodes and absent statistics all answer
    /// [`Decision::MustRead`].
    pub fn evaluate(&self, path: &[&str], predicate: &Predicate) -> Decision {
        self.find(path)
            .map(|node| node.statistic().evaluate(predicate))
            .unwrap_or(Decision::MustRead)
    }

    /// Row group slots at `path` that must be read for `predicate`.
    ///
    /// `None` means there is no per-slot information and every row group has
    /// to be read.
    pub fn evaluate_slots(&self, path: &[&str], predicate: &Predicate) -> Option<Vec<i32>> {
        self.find(path)?
            .stored_statistic()?
            .evaluate_slots(predicate)
    }

    /// Merges the tree of another block into this one, child by child.
    ///
    /// A statistic survives only if both sides hold one of the same type. A
    /// side without a statistic, or without a child, knows nothing about the
    /// values of its block there, so the merged node keeps no statistic and
    /// children present on one side only are dropped.
    pub fn merge(&mut self, other: Self) {
        let NodeState::Active {
            statistic: theirs,
            children: their_children,
        } = other.state
        else {
            self.disable();
            return;
        };
        let NodeState::Active {
            statistic: mine,
            children,
        } = &mut self.state
        else {
            return;
        };

        if let (Some(mut existing), Some(incoming)) = (mine.take(), theirs) {
            if !existing.merge(&incoming) {
                debug!(
                    existing = %existing.index_type(),
                    incoming = %incoming.index_type(),
                    "block index statistic type mismatch, disabling node"
                );
                self.disable();
                return;
            }
            *mine = Some(existing);
        }

        children.retain(|name, _| their_children.contains_key(name));
        for (name, child) in their_children {
            if let Some(mine) = children.get_mut(&name) {
                mine.merge(child);
            }
        }
    }

    /// Encodes the tree. A disabled node encodes to zero bytes.
    pub fn serialize(&self) -> Bytes {
        let mut w = BinaryWriter::default();
        self.write(&mut w);
        let bytes = w.finish();
        trace!(bytes = bytes.len(), "serialized block index tree");
        bytes
    }

    fn write(&self, w: &mut BinaryWriter) {
        let NodeState::Active {
            statistic,
            children,
        } = &self.state
        else {
            return;
        };

        match statistic {
            Some(statistic) => {
                w.put_i32(1);
                w.put_str(wire_code(statistic.index_type()));
                let slot = w.begin_len();
                statistic.write_binary(w);
                w.end_len(slot);
            }
            None => w.put_i32(0),
        }

        w.put_len(children.values().filter(|child| !child.is_disabled()).count());
        for (name, child) in children {
            if child.is_disabled() {
                continue;
            }
            let slot = w.begin_len();
            w.put_str(name);
            let start = w.len();
            child.write(w);
            let len = w.len() - start;
            w.fill_len(slot, len);
        }
    }

    /// Decodes a tree written by [`IndexTreeNode::serialize`].
    ///
    /// Zero bytes decode to a disabled node. Trees nested deeper than
    /// [`MAX_TREE_DEPTH`] are rejected as malformed.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Self::decode(data, 0)
    }

    fn decode(data: &[u8], depth: usize) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::disabled());
        }
        ensure_depth(depth)?;
        let mut r = BinaryReader::new(data);
        let node = Self::read(&mut r, depth)?;
        r.finish("block index node")?;
        Ok(node)
    }

    fn read(r: &mut BinaryReader<'_>, depth: usize) -> Result<Self> {
        let statistic = match r.get_i32()? {
            0 => None,
            1 => {
                let code = r.get_string("statistic type")?;
                let payload = r.get_len_prefixed()?;
                let mut statistic = IndexTypeRegistry::global().resolve_code(&code)?;
                statistic.set_from_binary(payload)?;
                Some(statistic)
            }
            flag => {
                return MalformedSnafu {
                    reason: format!("statistic flag must be 0 or 1, got {flag}"),
                }
                .fail()
            }
        };

        let count = r.get_len()?;
        let mut node = Self {
            state: NodeState::Active {
                statistic,
                children: BTreeMap::new(),
            },
        };
        for _ in 0..count {
            let len = r.get_len()?;
            let name = r.get_string("child name")?;
            let child = Self::decode(r.get_slice(len)?, depth + 1)?;
            if !child.is_disabled() {
                node.insert_child(name, child);
            }
        }
        Ok(node)
    }
}

pub(crate) fn ensure_depth(depth: usize) -> Result<()> {
    ensure!(
        depth < MAX_TREE_DEPTH,
        MalformedSnafu {
            reason: format!("tree nested deeper than {MAX_TREE_DEPTH} levels"),
        }
    );
    Ok(())
}
