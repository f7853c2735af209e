//! Block-level column statistics used to skip blocks that cannot match a query.
//!
//! While a block is written, every column feeds a [`StatisticIndex`] that is
//! installed at the column's path in an [`IndexTreeNode`]. The sealed tree is
//! serialised next to the block, either in the clear or with per-node
//! encryption through [`EncryptedIndexTreeNode`]. At read time the tree is
//! decoded and [`IndexTreeNode::evaluate`] answers, for one column path and
//! one [`Predicate`], whether the block must be read or can be skipped.
//!
//! A [`Decision::Skip`] is only ever returned when no row summarised by the
//! statistic can match. Everything the index cannot prove, including type
//! conflicts between blocks and payloads that fail to decrypt, answers
//! [`Decision::MustRead`].
#![warn(missing_docs)]

mod codec;
pub mod encrypted;
pub mod error;
pub mod predicate;
pub mod registry;
pub mod statistic;
pub mod tree;

pub use encrypted::{
    AadContext, Cipher, CipherProvider, CryptoContext, EncryptedIndexTreeNode, EncryptionKey,
    EncryptionSetting, EncryptionSettingNode, KeyStore, ModuleTag, OrdinalAad,
};
pub use error::{DynError, Error, Result};
pub use predicate::{Decision, NumberOp, Predicate, RangeFilter, ScalarValue, StringOp};
pub use registry::{IndexType, IndexTypeRegistry};
pub use statistic::{
    BooleanIndex, FullRangeEntry, FullRangeIndex, RangeIndex, RangeStatistic, StatisticIndex,
    StringRangeIndex,
};
pub use tree::{IndexTreeNode, MAX_TREE_DEPTH};

/// A fresh root for a block's statistics tree.
pub fn new_node() -> IndexTreeNode {
    IndexTreeNode::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Merging a long range into an int range disables the path for good.
    #[test]
    fn test_conflicting_types_always_read() {
        test_helpers::maybe_start_logging();

        let mut root = new_node();
        let column = root.get_or_create_child("c").unwrap();
        column.set_statistic(RangeIndex::<i32>::new(10, 20).into());
        column.set_statistic(RangeIndex::<i64>::new(10, 20).into());

        let decoded = IndexTreeNode::deserialize(&root.serialize()).unwrap();
        for tree in [&root, &decoded] {
            for predicate in [Predicate::equal(100), Predicate::lt(0), Predicate::gt(50)] {
                assert_eq!(tree.evaluate(&["c"], &predicate), Decision::MustRead);
            }
        }
    }
}
