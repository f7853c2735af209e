//! Mapping between wire type tags and statistic variants.
//!
//! Every statistic is written with a type tag naming its variant. The full
//! identifier is verbose, so a fixed table of shortcut codes is used to shrink
//! the wire format. Identifiers without a shortcut are written unchanged, and
//! readers accept either form.

use std::{collections::HashMap, fmt, sync::LazyLock};

use observability_deps::tracing::trace;
use parking_lot::RwLock;

use crate::{
    error::{Result, UnknownTypeTagSnafu},
    statistic::{
        BooleanIndex, FullRangeIndex, RangeIndex, RangeStatistic, StatisticIndex,
        StringRangeIndex,
    },
};

/// The closed set of statistic variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[expect(missing_docs)]
pub enum IndexType {
    RangeByte,
    RangeShort,
    RangeInt,
    RangeLong,
    RangeFloat,
    RangeDouble,
    RangeString,
    FullRange,
    Boolean,
    Unsupported,
}

impl IndexType {
    /// All variants.
    pub const ALL: [Self; 10] = [
        Self::RangeByte,
        Self::RangeShort,
        Self::RangeInt,
        Self::RangeLong,
        Self::RangeFloat,
        Self::RangeDouble,
        Self::RangeString,
        Self::FullRange,
        Self::Boolean,
        Self::Unsupported,
    ];

    /// The verbose type identifier.
    pub fn identifier(self) -> &'static str {
        match self {
            Self::RangeByte => "block_index.statistic.ByteRangeIndex",
            Self::RangeShort => "block_index.statistic.ShortRangeIndex",
            Self::RangeInt => "block_index.statistic.IntRangeIndex",
            Self::RangeLong => "block_index.statistic.LongRangeIndex",
            Self::RangeFloat => "block_index.statistic.FloatRangeIndex",
            Self::RangeDouble => "block_index.statistic.DoubleRangeIndex",
            Self::RangeString => "block_index.statistic.StringRangeIndex",
            Self::FullRange => "block_index.statistic.FullRangeIndex",
            Self::Boolean => "block_index.statistic.BooleanIndex",
            Self::Unsupported => "block_index.statistic.UnsupportedIndex",
        }
    }

    /// Parses a verbose identifier.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.identifier() == identifier)
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Identifier to shortcut code table.
///
/// [`IndexType::Unsupported`] is deliberately absent and travels under its
/// full identifier.
const SHORTCUTS: [(IndexType, &str); 9] = [
    (IndexType::RangeByte, "R0"),
    (IndexType::RangeShort, "R1"),
    (IndexType::RangeInt, "R2"),
    (IndexType::RangeLong, "R3"),
    (IndexType::RangeFloat, "R4"),
    (IndexType::RangeDouble, "R5"),
    (IndexType::RangeString, "R6"),
    (IndexType::FullRange, "FR0"),
    (IndexType::Boolean, "BI0"),
];

/// Returns the shortcut code for `identifier`, or `identifier` itself if it has none.
pub fn shortcut(identifier: &str) -> &str {
    SHORTCUTS
        .iter()
        .find(|(t, _)| t.identifier() == identifier)
        .map(|(_, code)| *code)
        .unwrap_or(identifier)
}

/// Returns the identifier for a shortcut `code`, or `code` itself if it is not a shortcut.
pub fn unshortcut(code: &str) -> &str {
    SHORTCUTS
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(t, _)| t.identifier())
        .unwrap_or(code)
}

type Factory = fn() -> StatisticIndex;

static GLOBAL: LazyLock<IndexTypeRegistry> = LazyLock::new(IndexTypeRegistry::new);

/// Resolves type identifiers to fresh statistic instances.
///
/// Factories are fixed at construction. Built prototypes are cached behind a
/// lock because blocks are routinely decoded on several threads at once.
#[derive(Debug)]
pub struct IndexTypeRegistry {
    factories: HashMap<&'static str, (IndexType, Factory)>,
    prototypes: RwLock<HashMap<IndexType, StatisticIndex>>,
}

impl Default for IndexTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexTypeRegistry {
    /// Creates a registry holding every known variant.
    pub fn new() -> Self {
        let table: [(IndexType, Factory); 10] = [
            (IndexType::RangeByte, || RangeIndex::<i8>::empty().into()),
            (IndexType::RangeShort, || RangeIndex::<i16>::empty().into()),
            (IndexType::RangeInt, || RangeIndex::<i32>::empty().into()),
            (IndexType::RangeLong, || RangeIndex::<i64>::empty().into()),
            (IndexType::RangeFloat, || RangeIndex::<f32>::empty().into()),
            (IndexType::RangeDouble, || RangeIndex::<f64>::empty().into()),
            (IndexType::RangeString, || StringRangeIndex::empty().into()),
            (IndexType::FullRange, || FullRangeIndex::default().into()),
            (IndexType::Boolean, || BooleanIndex::default().into()),
            (IndexType::Unsupported, || StatisticIndex::Unsupported),
        ];

        Self {
            factories: table
                .into_iter()
                .map(|(t, factory)| (t.identifier(), (t, factory)))
                .collect(),
            prototypes: Default::default(),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Returns a fresh, empty statistic for a verbose identifier.
    pub fn resolve(&self, identifier: &str) -> Result<StatisticIndex> {
        let (index_type, factory) = self
            .factories
            .get(identifier)
            .copied()
            .ok_or_else(|| UnknownTypeTagSnafu { tag: identifier }.build())?;

        if let Some(prototype) = self.prototypes.read().get(&index_type) {
            return Ok(prototype.clone());
        }

        trace!(%index_type, "building block index prototype");
        let mut prototypes = self.prototypes.write();
        Ok(prototypes.entry(index_type).or_insert_with(factory).clone())
    }

    /// Resolves a wire code, which may be a shortcut or a verbose identifier.
    pub fn resolve_code(&self, code: &str) -> Result<StatisticIndex> {
        self.resolve(unshortcut(code))
    }

    /// Returns a fresh, empty statistic of `index_type`.
    pub fn new_instance(&self, index_type: IndexType) -> StatisticIndex {
        self.resolve(index_type.identifier())
            .expect("every index type is registered")
    }
}

/// Wire code written for a statistic type.
pub(crate) fn wire_code(index_type: IndexType) -> &'static str {
    shortcut(index_type.identifier())
}

impl RangeStatistic {
    /// One-byte tag used inside composite entries.
    pub(crate) fn full_range_tag(&self) -> u8 {
        match self {
            Self::Byte(_) => 0,
            Self::Short(_) => 1,
            Self::Int(_) => 2,
            Self::Long(_) => 3,
            Self::Float(_) => 4,
            Self::Double(_) => 5,
            Self::String(_) => 6,
        }
    }

    /// Empty range statistic for a composite entry tag.
    pub(crate) fn from_full_range_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Byte(RangeIndex::empty()),
            1 => Self::Short(RangeIndex::empty()),
            2 => Self::Int(RangeIndex::empty()),
            3 => Self::Long(RangeIndex::empty()),
            4 => Self::Float(RangeIndex::empty()),
            5 => Self::Double(RangeIndex::empty()),
            6 => Self::String(StringRangeIndex::empty()),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    #[test]
    fn test_shortcut_round_trip() {
        for t in IndexType::ALL {
            let code = shortcut(t.identifier());
            assert_eq!(unshortcut(code), t.identifier());
        }
        assert_eq!(shortcut(IndexType::RangeByte.identifier()), "R0");
        assert_eq!(shortcut(IndexType::RangeString.identifier()), "R6");
        assert_eq!(shortcut(IndexType::FullRange.identifier()), "FR0");
        assert_eq!(shortcut(IndexType::Boolean.identifier()), "BI0");
    }

    #[test]
    fn test_unknown_identifiers_pass_through() {
        assert_eq!(shortcut("some.other.Index"), "some.other.Index");
        assert_eq!(unshortcut("Z9"), "Z9");
        assert_eq!(
            wire_code(IndexType::Unsupported),
            IndexType::Unsupported.identifier()
        );
    }

    #[test]
    fn test_resolve() {
        let registry = IndexTypeRegistry::new();
        for t in IndexType::ALL {
            let statistic = registry.resolve(t.identifier()).unwrap();
            assert_eq!(statistic.index_type(), t);
            assert_eq!(registry.resolve_code(wire_code(t)).unwrap(), statistic);
        }
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = IndexTypeRegistry::new();
        assert_matches!(
            registry.resolve("R9"),
            Err(Error::UnknownTypeTag { tag }) if tag == "R9"
        );
        assert_matches!(
            registry.resolve_code("nope"),
            Err(Error::UnknownTypeTag { .. })
        );
    }

    #[test]
    fn test_instances_are_fresh() {
        let registry = IndexTypeRegistry::new();
        let mut first = registry.new_instance(IndexType::RangeInt);
        assert!(first.merge(&RangeIndex::new(1_i32, 2).into()));
        let second = registry.new_instance(IndexType::RangeInt);
        assert_eq!(second, RangeIndex::<i32>::empty().into());
    }

    #[test]
    fn test_concurrent_resolve() {
        let registry = Arc::new(IndexTypeRegistry::new());
        std::thread::scope(|s| {
            for _ in 0..8 {
                let registry = Arc::clone(&registry);
                s.spawn(move || {
                    for t in IndexType::ALL {
                        assert_eq!(registry.new_instance(t).index_type(), t);
                    }
                });
            }
        });
        assert_eq!(registry.prototypes.read().len(), IndexType::ALL.len());
    }

    #[test]
    fn test_full_range_tags() {
        for tag in 0..=6 {
            let statistic = RangeStatistic::from_full_range_tag(tag).unwrap();
            assert_eq!(statistic.full_range_tag(), tag);
        }
        assert!(RangeStatistic::from_full_range_tag(7).is_none());
    }
}
