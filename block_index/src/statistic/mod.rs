//! Per-column summaries and the pruning rules evaluated against them.
//!
//! Every evaluation follows one rule: answer [`Decision::Skip`] only when no
//! value the summary could stand for matches the predicate. Anything the
//! summary cannot reason about is answered with [`Decision::MustRead`].

use bytes::Bytes;

use crate::{
    codec::{BinaryReader, BinaryWriter},
    error::Result,
    predicate::{Decision, Predicate},
    registry::{IndexType, IndexTypeRegistry},
};

mod boolean;
mod full_range;
mod range;
mod string;

pub use boolean::BooleanIndex;
pub use full_range::{FullRangeEntry, FullRangeIndex};
pub use range::{RangeElement, RangeIndex};
pub use string::StringRangeIndex;

/// A `[min, max]` summary of one of the orderable column types.
#[derive(Debug, Clone, PartialEq)]
#[expect(missing_docs)]
pub enum RangeStatistic {
    Byte(RangeIndex<i8>),
    Short(RangeIndex<i16>),
    Int(RangeIndex<i32>),
    Long(RangeIndex<i64>),
    Float(RangeIndex<f32>),
    Double(RangeIndex<f64>),
    String(StringRangeIndex),
}

/// Applies `$body` to whichever range summary `$value` holds.
macro_rules! with_range {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            RangeStatistic::Byte($inner) => $body,
            RangeStatistic::Short($inner) => $body,
            RangeStatistic::Int($inner) => $body,
            RangeStatistic::Long($inner) => $body,
            RangeStatistic::Float($inner) => $body,
            RangeStatistic::Double($inner) => $body,
            RangeStatistic::String($inner) => $body,
        }
    };
}

impl RangeStatistic {
    /// The registry type of this summary.
    pub fn index_type(&self) -> IndexType {
        match self {
            Self::Byte(_) => IndexType::RangeByte,
            Self::Short(_) => IndexType::RangeShort,
            Self::Int(_) => IndexType::RangeInt,
            Self::Long(_) => IndexType::RangeLong,
            Self::Float(_) => IndexType::RangeFloat,
            Self::Double(_) => IndexType::RangeDouble,
            Self::String(_) => IndexType::RangeString,
        }
    }

    /// Widens this summary to cover `other`.
    ///
    /// Returns false, leaving `self` untouched, if the variants differ.
    pub fn merge(&mut self, other: &Self) -> bool {
        match (self, other) {
            (Self::Byte(a), Self::Byte(b)) => a.merge(b),
            (Self::Short(a), Self::Short(b)) => a.merge(b),
            (Self::Int(a), Self::Int(b)) => a.merge(b),
            (Self::Long(a), Self::Long(b)) => a.merge(b),
            (Self::Float(a), Self::Float(b)) => a.merge(b),
            (Self::Double(a), Self::Double(b)) => a.merge(b),
            (Self::String(a), Self::String(b)) => a.merge(b),
            _ => return false,
        }
        true
    }

    /// Returns true when `predicate` provably matches nothing in the summary.
    pub fn can_skip(&self, predicate: &Predicate) -> bool {
        with_range!(self, inner => inner.can_skip(predicate))
    }

    /// Encoded size in bytes.
    pub fn binary_size(&self) -> usize {
        with_range!(self, inner => inner.binary_size())
    }

    pub(crate) fn write_binary(&self, w: &mut BinaryWriter) {
        with_range!(self, inner => inner.write_binary(w))
    }

    /// Decodes a summary of the same variant as `self`.
    pub(crate) fn read_same_variant(&self, r: &mut BinaryReader<'_>) -> Result<Self> {
        Ok(match self {
            Self::Byte(_) => Self::Byte(RangeIndex::read_binary(r)?),
            Self::Short(_) => Self::Short(RangeIndex::read_binary(r)?),
            Self::Int(_) => Self::Int(RangeIndex::read_binary(r)?),
            Self::Long(_) => Self::Long(RangeIndex::read_binary(r)?),
            Self::Float(_) => Self::Float(RangeIndex::read_binary(r)?),
            Self::Double(_) => Self::Double(RangeIndex::read_binary(r)?),
            Self::String(_) => Self::String(StringRangeIndex::read_binary(r)?),
        })
    }
}

/// A block-level summary of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum StatisticIndex {
    /// `[min, max]` of an orderable column.
    Range(RangeStatistic),
    /// Presence flags of a boolean column.
    Boolean(BooleanIndex),
    /// Per-row-group ranges of a block built from several row groups.
    FullRange(FullRangeIndex),
    /// No usable summary: never merges, never prunes, encodes to nothing.
    Unsupported,
}

impl StatisticIndex {
    /// The registry type of this statistic.
    pub fn index_type(&self) -> IndexType {
        match self {
            Self::Range(range) => range.index_type(),
            Self::Boolean(_) => IndexType::Boolean,
            Self::FullRange(_) => IndexType::FullRange,
            Self::Unsupported => IndexType::Unsupported,
        }
    }

    /// Merges `other` into `self`.
    ///
    /// Returns false, leaving `self` untouched, if the two are not the same
    /// variant. [`StatisticIndex::Unsupported`] never merges.
    pub fn merge(&mut self, other: &Self) -> bool {
        match (self, other) {
            (Self::Range(a), Self::Range(b)) => a.merge(b),
            (Self::Boolean(a), Self::Boolean(b)) => {
                a.merge(b);
                true
            }
            (Self::FullRange(a), Self::FullRange(b)) => {
                a.merge(b);
                true
            }
            _ => false,
        }
    }

    /// Decides whether data summarised by this statistic can match `predicate`.
    pub fn evaluate(&self, predicate: &Predicate) -> Decision {
        let skip = match self {
            Self::Range(range) => range.can_skip(predicate),
            Self::Boolean(flags) => flags.can_skip(predicate),
            Self::FullRange(composite) => composite.can_skip(predicate),
            Self::Unsupported => false,
        };
        Decision::from_skip(skip)
    }

    /// Row group slots that must be read for `predicate`.
    ///
    /// Returns `None` for statistics that carry no per-slot information, in
    /// which case every row group has to be read.
    pub fn evaluate_slots(&self, predicate: &Predicate) -> Option<Vec<i32>> {
        match self {
            Self::FullRange(composite) => Some(composite.evaluate_slots(predicate)),
            _ => None,
        }
    }

    /// Encoded size in bytes.
    pub fn binary_size(&self) -> usize {
        match self {
            Self::Range(range) => range.binary_size(),
            Self::Boolean(flags) => flags.binary_size(),
            Self::FullRange(composite) => composite.binary_size(),
            Self::Unsupported => 0,
        }
    }

    /// Encodes the statistic payload (without its type tag).
    pub fn to_binary(&self) -> Bytes {
        let mut w = BinaryWriter::with_capacity(self.binary_size());
        self.write_binary(&mut w);
        w.finish()
    }

    pub(crate) fn write_binary(&self, w: &mut BinaryWriter) {
        match self {
            Self::Range(range) => range.write_binary(w),
            Self::Boolean(flags) => flags.write_binary(w),
            Self::FullRange(composite) => composite.write_binary(w),
            Self::Unsupported => {}
        }
    }

    /// Replaces the contents of `self` with the payload in `data`, keeping the variant.
    pub fn set_from_binary(&mut self, data: &[u8]) -> Result<()> {
        let mut r = BinaryReader::new(data);
        *self = match self {
            Self::Range(range) => Self::Range(range.read_same_variant(&mut r)?),
            Self::Boolean(_) => Self::Boolean(BooleanIndex::read_binary(&mut r)?),
            Self::FullRange(_) => Self::FullRange(FullRangeIndex::read_binary(&mut r)?),
            Self::Unsupported => Self::Unsupported,
        };
        r.finish("statistic")
    }

    /// Decodes a payload of a known type.
    pub fn from_binary(index_type: IndexType, data: &[u8]) -> Result<Self> {
        let mut statistic = IndexTypeRegistry::global().new_instance(index_type);
        statistic.set_from_binary(data)?;
        Ok(statistic)
    }
}

impl From<RangeStatistic> for StatisticIndex {
    fn from(value: RangeStatistic) -> Self {
        Self::Range(value)
    }
}

impl From<BooleanIndex> for StatisticIndex {
    fn from(value: BooleanIndex) -> Self {
        Self::Boolean(value)
    }
}

impl From<FullRangeIndex> for StatisticIndex {
    fn from(value: FullRangeIndex) -> Self {
        Self::FullRange(value)
    }
}

macro_rules! range_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for RangeStatistic {
                fn from(value: $t) -> Self {
                    Self::$variant(value)
                }
            }

            impl From<$t> for StatisticIndex {
                fn from(value: $t) -> Self {
                    Self::Range(RangeStatistic::$variant(value))
                }
            }
        )*
    };
}

range_from!(
    RangeIndex<i8> => Byte,
    RangeIndex<i16> => Short,
    RangeIndex<i32> => Int,
    RangeIndex<i64> => Long,
    RangeIndex<f32> => Float,
    RangeIndex<f64> => Double,
    StringRangeIndex => String,
);
