use crate::{
    codec::{BinaryReader, BinaryWriter},
    error::{InvalidFullRangeEntrySnafu, MalformedSnafu, Result},
    predicate::Predicate,
};

use super::{RangeStatistic, StatisticIndex};

/// Range statistic of one row group ("spread") within a block.
#[derive(Debug, Clone, PartialEq)]
pub struct FullRangeEntry {
    /// Position of the row group the statistic was computed from.
    pub slot: i32,
    /// The row group's summary.
    pub statistic: RangeStatistic,
}

/// Per-row-group range statistics of a block that is a union of row groups.
///
/// Entries are independent of one another, so merging two composites simply
/// appends entries, even when their range variants differ.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullRangeIndex {
    entries: Vec<FullRangeEntry>,
}

impl FullRangeIndex {
    /// Creates a composite from `(slot, statistic)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (i32, RangeStatistic)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(slot, statistic)| FullRangeEntry { slot, statistic })
                .collect(),
        }
    }

    /// Appends the statistic of row group `slot`.
    pub fn push(&mut self, slot: i32, statistic: impl Into<RangeStatistic>) {
        self.entries.push(FullRangeEntry {
            slot,
            statistic: statistic.into(),
        });
    }

    /// Appends a statistic that is only known to be a [`StatisticIndex`].
    ///
    /// Fails unless it is one of the range variants.
    pub fn try_push(&mut self, slot: i32, statistic: StatisticIndex) -> Result<()> {
        match statistic {
            StatisticIndex::Range(statistic) => {
                self.push(slot, statistic);
                Ok(())
            }
            other => InvalidFullRangeEntrySnafu {
                index_type: other.index_type(),
            }
            .fail(),
        }
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[FullRangeEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends all entries of `other`.
    pub fn merge(&mut self, other: &Self) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Slots whose statistic cannot rule out `predicate`, in entry order.
    pub fn evaluate_slots(&self, predicate: &Predicate) -> Vec<i32> {
        self.entries
            .iter()
            .filter(|entry| !entry.statistic.can_skip(predicate))
            .map(|entry| entry.slot)
            .collect()
    }

    /// Returns true when every row group can be skipped.
    pub fn can_skip(&self, predicate: &Predicate) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.statistic.can_skip(predicate))
    }

    /// Encoded size in bytes.
    pub fn binary_size(&self) -> usize {
        4 + self
            .entries
            .iter()
            .map(|entry| 1 + 4 + 4 + entry.statistic.binary_size())
            .sum::<usize>()
    }

    pub(crate) fn write_binary(&self, w: &mut BinaryWriter) {
        w.put_len(self.entries.len());
        for entry in &self.entries {
            w.put_u8(entry.statistic.full_range_tag());
            w.put_i32(entry.slot);
            let slot = w.begin_len();
            entry.statistic.write_binary(w);
            w.end_len(slot);
        }
    }

    pub(crate) fn read_binary(r: &mut BinaryReader<'_>) -> Result<Self> {
        let count = r.get_len()?;
        let mut entries = Vec::with_capacity(count.min(r.remaining() / 9));
        for _ in 0..count {
            let tag = r.get_u8()?;
            let slot = r.get_i32()?;
            let payload = r.get_len_prefixed()?;

            let Some(empty) = RangeStatistic::from_full_range_tag(tag) else {
                return MalformedSnafu {
                    reason: format!("unknown full range entry tag {tag}"),
                }
                .fail();
            };
            let mut payload = BinaryReader::new(payload);
            let statistic = empty.read_same_variant(&mut payload)?;
            payload.finish("full range entry")?;

            entries.push(FullRangeEntry { slot, statistic });
        }
        Ok(Self { entries })
    }
}
