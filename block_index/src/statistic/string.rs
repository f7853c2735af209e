use std::ops::Bound;

use snafu::ResultExt;

use crate::{
    codec::{BinaryReader, BinaryWriter},
    error::{InvalidUtf16Snafu, MalformedSnafu, Result},
    predicate::{comparison_excludes, range_excludes, NumberOp, Predicate, RangeFilter, StringOp},
};

/// Length prefix written for both bounds of an empty summary.
const EMPTY_LEN: i32 = -1;

/// Inclusive `[min, max]` summary of a string column under `str` ordering.
///
/// Bounds are ordered by code point, not by UTF-16 code unit, even though
/// they are stored as UTF-16. The two orders disagree for characters above
/// U+FFFF against U+E000..=U+FFFF, and a stored summary whose bounds are out
/// of code point order is rejected as malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringRangeIndex {
    bounds: Option<(String, String)>,
}

impl StringRangeIndex {
    /// Creates a summary of `[min, max]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Self {
        let (min, max) = (min.into(), max.into());
        assert!(min <= max, "string range index min ({min:?}) > max ({max:?})");
        Self {
            bounds: Some((min, max)),
        }
    }

    /// A summary that has seen no values.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Summarises `values`.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::empty();
        for v in values {
            index.observe(v.as_ref());
        }
        index
    }

    /// Widens the summary to include `value`.
    pub fn observe(&mut self, value: &str) {
        match &mut self.bounds {
            Some((min, max)) => {
                if value < min.as_str() {
                    *min = value.to_owned();
                } else if value > max.as_str() {
                    *max = value.to_owned();
                }
            }
            None => self.bounds = Some((value.to_owned(), value.to_owned())),
        }
    }

    /// Lower bound, `None` if empty.
    pub fn min(&self) -> Option<&str> {
        self.bounds.as_ref().map(|(min, _)| min.as_str())
    }

    /// Upper bound, `None` if empty.
    pub fn max(&self) -> Option<&str> {
        self.bounds.as_ref().map(|(_, max)| max.as_str())
    }

    /// Returns true if no value has been merged in.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    /// Widens this summary to cover `other`.
    pub fn merge(&mut self, other: &Self) {
        if let Some((min, max)) = &other.bounds {
            self.observe(min);
            self.observe(max);
        }
    }

    /// Returns true when `predicate` provably matches nothing in the summary.
    pub fn can_skip(&self, predicate: &Predicate) -> bool {
        let Some((min, max)) = &self.bounds else {
            // no values: only kinds that need a value to match can be ruled out
            return matches!(
                predicate,
                Predicate::String {
                    op: StringOp::Perfect | StringOp::Forward,
                    ..
                } | Predicate::StringDictionary(_)
                    | Predicate::StringRange(RangeFilter { invert: false, .. })
            );
        };
        let (min, max) = (min.as_str(), max.as_str());

        match predicate {
            Predicate::String {
                op: StringOp::Perfect,
                value,
            } => comparison_excludes(min, max, NumberOp::Equal, value.as_str()),
            Predicate::String {
                op: StringOp::Forward,
                value,
            } => {
                // Any value carrying the prefix sorts at or after it, and everything
                // between the prefix and such a value carries the prefix too.
                let prefix = value.as_str();
                !(min.starts_with(prefix) || (min <= prefix && prefix <= max))
            }
            Predicate::StringRange(filter) => range_excludes(
                min,
                max,
                &RangeFilter {
                    lo: filter.lo.as_str(),
                    lo_inclusive: filter.lo_inclusive,
                    hi: filter.hi.as_str(),
                    hi_inclusive: filter.hi_inclusive,
                    invert: filter.invert,
                },
            ),
            Predicate::StringDictionary(values) => values
                .range::<str, _>((Bound::Included(min), Bound::Included(max)))
                .next()
                .is_none(),
            _ => false,
        }
    }

    /// Encoded size in bytes.
    pub fn binary_size(&self) -> usize {
        let chars = self
            .bounds
            .as_ref()
            .map(|(min, max)| min.encode_utf16().count() + max.encode_utf16().count())
            .unwrap_or_default();
        8 + 2 * chars
    }

    pub(crate) fn write_binary(&self, w: &mut BinaryWriter) {
        let Some((min, max)) = &self.bounds else {
            w.put_i32(EMPTY_LEN);
            w.put_i32(EMPTY_LEN);
            return;
        };

        let min_slot = w.begin_len();
        let max_slot = w.begin_len();
        let min_len = put_utf16(w, min);
        let max_len = put_utf16(w, max);
        w.fill_len(min_slot, min_len);
        w.fill_len(max_slot, max_len);
    }

    pub(crate) fn read_binary(r: &mut BinaryReader<'_>) -> Result<Self> {
        let min_len = r.get_i32()?;
        let max_len = r.get_i32()?;
        if (min_len, max_len) == (EMPTY_LEN, EMPTY_LEN) {
            return Ok(Self::empty());
        }

        let min = get_utf16(r, min_len)?;
        let max = get_utf16(r, max_len)?;
        if min > max {
            return MalformedSnafu {
                reason: format!("string range min {min:?} sorts after max {max:?}"),
            }
            .fail();
        }
        Ok(Self {
            bounds: Some((min, max)),
        })
    }
}

/// Writes `value` as big-endian UTF-16 code units, returning the byte count.
fn put_utf16(w: &mut BinaryWriter, value: &str) -> usize {
    let start = w.len();
    for unit in value.encode_utf16() {
        w.put_slice(&unit.to_be_bytes());
    }
    w.len() - start
}

fn get_utf16(r: &mut BinaryReader<'_>, len: i32) -> Result<String> {
    let len = usize::try_from(len)
        .ok()
        .filter(|len| len % 2 == 0)
        .ok_or_else(|| {
            MalformedSnafu {
                reason: format!("invalid string statistic length {len}"),
            }
            .build()
        })?;
    let units: Vec<u16> = r
        .get_slice(len)?
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).context(InvalidUtf16Snafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn index() -> StringRangeIndex {
        StringRangeIndex::new("10", "20")
    }

    #[test]
    fn test_perfect() {
        assert!(!index().can_skip(&Predicate::perfect("15")));
        assert!(index().can_skip(&Predicate::perfect("09")));
        assert!(!index().can_skip(&Predicate::perfect("10")));
        assert!(!index().can_skip(&Predicate::perfect("20")));
        assert!(index().can_skip(&Predicate::perfect("200")));
    }

    #[test]
    fn test_forward() {
        let index = StringRangeIndex::new("apple", "banana");
        assert!(!index.can_skip(&Predicate::forward("app")));
        assert!(!index.can_skip(&Predicate::forward("b")));
        assert!(!index.can_skip(&Predicate::forward("ba")));
        assert!(!index.can_skip(&Predicate::forward("")));
        assert!(index.can_skip(&Predicate::forward("c")));
        assert!(index.can_skip(&Predicate::forward("aa")));
        assert!(index.can_skip(&Predicate::forward("bb")));
    }

    #[test]
    fn test_unprunable_string_ops() {
        for op in [StringOp::Backward, StringOp::Partial, StringOp::Regexp] {
            let predicate = Predicate::String {
                op,
                value: "zzz".to_owned(),
            };
            assert!(!index().can_skip(&predicate));
        }
        assert!(!index().can_skip(&Predicate::equal(15)));
        assert!(!index().can_skip(&Predicate::IsNull));
    }

    #[test]
    fn test_string_range() {
        assert!(!index().can_skip(&Predicate::string_range("00", true, "10", true)));
        assert!(index().can_skip(&Predicate::string_range("00", true, "10", false)));
        assert!(index().can_skip(&Predicate::string_range("20", false, "30", true)));
        assert!(!index().can_skip(&Predicate::string_range("15", true, "16", true)));
        assert!(!index().can_skip(&Predicate::string_range("00", true, "01", true).inverted()));
    }

    #[test]
    fn test_dictionary() {
        assert!(!index().can_skip(&Predicate::dictionary(["01", "12"])));
        assert!(!index().can_skip(&Predicate::dictionary(["20"])));
        assert!(index().can_skip(&Predicate::dictionary(["01", "21", "3"])));
        assert!(index().can_skip(&Predicate::dictionary(Vec::<String>::new())));
    }

    #[test]
    fn test_empty() {
        let empty = StringRangeIndex::empty();
        assert!(empty.can_skip(&Predicate::perfect("a")));
        assert!(empty.can_skip(&Predicate::dictionary(["a"])));
        assert!(!empty.can_skip(&Predicate::string_range("a", true, "b", true).inverted()));
        assert!(!empty.can_skip(&Predicate::IsNull));

        let mut merged = StringRangeIndex::empty();
        merged.merge(&index());
        assert_eq!(merged, index());
        merged.merge(&StringRangeIndex::empty());
        assert_eq!(merged, index());
    }

    #[test]
    fn test_binary_layout() {
        let mut w = BinaryWriter::default();
        StringRangeIndex::new("a", "bé").write_binary(&mut w);
        let bytes = w.finish();
        assert_eq!(
            bytes.as_ref(),
            &[0, 0, 0, 2, 0, 0, 0, 4, 0, b'a', 0, b'b', 0, 0xe9]
        );
        assert_eq!(StringRangeIndex::new("a", "bé").binary_size(), bytes.len());

        let mut r = BinaryReader::new(&bytes);
        assert_eq!(
            StringRangeIndex::read_binary(&mut r).unwrap(),
            StringRangeIndex::new("a", "bé")
        );
        r.finish("string range").unwrap();
    }

    #[test]
    fn test_empty_binary() {
        let mut w = BinaryWriter::default();
        StringRangeIndex::empty().write_binary(&mut w);
        let bytes = w.finish();
        assert_eq!(bytes.len(), StringRangeIndex::empty().binary_size());

        let mut r = BinaryReader::new(&bytes);
        assert!(StringRangeIndex::read_binary(&mut r).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_binary() {
        let mut r = BinaryReader::new(&[0, 0, 0, 3, 0, 0, 0, 2, 0, 0, 0, 0, 0]);
        assert_matches!(
            StringRangeIndex::read_binary(&mut r),
            Err(Error::Malformed { .. })
        );

        // lone surrogate
        let mut r = BinaryReader::new(&[0, 0, 0, 2, 0, 0, 0, 2, 0xd8, 0, 0, b'a']);
        assert_matches!(
            StringRangeIndex::read_binary(&mut r),
            Err(Error::InvalidUtf16 { .. })
        );

        // min after max
        let mut r = BinaryReader::new(&[0, 0, 0, 2, 0, 0, 0, 2, 0, b'b', 0, b'a']);
        assert_matches!(
            StringRangeIndex::read_binary(&mut r),
            Err(Error::Malformed { .. })
        );

        // U+10000 sorts before U+E000 by UTF-16 code unit but after it by code point
        let mut r = BinaryReader::new(&[
            0, 0, 0, 4, 0, 0, 0, 2, 0xd8, 0x00, 0xdc, 0x00, 0xe0, 0x00,
        ]);
        assert_matches!(
            StringRangeIndex::read_binary(&mut r),
            Err(Error::Malformed { .. })
        );
        let mut w = BinaryWriter::default();
        StringRangeIndex::new("\u{e000}", "\u{10000}").write_binary(&mut w);
        let bytes = w.finish();
        let mut r = BinaryReader::new(&bytes);
        assert_eq!(
            StringRangeIndex::read_binary(&mut r).unwrap(),
            StringRangeIndex::new("\u{e000}", "\u{10000}")
        );
    }

    proptest! {
        #[test]
        fn test_merge_commutative_associative(
            a in prop::collection::vec("[a-c]{0,3}", 1..4),
            b in prop::collection::vec("[a-c]{0,3}", 1..4),
            c in prop::collection::vec("[a-c]{0,3}", 1..4),
        ) {
            let (a, b, c) = (
                StringRangeIndex::from_values(&a),
                StringRangeIndex::from_values(&b),
                StringRangeIndex::from_values(&c),
            );
            let merged = |x: &StringRangeIndex, y: &StringRangeIndex| {
                let mut out = x.clone();
                out.merge(y);
                out
            };
            prop_assert_eq!(merged(&a, &b), merged(&b, &a));
            prop_assert_eq!(merged(&merged(&a, &b), &c), merged(&a, &merged(&b, &c)));
        }

        #[test]
        fn test_prefix_soundness(
            values in prop::collection::vec("[a-c]{0,4}", 1..10),
            prefix in "[a-c]{0,3}",
        ) {
            let index = StringRangeIndex::from_values(&values);
            if index.can_skip(&Predicate::forward(prefix.clone())) {
                prop_assert!(values.iter().all(|v| !v.starts_with(&prefix)));
            }
        }

        #[test]
        fn test_dictionary_soundness(
            values in prop::collection::vec("[a-c]{0,3}", 1..10),
            members in prop::collection::vec("[a-c]{0,3}", 0..5),
        ) {
            let index = StringRangeIndex::from_values(&values);
            if index.can_skip(&Predicate::dictionary(members.clone())) {
                prop_assert!(values.iter().all(|v| !members.contains(v)));
            }
        }
    }
}
