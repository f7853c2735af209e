//! The filter model statistics are evaluated against.
//!
//! Filters are built by the query layer; this crate only inspects them. Every
//! filter kind a statistic cannot reason about is answered with
//! [`Decision::MustRead`].

use std::collections::BTreeSet;

/// Outcome of evaluating a filter against a statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// A match may exist; the data has to be read.
    MustRead,
    /// No row summarised by the statistic can match.
    Skip,
}

impl Decision {
    pub(crate) fn from_skip(skip: bool) -> Self {
        if skip {
            Self::Skip
        } else {
            Self::MustRead
        }
    }

    /// Returns true for [`Decision::Skip`].
    pub fn is_skip(self) -> bool {
        self == Self::Skip
    }
}

/// A literal a filter compares against.
#[derive(Debug, Clone, PartialEq)]
#[expect(missing_docs)]
pub enum ScalarValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
}

macro_rules! scalar_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for ScalarValue {
                fn from(value: $t) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

scalar_from!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Utf8,
    &str => Utf8,
    bool => Boolean,
);

/// Single-sided comparison of a column against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[expect(missing_docs)]
pub enum NumberOp {
    Equal,
    NotEqual,
    Lt,
    Le,
    Gt,
    Ge,
}

/// String match flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringOp {
    /// Whole value equals the pattern.
    Perfect,
    /// Value starts with the pattern.
    Forward,
    /// Value ends with the pattern.
    Backward,
    /// Value contains the pattern.
    Partial,
    /// Value matches the pattern as a regular expression.
    Regexp,
}

/// Two-sided range with independent bound inclusivity.
///
/// With `invert` set the filter selects values *outside* the range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter<T> {
    /// Lower bound.
    pub lo: T,
    /// Whether `lo` itself matches.
    pub lo_inclusive: bool,
    /// Upper bound.
    pub hi: T,
    /// Whether `hi` itself matches.
    pub hi_inclusive: bool,
    /// Select the complement of the range.
    pub invert: bool,
}

impl<T> RangeFilter<T> {
    /// Non-inverted range.
    pub fn new(lo: T, lo_inclusive: bool, hi: T, hi_inclusive: bool) -> Self {
        Self {
            lo,
            lo_inclusive,
            hi,
            hi_inclusive,
            invert: false,
        }
    }

    /// Returns the complement of this range.
    #[must_use]
    pub fn inverted(self) -> Self {
        Self {
            invert: !self.invert,
            ..self
        }
    }
}

/// A filter bound to a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Comparison against a scalar.
    Number {
        /// Comparison operator.
        op: NumberOp,
        /// Right hand side.
        target: ScalarValue,
    },
    /// Two-sided numeric range.
    NumberRange(RangeFilter<ScalarValue>),
    /// String pattern match.
    String {
        /// Match flavour.
        op: StringOp,
        /// Pattern.
        value: String,
    },
    /// Two-sided range under string ordering.
    StringRange(RangeFilter<String>),
    /// Value is one of a set of strings.
    StringDictionary(BTreeSet<String>),
    /// Value equals the given boolean.
    Boolean(bool),
    /// Value is null.
    IsNull,
    /// Value is not null.
    IsNotNull,
}

impl Predicate {
    /// `column = target`
    pub fn equal(target: impl Into<ScalarValue>) -> Self {
        Self::number(NumberOp::Equal, target)
    }

    /// `column != target`
    pub fn not_equal(target: impl Into<ScalarValue>) -> Self {
        Self::number(NumberOp::NotEqual, target)
    }

    /// `column < target`
    pub fn lt(target: impl Into<ScalarValue>) -> Self {
        Self::number(NumberOp::Lt, target)
    }

    /// `column <= target`
    pub fn le(target: impl Into<ScalarValue>) -> Self {
        Self::number(NumberOp::Le, target)
    }

    /// `column > target`
    pub fn gt(target: impl Into<ScalarValue>) -> Self {
        Self::number(NumberOp::Gt, target)
    }

    /// `column >= target`
    pub fn ge(target: impl Into<ScalarValue>) -> Self {
        Self::number(NumberOp::Ge, target)
    }

    fn number(op: NumberOp, target: impl Into<ScalarValue>) -> Self {
        Self::Number {
            op,
            target: target.into(),
        }
    }

    /// Numeric range, see [`RangeFilter`].
    pub fn number_range(
        lo: impl Into<ScalarValue>,
        lo_inclusive: bool,
        hi: impl Into<ScalarValue>,
        hi_inclusive: bool,
    ) -> Self {
        Self::NumberRange(RangeFilter::new(
            lo.into(),
            lo_inclusive,
            hi.into(),
            hi_inclusive,
        ))
    }

    /// Exact string match.
    pub fn perfect(value: impl Into<String>) -> Self {
        Self::String {
            op: StringOp::Perfect,
            value: value.into(),
        }
    }

    /// Prefix match.
    pub fn forward(prefix: impl Into<String>) -> Self {
        Self::String {
            op: StringOp::Forward,
            value: prefix.into(),
        }
    }

    /// String range, see [`RangeFilter`].
    pub fn string_range(
        lo: impl Into<String>,
        lo_inclusive: bool,
        hi: impl Into<String>,
        hi_inclusive: bool,
    ) -> Self {
        Self::StringRange(RangeFilter::new(
            lo.into(),
            lo_inclusive,
            hi.into(),
            hi_inclusive,
        ))
    }

    /// Set membership.
    pub fn dictionary<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::StringDictionary(values.into_iter().map(Into::into).collect())
    }

    /// Inverts a range filter; other kinds are returned unchanged.
    #[must_use]
    pub fn inverted(self) -> Self {
        match self {
            Self::NumberRange(f) => Self::NumberRange(f.inverted()),
            Self::StringRange(f) => Self::StringRange(f.inverted()),
            other => other,
        }
    }
}

/// Returns true when no value in `[min, max]` can satisfy `value <op> target`.
pub(crate) fn comparison_excludes<T>(min: &T, max: &T, op: NumberOp, target: &T) -> bool
where
    T: PartialOrd + ?Sized,
{
    match op {
        NumberOp::Equal => target < min || target > max,
        NumberOp::NotEqual => false,
        NumberOp::Lt => target <= min,
        NumberOp::Le => target < min,
        NumberOp::Gt => target >= max,
        NumberOp::Ge => target > max,
    }
}

/// Returns true when `[min, max]` and the filter range cannot intersect.
///
/// An inverted filter never excludes: its complement may lie on either side
/// of a single contiguous summary.
pub(crate) fn range_excludes<T>(min: &T, max: &T, filter: &RangeFilter<&T>) -> bool
where
    T: PartialOrd + ?Sized,
{
    if filter.invert {
        return false;
    }

    let above = if filter.hi_inclusive {
        filter.hi < min
    } else {
        filter.hi <= min
    };
    let below = if filter.lo_inclusive {
        max < filter.lo
    } else {
        max <= filter.lo
    };
    above || below
}
