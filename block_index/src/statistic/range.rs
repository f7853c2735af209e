use std::{cmp::Ordering, fmt::Debug};

use bytes::{Buf, BufMut, BytesMut};

use crate::{
    codec::{BinaryReader, BinaryWriter},
    error::Result,
    predicate::{comparison_excludes, range_excludes, Predicate, RangeFilter, ScalarValue},
};

/// Element types a [`RangeIndex`] can summarise.
pub trait RangeElement: Copy + PartialOrd + Debug + Send + Sync + 'static {
    /// Initial `min` of an empty summary.
    const EMPTY_MIN: Self;
    /// Initial `max` of an empty summary.
    const EMPTY_MAX: Self;
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// The smaller of two values, ignoring NaN.
    fn lesser(self, other: Self) -> Self;

    /// The larger of two values, ignoring NaN.
    fn greater(self, other: Self) -> Self;

    /// Converts a filter literal, returning `None` unless the conversion is exact.
    fn from_scalar(value: &ScalarValue) -> Option<Self>;

    /// Appends the big-endian encoding.
    fn put(self, buf: &mut BytesMut);

    /// Decodes from exactly [`Self::WIDTH`] bytes.
    fn get(buf: &[u8]) -> Self;
}

/// Largest magnitude below which every `f64` with no fraction is an exact `i64`.
const I64_EXCLUSIVE_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn exact_i64(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && (-I64_EXCLUSIVE_BOUND..I64_EXCLUSIVE_BOUND).contains(&value))
        .then_some(value as i64)
}

fn scalar_as_i64(value: &ScalarValue) -> Option<i64> {
    match value {
        ScalarValue::Int8(v) => Some((*v).into()),
        ScalarValue::Int16(v) => Some((*v).into()),
        ScalarValue::Int32(v) => Some((*v).into()),
        ScalarValue::Int64(v) => Some(*v),
        ScalarValue::Float32(v) => exact_i64((*v).into()),
        ScalarValue::Float64(v) => exact_i64(*v),
        ScalarValue::Utf8(_) | ScalarValue::Boolean(_) => None,
    }
}

macro_rules! int_element {
    ($t:ty, $put:ident, $get:ident) => {
        impl RangeElement for $t {
            const EMPTY_MIN: Self = <$t>::MAX;
            const EMPTY_MAX: Self = <$t>::MIN;
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn lesser(self, other: Self) -> Self {
                Ord::min(self, other)
            }

            fn greater(self, other: Self) -> Self {
                Ord::max(self, other)
            }

            fn from_scalar(value: &ScalarValue) -> Option<Self> {
                scalar_as_i64(value).and_then(|v| Self::try_from(v).ok())
            }

            fn put(self, buf: &mut BytesMut) {
                buf.$put(self);
            }

            fn get(mut buf: &[u8]) -> Self {
                buf.$get()
            }
        }
    };
}

int_element!(i8, put_i8, get_i8);
int_element!(i16, put_i16, get_i16);
int_element!(i32, put_i32, get_i32);
int_element!(i64, put_i64, get_i64);

impl RangeElement for f32 {
    const EMPTY_MIN: Self = Self::INFINITY;
    const EMPTY_MAX: Self = Self::NEG_INFINITY;
    const WIDTH: usize = 4;

    fn lesser(self, other: Self) -> Self {
        self.min(other)
    }

    fn greater(self, other: Self) -> Self {
        self.max(other)
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Float32(v) => (!v.is_nan()).then_some(*v),
            ScalarValue::Float64(v) => {
                let narrowed = *v as Self;
                (f64::from(narrowed) == *v).then_some(narrowed)
            }
            other => {
                let v = scalar_as_i64(other)?;
                let narrowed = v as Self;
                (exact_i64(narrowed.into()) == Some(v)).then_some(narrowed)
            }
        }
    }

    fn put(self, buf: &mut BytesMut) {
        buf.put_f32(self);
    }

    fn get(mut buf: &[u8]) -> Self {
        buf.get_f32()
    }
}

impl RangeElement for f64 {
    const EMPTY_MIN: Self = Self::INFINITY;
    const EMPTY_MAX: Self = Self::NEG_INFINITY;
    const WIDTH: usize = 8;

    fn lesser(self, other: Self) -> Self {
        self.min(other)
    }

    fn greater(self, other: Self) -> Self {
        self.max(other)
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Float32(v) => (!v.is_nan()).then_some((*v).into()),
            ScalarValue::Float64(v) => (!v.is_nan()).then_some(*v),
            other => {
                let v = scalar_as_i64(other)?;
                let widened = v as Self;
                (exact_i64(widened) == Some(v)).then_some(widened)
            }
        }
    }

    fn put(self, buf: &mut BytesMut) {
        buf.put_f64(self);
    }

    fn get(mut buf: &[u8]) -> Self {
        buf.get_f64()
    }
}

/// Inclusive `[min, max]` summary of a numeric column.
///
/// An empty summary holds `min = EMPTY_MIN` and `max = EMPTY_MAX`, so the
/// first merge or observed value always widens it correctly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeIndex<T> {
    min: T,
    max: T,
}

impl<T: RangeElement> Default for RangeIndex<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: RangeElement> RangeIndex<T> {
    /// Creates a summary of `[min, max]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn new(min: T, max: T) -> Self {
        assert!(
            min.partial_cmp(&max) != Some(Ordering::Greater),
            "range index min ({min:?}) > max ({max:?})"
        );
        Self { min, max }
    }

    /// A summary that has seen no values.
    pub fn empty() -> Self {
        Self {
            min: T::EMPTY_MIN,
            max: T::EMPTY_MAX,
        }
    }

    /// Summarises `values`, ignoring NaN.
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        let mut index = Self::empty();
        for v in values {
            index.observe(v);
        }
        index
    }

    /// Widens the summary to include `value`.
    pub fn observe(&mut self, value: T) {
        self.min = self.min.lesser(value);
        self.max = self.max.greater(value);
    }

    /// Lower bound.
    pub fn min(&self) -> T {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> T {
        self.max
    }

    /// Returns true if no value has been merged in.
    pub fn is_empty(&self) -> bool {
        !matches!(
            self.min.partial_cmp(&self.max),
            Some(Ordering::Less | Ordering::Equal)
        )
    }

    /// Widens this summary to cover `other`.
    pub fn merge(&mut self, other: &Self) {
        self.min = self.min.lesser(other.min);
        self.max = self.max.greater(other.max);
    }

    /// Returns true when `predicate` provably matches nothing in the summary.
    pub fn can_skip(&self, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::Number { op, target } => T::from_scalar(target)
                .is_some_and(|t| comparison_excludes(&self.min, &self.max, *op, &t)),
            Predicate::NumberRange(filter) => {
                let (Some(lo), Some(hi)) = (T::from_scalar(&filter.lo), T::from_scalar(&filter.hi))
                else {
                    return false;
                };
                range_excludes(
                    &self.min,
                    &self.max,
                    &RangeFilter {
                        lo: &lo,
                        lo_inclusive: filter.lo_inclusive,
                        hi: &hi,
                        hi_inclusive: filter.hi_inclusive,
                        invert: filter.invert,
                    },
                )
            }
            _ => false,
        }
    }

    /// Encoded size in bytes.
    pub fn binary_size(&self) -> usize {
        2 * T::WIDTH
    }

    pub(crate) fn write_binary(&self, w: &mut BinaryWriter) {
        self.min.put(w.buf_mut());
        self.max.put(w.buf_mut());
    }

    pub(crate) fn read_binary(r: &mut BinaryReader<'_>) -> Result<Self> {
        let min = T::get(r.get_slice(T::WIDTH)?);
        let max = T::get(r.get_slice(T::WIDTH)?);
        Ok(Self { min, max })
    }
}
