use crate::{
    codec::{BinaryReader, BinaryWriter},
    error::{MalformedSnafu, Result},
    predicate::Predicate,
};

const HAS_TRUE: u8 = 0b001;
const HAS_FALSE: u8 = 0b010;
const HAS_NULL: u8 = 0b100;

/// Presence flags of a boolean column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BooleanIndex {
    has_true: bool,
    has_false: bool,
    has_null: bool,
}

impl BooleanIndex {
    /// Creates a flag set.
    pub fn new(has_true: bool, has_false: bool, has_null: bool) -> Self {
        Self {
            has_true,
            has_false,
            has_null,
        }
    }

    /// Summarises nullable values.
    pub fn from_values(values: impl IntoIterator<Item = Option<bool>>) -> Self {
        let mut index = Self::default();
        for v in values {
            index.observe(v);
        }
        index
    }

    /// Records one value.
    pub fn observe(&mut self, value: Option<bool>) {
        match value {
            Some(true) => self.has_true = true,
            Some(false) => self.has_false = true,
            None => self.has_null = true,
        }
    }

    /// A `true` was seen.
    pub fn has_true(&self) -> bool {
        self.has_true
    }

    /// A `false` was seen.
    pub fn has_false(&self) -> bool {
        self.has_false
    }

    /// A null was seen.
    pub fn has_null(&self) -> bool {
        self.has_null
    }

    /// Unions the flag sets.
    pub fn merge(&mut self, other: &Self) {
        self.has_true |= other.has_true;
        self.has_false |= other.has_false;
        self.has_null |= other.has_null;
    }

    /// Returns true when `predicate` provably matches nothing in the summary.
    pub fn can_skip(&self, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::Boolean(true) => !self.has_true,
            Predicate::Boolean(false) => !self.has_false,
            Predicate::IsNull => !self.has_null,
            Predicate::IsNotNull => !self.has_true && !self.has_false,
            _ => false,
        }
    }

    /// Encoded size in bytes.
    pub fn binary_size(&self) -> usize {
        1
    }

    fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.has_true {
            bits |= HAS_TRUE;
        }
        if self.has_false {
            bits |= HAS_FALSE;
        }
        if self.has_null {
            bits |= HAS_NULL;
        }
        bits
    }

    pub(crate) fn write_binary(&self, w: &mut BinaryWriter) {
        w.put_u8(self.bits());
    }

    pub(crate) fn read_binary(r: &mut BinaryReader<'_>) -> Result<Self> {
        let bits = r.get_u8()?;
        if bits & !(HAS_TRUE | HAS_FALSE | HAS_NULL) != 0 {
            return MalformedSnafu {
                reason: format!("unknown boolean statistic flags {bits:#010b}"),
            }
            .fail();
        }
        Ok(Self::new(
            bits & HAS_TRUE != 0,
            bits & HAS_FALSE != 0,
            bits & HAS_NULL != 0,
        ))
    }
}
