// AOgmaNeo host - error taxonomy

use thiserror::Error;

use crate::desc::IoType;
use crate::helpers::Int3;

/// A descriptor or hyperparameter is outside its legal range.
///
/// `field` is a path such as `io_descs[1].size.z` naming the first offending value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be at least {min} (got {value})")]
    BelowMinimum { field: String, min: i64, value: i64 },

    #[error("{field} must be in [{min}, {max}] (got {value})")]
    OutOfRange {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("{field} must be finite (got {value})")]
    NotFinite { field: String, value: f32 },

    #[error("{field}: ticks_per_update ({ticks_per_update}) exceeds temporal_horizon ({temporal_horizon})")]
    TicksExceedHorizon {
        field: String,
        ticks_per_update: usize,
        temporal_horizon: usize,
    },

    #[error("{field} must not be empty")]
    Empty { field: String },

    #[error("{field} has {actual} entries, expected {expected}")]
    LengthChanged {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("no construction source supplied (need a buffer, a file path or descriptors)")]
    NoSource,
}

impl ValidationError {
    /// The offending field path, if the error names one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::BelowMinimum { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::NotFinite { field, .. }
            | ValidationError::TicksExceedHorizon { field, .. }
            | ValidationError::Empty { field }
            | ValidationError::LengthChanged { field, .. } => Some(field),
            ValidationError::NoSource => None,
        }
    }
}

/// Serialized bytes could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("bad {kind} magic: got {actual:#010x}, expected {expected:#010x}")]
    BadMagic {
        kind: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("unsupported {kind} format version {actual} (supported: {supported})")]
    UnsupportedVersion {
        kind: &'static str,
        supported: u32,
        actual: u32,
    },

    #[error("buffer exhausted: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("buffer overflow: {len} bytes at offset {offset} exceed capacity {capacity}")]
    Overflow {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("{section} section must be exactly {expected} bytes (got {actual})")]
    SectionSize {
        section: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("corrupt {what}: {detail}")]
    Corrupt { what: String, detail: String },
}

/// Per-call input or index does not fit the configured shapes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeMismatchError {
    #[error("expected {expected} input buffers, got {actual}")]
    InputCount { expected: usize, actual: usize },

    #[error("input {index} has {actual} entries, expected {expected}")]
    InputSize {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("input {index} position {position}: value {value} outside [0, {column_size})")]
    InputOutOfRange {
        index: usize,
        position: usize,
        value: i32,
        column_size: i32,
    },

    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("hidden coordinate {pos:?} outside hidden size {size:?}")]
    CoordinateOutOfBounds { pos: Int3, size: Int3 },

    #[error("io {index} is {actual:?}, operation requires {expected:?}")]
    WrongIoType {
        index: usize,
        expected: IoType,
        actual: IoType,
    },

    #[error("activation buffer of length {len} is not a whole number of columns of size {column_size}")]
    ActivationLength { len: usize, column_size: usize },
}

/// Top-level error for every public operation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(#[from] ShapeMismatchError),

    #[error("{kind} is not usable: a previous restore failed")]
    Uninitialized { kind: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: Error = ValidationError::BelowMinimum {
            field: "io_descs[0].size.z".to_string(),
            min: 2,
            value: 1,
        }
        .into();
        assert!(err.to_string().contains("io_descs[0].size.z"));

        let err: Error = FormatError::BadMagic {
            kind: "hierarchy",
            expected: 0x4d474f41,
            actual: 0,
        }
        .into();
        assert!(err.to_string().contains("bad hierarchy magic"));

        let err: Error = ShapeMismatchError::InputCount {
            expected: 2,
            actual: 1,
        }
        .into();
        assert!(err.to_string().contains("expected 2 input buffers"));

        let err = Error::Uninitialized { kind: "searcher" };
        assert!(err.to_string().contains("searcher is not usable"));
    }

    #[test]
    fn test_validation_field() {
        let err = ValidationError::TicksExceedHorizon {
            field: "layer_descs[1]".to_string(),
            ticks_per_update: 4,
            temporal_horizon: 2,
        };
        assert_eq!(err.field(), Some("layer_descs[1]"));
        assert_eq!(ValidationError::NoSource.field(), None);
    }
}
