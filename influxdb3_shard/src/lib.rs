//! An in-memory storage shard and the metadata needed to read it.
//!
//! A [`Shard`] holds persisted, time-sorted ranges of encoded points per
//! series plus a write cache of points that have not been flushed yet. The
//! cache is split into partitions by a hash of the [`SeriesKey`]. Readers
//! never touch the shard directly: they take a [`ShardSnapshot`], which
//! shares the shard's data copy-on-write and therefore never observes writes
//! made after it was taken.
//!
//! Alongside the data, the shard keeps a [`DatabaseIndex`] of measurements,
//! their series, tag keys and field names, and one [`FieldCodec`] per
//! measurement that translates between field values and the encoded bytes
//! stored for each point.

pub mod codec;
pub mod index;
pub mod series;
pub mod shard;

pub use codec::{FieldCodec, FieldDefinition, FieldType};
pub use index::{DatabaseIndex, Measurement, Series, TagSet};
pub use series::{SeriesKey, Tags, tag_set_key};
pub use shard::{Entry, PersistedSeries, Point, Shard, ShardSnapshot};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("shard {0} is closed")]
    ShardClosed(u64),

    #[error("point for measurement {0} has no fields")]
    NoFields(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("field type conflict: {name} is {existing}, got {new}")]
    FieldTypeConflict {
        name: String,
        existing: FieldType,
        new: FieldType,
    },

    #[error("too many fields: a measurement may have at most {max}")]
    TooManyFields { max: usize },

    #[error("string value for field {name} is longer than {max} bytes")]
    StringTooLong { name: String, max: usize },

    #[error("unknown field id {0} in encoded fields")]
    UnknownFieldId(u8),

    #[error("malformed field encoding: {0}")]
    Malformed(#[from] std::io::Error),

    #[error("invalid utf-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
