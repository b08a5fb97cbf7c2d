//! Shard mappers: the per-shard half of InfluxQL query execution.
//!
//! A mapper binds a [`SelectStatement`] to one [`Shard`]. Opening it takes a
//! snapshot of the shard, resolves the statement's tag sets and builds a
//! cursor per tag set. Each call to [`Mapper::next_chunk`] then returns the
//! next chunk of output, either raw values ([`RawMapper`]) or the partial
//! results of the statement's aggregates for one `GROUP BY time` interval
//! ([`AggregateMapper`]). A reducer merges the chunks of every shard in tag
//! set order.
//!
//! ```text
//!   SeriesCursor ──┐
//!   SeriesCursor ──┼─▶ TagSetCursor ──┐
//!   SeriesCursor ──┘                  ├─▶ RawMapper / AggregateMapper ─▶ chunks
//!                      TagSetCursor ──┘
//! ```
//!
//! Mappers do no work in the background. A caller cancels a query by
//! closing the mapper instead of asking for the next chunk.

pub mod aggregate;
pub mod chunk;
pub mod config;
pub mod functions;
pub mod raw;
pub mod series_cursor;
pub mod tag_set_cursor;
pub mod tag_sets;

pub use aggregate::{AggregateCall, AggregateMapper, Intervals};
pub use chunk::{AggregateChunk, DecodedValue, MapperChunk, RawChunk, RawValue};
pub use config::MapperConfig;
pub use functions::{MapFunc, MapOutput};
pub use raw::RawMapper;
pub use series_cursor::SeriesCursor;
pub use tag_set_cursor::TagSetCursor;

use influxdb3_influxql::SelectStatement;
use influxdb3_shard::Shard;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid source type: {0}")]
    InvalidSource(String),

    #[error("mapper requires exactly one source, found {0}")]
    SourceCount(usize),

    #[error("select statement must include at least one field")]
    NoFields,

    #[error("unknown field or tag name in {clause} clause: {name}")]
    UnknownName { clause: Clause, name: String },

    #[error("can not use field in GROUP BY clause: {0}")]
    GroupByField(String),

    #[error("aggregate call didn't contain a field {0}")]
    AggregateArgument(String),

    #[error("aggregate call {call} must reference a field, {name} is not a field")]
    AggregateNotField { call: String, name: String },

    #[error("function not found: {0}")]
    UnknownFunction(String),

    #[error("function {0} requires an argument")]
    MissingArgument(String),

    #[error(
        "too many points in the group by interval ({count} > {max}). maybe you forgot to specify a where time clause?"
    )]
    TooManyIntervals { count: usize, max: usize },

    #[error(transparent)]
    Query(#[from] influxdb3_influxql::Error),

    #[error(transparent)]
    Shard(#[from] influxdb3_shard::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The clause of a statement a name was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Select,
    Where,
}

impl Display for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Select => "select",
            Self::Where => "where",
        })
    }
}

/// Reads the output of a statement from one shard.
///
/// A mapper is opened once, read with [`next_chunk`](Self::next_chunk) until
/// it returns `None`, and then closed. Reading before opening or after
/// closing is a bug in the caller and panics. Closing is always allowed,
/// including more than once and after a failed open.
pub trait Mapper: Debug + Send {
    type Chunk;

    /// Takes a snapshot of the shard and prepares the tag set cursors.
    ///
    /// A measurement that does not exist in the shard is not an error: the
    /// mapper opens with no tag sets.
    fn open(&mut self) -> Result<()>;

    /// The keys of the tag sets with data, in ascending order.
    fn tag_sets(&self) -> Vec<String>;

    /// The next chunk of output, or `None` once every tag set is exhausted.
    fn next_chunk(&mut self) -> Option<Self::Chunk>;

    /// Releases the shard snapshot.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MapperState {
    Created,
    Opened,
    Closed,
}

impl MapperState {
    pub(crate) fn assert_can_open(self) {
        assert!(
            self == Self::Created,
            "mapper can only be opened once, state is {self:?}"
        );
    }

    pub(crate) fn assert_can_read(self) {
        match self {
            Self::Created => panic!("next_chunk called before open"),
            Self::Closed => panic!("next_chunk called after close"),
            Self::Opened => {}
        }
    }
}

pub(crate) fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// The mapper for a statement: raw values for queries without aggregates and
/// for a derivative over a raw field, aggregates otherwise.
#[derive(Debug)]
pub enum ShardMapper {
    Raw(RawMapper),
    Aggregate(AggregateMapper),
}

impl ShardMapper {
    pub fn new(shard: Arc<Shard>, stmt: SelectStatement, config: MapperConfig) -> Self {
        if (stmt.is_raw_query() && !stmt.has_distinct()) || stmt.is_simple_derivative() {
            Self::Raw(RawMapper::new(shard, stmt, config))
        } else {
            Self::Aggregate(AggregateMapper::new(shard, stmt, config))
        }
    }
}

impl Mapper for ShardMapper {
    type Chunk = MapperChunk;

    fn open(&mut self) -> Result<()> {
        match self {
            Self::Raw(m) => m.open(),
            Self::Aggregate(m) => m.open(),
        }
    }

    fn tag_sets(&self) -> Vec<String> {
        match self {
            Self::Raw(m) => m.tag_sets(),
            Self::Aggregate(m) => m.tag_sets(),
        }
    }

    fn next_chunk(&mut self) -> Option<MapperChunk> {
        match self {
            Self::Raw(m) => m.next_chunk().map(Into::into),
            Self::Aggregate(m) => m.next_chunk().map(Into::into),
        }
    }

    fn close(&mut self) {
        match self {
            Self::Raw(m) => m.close(),
            Self::Aggregate(m) => m.close(),
        }
    }
}
