/// The number of raw values a mapper returns per chunk unless configured.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// The default ceiling on the number of `GROUP BY time` intervals a single
/// aggregate query may produce per shard.
pub const DEFAULT_MAX_GROUP_BY_POINTS: usize = 100_000;

/// Tuning for the shard mappers, flattenable into a server command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::Parser)]
pub struct MapperConfig {
    /// The maximum number of values in a raw chunk. Each chunk holds values
    /// of a single tag set, so the last chunk of a tag set may be shorter.
    ///
    /// A value of 0 disables chunking: every tag set is returned in one chunk.
    #[clap(
        long = "mapper-chunk-size",
        env = "INFLUXDB3_MAPPER_CHUNK_SIZE",
        default_value = "1000",
        action
    )]
    pub chunk_size: usize,

    /// The maximum number of intervals an aggregate query may compute. Queries
    /// over a wide time range with a small `GROUP BY time` interval fail to
    /// open once they would exceed this.
    #[clap(
        long = "max-group-by-points",
        env = "INFLUXDB3_MAX_GROUP_BY_POINTS",
        default_value = "100000",
        action
    )]
    pub max_group_by_points: usize,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_group_by_points: DEFAULT_MAX_GROUP_BY_POINTS,
        }
    }
}

impl MapperConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_group_by_points(mut self, max: usize) -> Self {
        self.max_group_by_points = max;
        self
    }
}
