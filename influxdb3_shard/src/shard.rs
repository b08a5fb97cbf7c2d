use crate::codec::{FieldCodec, FieldType};
use crate::index::{DatabaseIndex, Measurement};
use crate::series::{SeriesKey, Tags};
use crate::{Error, Result};
use bytes::Bytes;
use hashbrown::HashMap;
use influxdb3_influxql::FieldValue;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// The number of write-cache partitions a shard uses unless told otherwise.
pub const DEFAULT_CACHE_PARTITIONS: usize = 8;

/// A timestamp and the encoded fields stored at it.
pub type Entry = (i64, Bytes);

/// The persisted points of one series, keyed by timestamp.
pub type PersistedSeries = Arc<BTreeMap<i64, Bytes>>;

/// A point to write into a shard.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: Tags,
    pub fields: BTreeMap<String, FieldValue>,
    pub time: i64,
}

impl Point {
    pub fn new(measurement: impl Into<String>, time: i64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Tags::new(),
            fields: BTreeMap::new(),
            time,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
struct CachePartition {
    /// Entries per series in write order, which need not be time order.
    series: HashMap<SeriesKey, Vec<Entry>>,
}

/// Everything a snapshot shares with the shard. Each part is replaced
/// copy-on-write, so a snapshot keeps seeing the state it was taken from.
#[derive(Debug)]
struct ShardState {
    persisted: Arc<BTreeMap<SeriesKey, PersistedSeries>>,
    cache: Arc<Vec<CachePartition>>,
    index: Arc<DatabaseIndex>,
    codecs: Arc<HashMap<String, Arc<FieldCodec>>>,
    closed: bool,
}

#[derive(Debug)]
pub struct Shard {
    id: u64,
    state: RwLock<ShardState>,
    open_snapshots: Arc<AtomicUsize>,
}

impl Shard {
    pub fn new(id: u64) -> Self {
        Self::with_cache_partitions(id, DEFAULT_CACHE_PARTITIONS)
    }

    pub fn with_cache_partitions(id: u64, partitions: usize) -> Self {
        let partitions = partitions.max(1);
        Self {
            id,
            state: RwLock::new(ShardState {
                persisted: Default::default(),
                cache: Arc::new(vec![CachePartition::default(); partitions]),
                index: Default::default(),
                codecs: Default::default(),
                closed: false,
            }),
            open_snapshots: Default::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Appends `points` to the write cache, registering any new series and
    /// fields. Points are not validated as a batch: an error leaves the
    /// points before it written.
    pub fn write_points(&self, points: &[Point]) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if state.closed {
            return Err(Error::ShardClosed(self.id));
        }

        for point in points {
            if point.fields.is_empty() {
                return Err(Error::NoFields(point.measurement.clone()));
            }

            let codecs = Arc::make_mut(&mut state.codecs);
            let codec = Arc::make_mut(codecs.entry(point.measurement.clone()).or_default());
            for (name, value) in &point.fields {
                codec.create_field_if_not_exists(name, FieldType::of(value))?;
            }
            let data = codec.encode_fields(&point.fields)?;

            let key = Arc::make_mut(&mut state.index).record_point(
                &point.measurement,
                &point.tags,
                point.fields.keys(),
            );

            let cache = Arc::make_mut(&mut state.cache);
            let partition = key.partition(cache.len());
            cache[partition]
                .series
                .entry(key)
                .or_default()
                .push((point.time, data));
        }
        Ok(())
    }

    /// Moves the write cache into the persisted ranges. A later write to the
    /// same series and timestamp replaces an earlier one.
    pub fn flush(&self) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let partitions = state.cache.len();
        let cache = std::mem::replace(
            &mut state.cache,
            Arc::new(vec![CachePartition::default(); partitions]),
        );

        let persisted = Arc::make_mut(&mut state.persisted);
        let mut points = 0_usize;
        for partition in cache.iter() {
            for (key, entries) in &partition.series {
                let series = Arc::make_mut(persisted.entry(key.clone()).or_default());
                for (time, data) in entries {
                    series.insert(*time, data.clone());
                }
                points += entries.len();
            }
        }
        debug!(shard_id = self.id, points, "flushed write cache");
    }

    /// Takes a read-only snapshot of the shard. The snapshot is released
    /// when it is dropped.
    pub fn snapshot(&self) -> Result<ShardSnapshot> {
        let state = self.state.read();
        if state.closed {
            warn!(shard_id = self.id, "snapshot requested from closed shard");
            return Err(Error::ShardClosed(self.id));
        }

        let open = self.open_snapshots.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(shard_id = self.id, open, "shard snapshot acquired");
        Ok(ShardSnapshot {
            shard_id: self.id,
            persisted: Arc::clone(&state.persisted),
            cache: Arc::clone(&state.cache),
            index: Arc::clone(&state.index),
            codecs: Arc::clone(&state.codecs),
            _guard: SnapshotGuard {
                shard_id: self.id,
                open_snapshots: Arc::clone(&self.open_snapshots),
            },
        })
    }

    /// Closes the shard to new writes and snapshots. Existing snapshots
    /// remain readable.
    pub fn close(&self) {
        self.state.write().closed = true;
    }

    /// The number of snapshots taken and not yet released.
    pub fn open_snapshots(&self) -> usize {
        self.open_snapshots.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct SnapshotGuard {
    shard_id: u64,
    open_snapshots: Arc<AtomicUsize>,
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        let open = self.open_snapshots.fetch_sub(1, Ordering::AcqRel) - 1;
        debug!(shard_id = self.shard_id, open, "shard snapshot released");
    }
}

/// An immutable view of a shard's persisted ranges, write cache, index and
/// codecs at the time it was taken.
#[derive(Debug)]
pub struct ShardSnapshot {
    shard_id: u64,
    persisted: Arc<BTreeMap<SeriesKey, PersistedSeries>>,
    cache: Arc<Vec<CachePartition>>,
    index: Arc<DatabaseIndex>,
    codecs: Arc<HashMap<String, Arc<FieldCodec>>>,
    _guard: SnapshotGuard,
}

impl ShardSnapshot {
    pub fn shard_id(&self) -> u64 {
        self.shard_id
    }

    pub fn index(&self) -> &DatabaseIndex {
        &self.index
    }

    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.index.measurement(name)
    }

    pub fn field_codec(&self, measurement: &str) -> Option<Arc<FieldCodec>> {
        self.codecs.get(measurement).map(Arc::clone)
    }

    /// The persisted range of `key`, if any of its points have been flushed.
    pub fn persisted(&self, key: &SeriesKey) -> Option<PersistedSeries> {
        self.persisted.get(key).map(Arc::clone)
    }

    /// The cached entries of `key` in write order.
    pub fn cached(&self, key: &SeriesKey) -> &[Entry] {
        self.cache[key.partition(self.cache.len())]
            .series
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
