//! A cursor over the points of one series.
//!
//! A series' points live in two places: the persisted range, which holds one
//! value per timestamp in time order, and the write cache, which holds
//! entries in write order. The cursor merges both into a single stream in
//! ascending time order. When both hold a value for the same timestamp the
//! cached value wins, since it was written later.

use bytes::Bytes;
use influxdb3_influxql::ConditionalExpression;
use influxdb3_shard::{Entry, PersistedSeries, SeriesKey, ShardSnapshot};
use std::ops::Bound;

#[derive(Debug)]
pub struct SeriesCursor {
    key: SeriesKey,
    persisted: Option<PersistedSeries>,
    /// Lower bound of the next persisted entry to read.
    persisted_from: Bound<i64>,
    /// A copy of the cached entries, sorted by time with one entry per
    /// timestamp.
    cache: Vec<Entry>,
    cache_pos: usize,
    filter: Option<ConditionalExpression>,
    lookahead: Option<Entry>,
}

impl SeriesCursor {
    pub fn new(
        key: SeriesKey,
        persisted: Option<PersistedSeries>,
        cached: &[Entry],
        filter: Option<ConditionalExpression>,
    ) -> Self {
        Self {
            key,
            persisted,
            persisted_from: Bound::Unbounded,
            cache: sort_last_write_wins(cached),
            cache_pos: 0,
            filter,
            lookahead: None,
        }
    }

    /// Creates a cursor over `key` in `snapshot`, or `None` if the series
    /// has no points in it.
    pub fn from_snapshot(
        snapshot: &ShardSnapshot,
        key: &SeriesKey,
        filter: Option<ConditionalExpression>,
    ) -> Option<Self> {
        let persisted = snapshot.persisted(key);
        let cached = snapshot.cached(key);
        if persisted.is_none() && cached.is_empty() {
            return None;
        }
        Some(Self::new(key.clone(), persisted, cached, filter))
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// The residual `WHERE` filter of this series, if any.
    pub fn predicate(&self) -> Option<&ConditionalExpression> {
        self.filter.as_ref()
    }

    /// Returns the next entry without consuming it.
    pub fn peek(&mut self) -> Option<(i64, &Bytes)> {
        if self.lookahead.is_none() {
            self.lookahead = self.read();
        }
        self.lookahead.as_ref().map(|(t, data)| (*t, data))
    }

    /// Positions the cursor so the next entry is the first at or after `time`.
    pub fn seek_to(&mut self, time: i64) {
        self.lookahead = None;
        self.persisted_from = Bound::Included(time);
        self.cache_pos = self.cache.partition_point(|(t, _)| *t < time);
    }

    fn read(&mut self) -> Option<Entry> {
        let persisted = self.persisted.as_ref().and_then(|p| {
            p.range((self.persisted_from, Bound::Unbounded))
                .next()
                .map(|(t, data)| (*t, data))
        });
        let cached = self.cache.get(self.cache_pos);

        match (persisted, cached) {
            (None, None) => None,
            (Some((t, data)), None) => {
                self.persisted_from = Bound::Excluded(t);
                Some((t, data.clone()))
            }
            (Some((pt, _)), Some((ct, data))) if *ct <= pt => {
                let entry = (*ct, data.clone());
                if *ct == pt {
                    self.persisted_from = Bound::Excluded(pt);
                }
                self.cache_pos += 1;
                Some(entry)
            }
            (Some((t, data)), Some(_)) => {
                self.persisted_from = Bound::Excluded(t);
                Some((t, data.clone()))
            }
            (None, Some(entry)) => {
                let entry = entry.clone();
                self.cache_pos += 1;
                Some(entry)
            }
        }
    }
}

impl Iterator for SeriesCursor {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.lookahead.take().or_else(|| self.read())
    }
}

fn sort_last_write_wins(entries: &[Entry]) -> Vec<Entry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|(t, _)| *t);

    let mut deduped: Vec<Entry> = Vec::with_capacity(sorted.len());
    for entry in sorted {
        match deduped.last_mut() {
            Some(last) if last.0 == entry.0 => *last = entry,
            _ => deduped.push(entry),
        }
    }
    deduped
}
