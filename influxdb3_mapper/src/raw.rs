use crate::chunk::{RawChunk, RawValue};
use crate::tag_set_cursor::TagSetCursor;
use crate::tag_sets::{resolve_tag_sets, source_measurement};
use crate::{Error, Mapper, MapperConfig, MapperState, Result, now_nanos};
use influxdb3_influxql::{SelectStatement, TimeRange};
use influxdb3_shard::{Shard, ShardSnapshot};
use std::sync::Arc;
use tracing::debug;

/// Reads the raw values a statement selects from one shard, one tag set at
/// a time in tag set key order.
#[derive(Debug)]
pub struct RawMapper {
    shard: Arc<Shard>,
    stmt: SelectStatement,
    chunk_size: usize,
    state: MapperState,
    snapshot: Option<ShardSnapshot>,
    query_tmin: i64,
    /// Exclusive, one past the query's inclusive maximum.
    query_tmax: i64,
    select_fields: Vec<String>,
    where_fields: Vec<String>,
    cursors: Vec<TagSetCursor>,
    current: usize,
}

impl RawMapper {
    pub fn new(shard: Arc<Shard>, stmt: SelectStatement, config: MapperConfig) -> Self {
        Self {
            shard,
            stmt,
            chunk_size: config.chunk_size,
            state: MapperState::Created,
            snapshot: None,
            query_tmin: 0,
            query_tmax: 0,
            select_fields: vec![],
            where_fields: vec![],
            cursors: vec![],
            current: 0,
        }
    }
}

impl Mapper for RawMapper {
    type Chunk = RawChunk;

    fn open(&mut self) -> Result<()> {
        self.state.assert_can_open();

        let name = source_measurement(&self.stmt)?;
        let (tmin, tmax) =
            TimeRange::from_condition(self.stmt.condition.as_ref())?.as_epoch_nanos(now_nanos());

        let snapshot = self.shard.snapshot()?;
        let mut resolved = None;
        if let Some(measurement) = snapshot.measurement(name) {
            let r = resolve_tag_sets(measurement, &self.stmt)?;
            if r.select_fields.is_empty() {
                return Err(Error::NoFields);
            }

            let mut cursors = TagSetCursor::build(&snapshot, measurement, &r.tag_sets);
            for cursor in &mut cursors {
                cursor.seek_to(tmin);
            }
            resolved = Some((r.select_fields, r.where_fields, cursors));
        }
        let (select_fields, where_fields, cursors) = resolved.unwrap_or_default();

        debug!(
            shard_id = snapshot.shard_id(),
            measurement = name,
            tag_sets = cursors.len(),
            tmin,
            tmax,
            chunk_size = self.chunk_size,
            "opened raw mapper"
        );

        self.query_tmin = tmin;
        self.query_tmax = tmax.saturating_add(1);
        self.select_fields = select_fields;
        self.where_fields = where_fields;
        self.cursors = cursors;
        self.snapshot = Some(snapshot);
        self.state = MapperState::Opened;
        Ok(())
    }

    fn tag_sets(&self) -> Vec<String> {
        self.cursors.iter().map(|c| c.key().to_string()).collect()
    }

    fn next_chunk(&mut self) -> Option<RawChunk> {
        self.state.assert_can_read();

        let mut chunk: Option<RawChunk> = None;
        loop {
            let cursor = self.cursors.get_mut(self.current)?;
            let next = cursor.next(
                self.query_tmin,
                self.query_tmax,
                &self.select_fields,
                &self.where_fields,
            );

            let Some((time, value)) = next else {
                // a chunk never spans two tag sets
                self.current += 1;
                if chunk.is_some() {
                    return chunk;
                }
                continue;
            };

            let pending = chunk.get_or_insert_with(|| RawChunk {
                name: cursor.measurement().to_string(),
                tags: cursor.tags().clone(),
                values: vec![],
            });
            pending.values.push(RawValue { time, value });
            if self.chunk_size > 0 && pending.values.len() >= self.chunk_size {
                return chunk;
            }
        }
    }

    fn close(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            debug!(shard_id = snapshot.shard_id(), "closing raw mapper");
        }
        self.cursors.clear();
        self.state = MapperState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::DecodedValue;
    use influxdb3_influxql::ConditionalExpression as Cond;
    use influxdb3_influxql::{Expr, FieldValue};
    use influxdb3_shard::Point;
    use pretty_assertions::assert_eq;

    fn shard() -> Arc<Shard> {
        let shard = Shard::new(1);
        let points: Vec<_> = (0..5)
            .flat_map(|t| {
                ["a", "b"].map(|host| {
                    Point::new("cpu", t * 10)
                        .with_tag("host", host)
                        .with_field("value", t)
                })
            })
            .collect();
        shard.write_points(&points).unwrap();
        Arc::new(shard)
    }

    fn stmt() -> SelectStatement {
        SelectStatement::new("cpu")
            .with_field(Expr::var("value"))
            .with_condition(Cond::gt_eq(Expr::var("time"), Expr::from(0_i64)))
    }

    fn times(chunk: &RawChunk) -> Vec<i64> {
        chunk.values.iter().map(|v| v.time).collect()
    }

    #[test_log::test]
    fn chunks_are_bounded_and_never_span_tag_sets() {
        let stmt = stmt().with_group_by(influxdb3_influxql::Dimension::Tag("host".into()));
        let mut mapper = RawMapper::new(shard(), stmt, MapperConfig::default().with_chunk_size(3));
        mapper.open().unwrap();
        assert_eq!(mapper.tag_sets(), vec!["cpu|host=a", "cpu|host=b"]);

        let chunks: Vec<_> = std::iter::from_fn(|| mapper.next_chunk()).collect();
        let shape: Vec<_> = chunks
            .iter()
            .map(|c| (c.tags["host"].as_str(), times(c)))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("a", vec![0, 10, 20]),
                ("a", vec![30, 40]),
                ("b", vec![0, 10, 20]),
                ("b", vec![30, 40]),
            ]
        );
        assert_eq!(
            chunks[1].values[1].value,
            DecodedValue::Single(FieldValue::Integer(4))
        );
        mapper.close();
    }

    #[test_log::test]
    fn unbounded_chunk() {
        let mut mapper = RawMapper::new(shard(), stmt(), MapperConfig::default().with_chunk_size(0));
        mapper.open().unwrap();
        let chunk = mapper.next_chunk().unwrap();
        assert_eq!(times(&chunk), vec![0, 0, 10, 10, 20, 20, 30, 30, 40, 40]);
        assert!(chunk.tags.is_empty());
        assert!(mapper.next_chunk().is_none());
    }

    #[test_log::test]
    fn time_bounds_are_inclusive() {
        let stmt = SelectStatement::new("cpu")
            .with_field(Expr::var("value"))
            .with_condition(
                Cond::gt_eq(Expr::var("time"), Expr::from(10_i64))
                    .and(Cond::lt_eq(Expr::var("time"), Expr::from(30_i64)))
                    .and(Cond::eq(Expr::var("host"), Expr::from("a"))),
            );
        let mut mapper = RawMapper::new(shard(), stmt, MapperConfig::default());
        mapper.open().unwrap();
        assert_eq!(times(&mapper.next_chunk().unwrap()), vec![10, 20, 30]);
        assert!(mapper.next_chunk().is_none());
    }

    #[test_log::test]
    fn requires_a_field() {
        let stmt = SelectStatement::new("cpu").with_field(Expr::var("host"));
        let mut mapper = RawMapper::new(shard(), stmt, MapperConfig::default());
        assert_eq!(
            mapper.open().unwrap_err().to_string(),
            "select statement must include at least one field"
        );
        mapper.close();
    }
}
