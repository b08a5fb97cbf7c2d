//! The aggregate mapper: evaluates the map side of a statement's aggregates
//! over each `GROUP BY time` interval of each tag set.

use crate::chunk::{AggregateChunk, DecodedValue};
use crate::functions::MapFunc;
use crate::tag_set_cursor::TagSetCursor;
use crate::tag_sets::{resolve_tag_sets, source_measurement};
use crate::{Error, Mapper, MapperConfig, MapperState, Result, now_nanos};
use influxdb3_influxql::walk::walk_top_level_calls;
use influxdb3_influxql::{Call, Expr, FieldValue, SelectStatement, TimeRange};
use influxdb3_shard::{Shard, ShardSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The `GROUP BY time` intervals of a query.
///
/// Intervals are aligned to multiples of their size, so the first one may
/// start before the query's minimum time. `OFFSET` skips whole intervals
/// and `LIMIT` caps how many are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub size: i64,
    /// The aligned start of the first interval, before any offset.
    pub window_start: i64,
    /// The number of intervals to produce.
    pub count: usize,
    pub offset: usize,
    query_tmax: i64,
}

impl Intervals {
    /// Computes the intervals covering the inclusive range `[tmin, tmax]`.
    ///
    /// Without an interval, or when the range is a single instant, the whole
    /// range is one interval starting at `tmin`. Fails if more than
    /// `max_intervals` intervals would be produced.
    pub fn compute(
        tmin: i64,
        tmax: i64,
        interval: Option<Duration>,
        limit: Option<u64>,
        offset: Option<u64>,
        max_intervals: usize,
    ) -> Result<Self> {
        let (min, max) = (i128::from(tmin), i128::from(tmax));
        let (size, window_start, total) = match interval {
            Some(interval) if tmax != tmin => {
                let size = i128::try_from(interval.as_nanos())
                    .unwrap_or(i128::MAX)
                    .min(i128::from(i64::MAX));
                let bottom = min.div_euclid(size) * size;
                let top = max.div_euclid(size) * size + size;
                let total = if max < min { 0 } else { (top - bottom) / size };
                (size, bottom, total)
            }
            _ => {
                let size = (max - min + 1).max(1);
                (size, min, i128::from(max >= min))
            }
        };

        let total = usize::try_from(total).unwrap_or(usize::MAX);
        let offset = to_usize(offset.unwrap_or(0));
        let mut count = total.saturating_sub(offset);
        if let Some(limit) = limit.filter(|l| *l > 0) {
            count = count.min(to_usize(limit));
        }
        if count > max_intervals {
            return Err(Error::TooManyIntervals {
                count,
                max: max_intervals,
            });
        }

        Ok(Self {
            size: i64::try_from(size).unwrap_or(i64::MAX),
            window_start: i64::try_from(window_start).unwrap_or(i64::MIN),
            count,
            offset,
            query_tmax: tmax,
        })
    }

    /// The start of the `n`th interval, or `None` once `n` is past the last
    /// interval or the interval would start after the query's maximum time.
    pub fn start(&self, n: usize) -> Option<i64> {
        if n >= self.count {
            return None;
        }
        let n = i64::try_from(n.checked_add(self.offset)?).ok()?;
        let start = self.window_start.checked_add(n.checked_mul(self.size)?)?;
        (start <= self.query_tmax).then_some(start)
    }

    /// The exclusive end of the interval starting at `start`, which never
    /// extends past the query's maximum time.
    pub fn end(&self, start: i64) -> i64 {
        start
            .saturating_add(self.size)
            .min(self.query_tmax.saturating_add(1))
    }
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// An aggregate of the statement and the field it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCall {
    pub func: MapFunc,
    pub field: String,
}

impl AggregateCall {
    pub fn resolve(call: &Call) -> Result<Self> {
        Ok(Self {
            func: MapFunc::from_call(call)?,
            field: aggregate_field(call)?,
        })
    }
}

/// Resolves the aggregates of a statement in SELECT order, each paired with
/// its text for error messages. A bare `DISTINCT f` projection is the
/// `distinct` aggregate of `f`.
fn statement_aggregates(stmt: &SelectStatement) -> Result<Vec<(String, AggregateCall)>> {
    let mut aggregates = vec![];
    for field in &stmt.fields {
        if let Expr::Distinct(name) = &field.expr {
            aggregates.push((
                field.expr.to_string(),
                AggregateCall {
                    func: MapFunc::Distinct,
                    field: name.clone(),
                },
            ));
            continue;
        }

        let mut calls = vec![];
        walk_top_level_calls(&field.expr, &mut |c| calls.push(c));
        for call in calls {
            aggregates.push((call.to_string(), AggregateCall::resolve(call)?));
        }
    }
    Ok(aggregates)
}

/// Finds the field an aggregate reads, looking through one nested call as in
/// `derivative(mean(value))`. `DISTINCT` is only accepted under `count`.
fn aggregate_field(call: &Call) -> Result<String> {
    let not_a_field = || Error::AggregateArgument(call.to_string());

    let nested = match call.args.first() {
        Some(Expr::Call(nested)) => nested,
        _ => call,
    };
    match nested.args.first() {
        Some(Expr::Distinct(name)) if call.name == "count" => Ok(name.clone()),
        Some(arg) => arg
            .var_ref_name()
            .map(str::to_string)
            .ok_or_else(not_a_field),
        None => Err(not_a_field()),
    }
}

/// The values of one field of a tag set within one interval.
#[derive(Debug)]
struct IntervalValues<'a> {
    cursor: &'a mut TagSetCursor,
    tmin: i64,
    tmax: i64,
    field: &'a [String],
    where_fields: &'a [String],
}

impl Iterator for IntervalValues<'_> {
    type Item = (i64, FieldValue);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (time, value) =
                self.cursor
                    .next(self.tmin, self.tmax, self.field, self.where_fields)?;
            if let DecodedValue::Single(value) = value {
                return Some((time, value));
            }
        }
    }
}

/// Produces one [`AggregateChunk`] per interval per tag set, with tag sets
/// in key order and intervals in time order within each.
#[derive(Debug)]
pub struct AggregateMapper {
    shard: Arc<Shard>,
    stmt: SelectStatement,
    max_intervals: usize,
    state: MapperState,
    snapshot: Option<ShardSnapshot>,
    calls: Vec<AggregateCall>,
    intervals: Option<Intervals>,
    query_tmin: i64,
    where_fields: Vec<String>,
    cursors: Vec<TagSetCursor>,
    current: usize,
    interval: usize,
}

impl AggregateMapper {
    pub fn new(shard: Arc<Shard>, stmt: SelectStatement, config: MapperConfig) -> Self {
        Self {
            shard,
            stmt,
            max_intervals: config.max_group_by_points,
            state: MapperState::Created,
            snapshot: None,
            calls: vec![],
            intervals: None,
            query_tmin: 0,
            where_fields: vec![],
            cursors: vec![],
            current: 0,
            interval: 0,
        }
    }

    /// The intervals computed by [`Mapper::open`].
    pub fn intervals(&self) -> Option<&Intervals> {
        self.intervals.as_ref()
    }
}

impl Mapper for AggregateMapper {
    type Chunk = AggregateChunk;

    fn open(&mut self) -> Result<()> {
        self.state.assert_can_open();

        let aggregates = statement_aggregates(&self.stmt)?;
        let (tmin, tmax) =
            TimeRange::from_condition(self.stmt.condition.as_ref())?.as_epoch_nanos(now_nanos());
        let intervals = Intervals::compute(
            tmin,
            tmax,
            self.stmt.dimensions()?.interval,
            self.stmt.limit,
            self.stmt.offset,
            self.max_intervals,
        )?;
        let name = source_measurement(&self.stmt)?;

        let snapshot = self.shard.snapshot()?;
        let (cursors, where_fields) = match snapshot.measurement(name) {
            Some(measurement) => {
                let resolved = resolve_tag_sets(measurement, &self.stmt)?;
                for (text, call) in &aggregates {
                    if !measurement.has_field(&call.field) {
                        return Err(Error::AggregateNotField {
                            call: text.clone(),
                            name: call.field.clone(),
                        });
                    }
                }
                (
                    TagSetCursor::build(&snapshot, measurement, &resolved.tag_sets),
                    resolved.where_fields,
                )
            }
            None => (vec![], vec![]),
        };

        let calls: Vec<_> = aggregates.into_iter().map(|(_, call)| call).collect();
        debug!(
            shard_id = snapshot.shard_id(),
            measurement = name,
            tag_sets = cursors.len(),
            aggregates = calls.len(),
            interval_size = intervals.size,
            intervals = intervals.count,
            window_start = intervals.window_start,
            "opened aggregate mapper"
        );

        self.calls = calls;
        self.intervals = Some(intervals);
        self.query_tmin = tmin;
        self.where_fields = where_fields;
        self.cursors = cursors;
        self.snapshot = Some(snapshot);
        self.state = MapperState::Opened;
        Ok(())
    }

    fn tag_sets(&self) -> Vec<String> {
        self.cursors.iter().map(|c| c.key().to_string()).collect()
    }

    fn next_chunk(&mut self) -> Option<AggregateChunk> {
        self.state.assert_can_read();
        let intervals = self.intervals?;

        loop {
            let cursor = self.cursors.get_mut(self.current)?;
            let Some(start) = intervals.start(self.interval) else {
                self.interval = 0;
                self.current += 1;
                continue;
            };
            self.interval += 1;

            // intervals are aligned, so the first may start before the query
            let tmin = start.max(self.query_tmin);
            let tmax = intervals.end(start);
            let where_fields = &self.where_fields;
            let values = self
                .calls
                .iter()
                .map(|call| {
                    cursor.seek_to(tmin);
                    call.func.map(IntervalValues {
                        cursor: &mut *cursor,
                        tmin,
                        tmax,
                        field: std::slice::from_ref(&call.field),
                        where_fields,
                    })
                })
                .collect();

            return Some(AggregateChunk {
                name: cursor.measurement().to_string(),
                tags: cursor.tags().clone(),
                time: start,
                values,
            });
        }
    }

    fn close(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            debug!(shard_id = snapshot.shard_id(), "closing aggregate mapper");
        }
        self.cursors.clear();
        self.state = MapperState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HOUR: i64 = 3_600_000_000_000;

    fn intervals(tmin: i64, tmax: i64, size: Option<i64>) -> Intervals {
        Intervals::compute(
            tmin,
            tmax,
            size.map(|s| Duration::from_nanos(s as u64)),
            None,
            None,
            usize::MAX,
        )
        .unwrap()
    }

    fn starts(intervals: &Intervals) -> Vec<i64> {
        (0..).map_while(|n| intervals.start(n)).collect()
    }

    #[test]
    fn aligned_intervals() {
        let i = intervals(0, 19, Some(10));
        assert_eq!((i.size, i.window_start, i.count), (10, 0, 2));
        assert_eq!(starts(&i), vec![0, 10]);
        assert_eq!(i.end(10), 20);

        let i = intervals(0, 3 * HOUR - 1, Some(HOUR));
        assert_eq!(starts(&i), vec![0, HOUR, 2 * HOUR]);
    }

    #[test]
    fn window_is_floor_aligned() {
        let i = intervals(HOUR + 5, 2 * HOUR + 5, Some(HOUR));
        assert_eq!(starts(&i), vec![HOUR, 2 * HOUR]);
        // the last interval ends at the query maximum
        assert_eq!(i.end(2 * HOUR), 2 * HOUR + 6);

        let i = intervals(-5, 4, Some(10));
        assert_eq!(starts(&i), vec![-10, 0]);
    }

    #[test]
    fn single_interval() {
        let i = intervals(5, 9, None);
        assert_eq!((i.size, i.window_start, i.count), (5, 5, 1));
        assert_eq!(starts(&i), vec![5]);
        assert_eq!(i.end(5), 10);

        // a single instant with GROUP BY time is one interval too
        let i = intervals(7, 7, Some(10));
        assert_eq!((i.size, i.count), (1, 1));
        assert_eq!(starts(&i), vec![7]);

        let i = intervals(0, i64::MAX, None);
        assert_eq!(starts(&i), vec![0]);
    }

    #[test]
    fn empty_range() {
        assert_eq!(intervals(10, 5, Some(10)).count, 0);
        assert_eq!(intervals(10, 5, None).count, 0);
    }

    #[test]
    fn limit_and_offset() {
        let compute = |limit, offset| {
            Intervals::compute(
                0,
                99,
                Some(Duration::from_nanos(10)),
                limit,
                offset,
                usize::MAX,
            )
            .unwrap()
        };
        assert_eq!(starts(&compute(Some(4), Some(3))), vec![30, 40, 50, 60]);
        assert_eq!(starts(&compute(None, Some(8))), vec![80, 90]);
        assert_eq!(starts(&compute(Some(0), None)).len(), 10);
        assert!(starts(&compute(None, Some(11))).is_empty());
    }

    #[test]
    fn interval_ceiling() {
        let err = Intervals::compute(0, 99, Some(Duration::from_nanos(10)), None, None, 5)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "too many points in the group by interval (10 > 5). maybe you forgot to specify a where time clause?"
        );

        // the limit applies before the ceiling
        Intervals::compute(0, 99, Some(Duration::from_nanos(10)), Some(5), None, 5).unwrap();
    }

    fn call(expr: Expr) -> Call {
        match expr {
            Expr::Call(c) => c,
            _ => unreachable!(),
        }
    }

    #[test]
    fn aggregate_fields() {
        let resolve = |e| AggregateCall::resolve(&call(e));
        assert_eq!(
            resolve(Expr::call("mean", vec![Expr::var("value")])).unwrap(),
            AggregateCall {
                func: MapFunc::Mean,
                field: "value".into()
            }
        );
        assert_eq!(
            resolve(Expr::call(
                "derivative",
                vec![
                    Expr::call("max", vec![Expr::var("value")]),
                    Expr::Literal(influxdb3_influxql::Literal::Duration(
                        Duration::from_secs(1)
                    )),
                ]
            ))
            .unwrap(),
            AggregateCall {
                func: MapFunc::Max,
                field: "value".into()
            }
        );
        assert_eq!(
            resolve(Expr::call("count", vec![Expr::distinct("host")]))
                .unwrap()
                .field,
            "host"
        );
        assert_eq!(
            resolve(Expr::call(
                "count",
                vec![Expr::call("distinct", vec![Expr::var("value")])]
            ))
            .unwrap(),
            AggregateCall {
                func: MapFunc::CountDistinct,
                field: "value".into()
            }
        );
    }

    #[test]
    fn malformed_aggregates() {
        let resolve = |e| AggregateCall::resolve(&call(e));
        let err = resolve(Expr::call("sum", vec![Expr::distinct("value")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "aggregate call didn't contain a field sum(DISTINCT value)"
        );
        assert!(matches!(
            resolve(Expr::call("mean", vec![Expr::from(1_i64)])),
            Err(Error::AggregateArgument(_))
        ));
        assert!(matches!(
            resolve(Expr::call(
                "derivative",
                vec![Expr::call("mean", vec![Expr::call("max", vec![Expr::var("v")])])]
            )),
            Err(Error::AggregateArgument(_))
        ));
    }

    #[test]
    fn bare_distinct_is_an_aggregate_in_select_order() {
        let stmt = SelectStatement::new("cpu")
            .with_field(Expr::call("count", vec![Expr::var("value")]))
            .with_field(Expr::distinct("value"))
            .with_field(Expr::call("max", vec![Expr::var("idle")]));
        let aggregates = statement_aggregates(&stmt).unwrap();
        assert_eq!(
            aggregates,
            vec![
                (
                    "count(value)".to_string(),
                    AggregateCall {
                        func: MapFunc::Count,
                        field: "value".into()
                    }
                ),
                (
                    "DISTINCT value".to_string(),
                    AggregateCall {
                        func: MapFunc::Distinct,
                        field: "value".into()
                    }
                ),
                (
                    "max(idle)".to_string(),
                    AggregateCall {
                        func: MapFunc::Max,
                        field: "idle".into()
                    }
                ),
            ]
        );
    }
}
