//! A cursor merging the series of one tag set.

use crate::chunk::DecodedValue;
use crate::series_cursor::SeriesCursor;
use influxdb3_influxql::{ConditionalExpression, FieldValue, matches_where};
use influxdb3_shard::{FieldCodec, Measurement, ShardSnapshot, TagSet, Tags};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Reads the points of every series in a tag set as one stream in time
/// order, decoding the selected fields and applying each series' filter.
#[derive(Debug)]
pub struct TagSetCursor {
    measurement: String,
    tags: Tags,
    key: String,
    cursors: Vec<SeriesCursor>,
    codec: Arc<FieldCodec>,
}

impl TagSetCursor {
    pub fn new(
        measurement: impl Into<String>,
        tags: Tags,
        key: impl Into<String>,
        cursors: Vec<SeriesCursor>,
        codec: Arc<FieldCodec>,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            tags,
            key: key.into(),
            cursors,
            codec,
        }
    }

    /// Builds a cursor for every tag set with data in `snapshot`, ordered by
    /// tag set key.
    pub fn build(
        snapshot: &ShardSnapshot,
        measurement: &Measurement,
        tag_sets: &[TagSet],
    ) -> Vec<Self> {
        let Some(codec) = snapshot.field_codec(measurement.name()) else {
            return vec![];
        };

        let mut cursors: Vec<_> = tag_sets
            .iter()
            .filter_map(|tag_set| {
                let series: Vec<_> = tag_set
                    .series_keys
                    .iter()
                    .zip(&tag_set.filters)
                    .filter_map(|(key, filter)| {
                        SeriesCursor::from_snapshot(snapshot, key, filter.clone())
                    })
                    .collect();
                (!series.is_empty()).then(|| {
                    Self::new(
                        measurement.name(),
                        tag_set.tags.clone(),
                        tag_set.key.clone(),
                        series,
                        Arc::clone(&codec),
                    )
                })
            })
            .collect();
        cursors.sort_by(|a, b| a.key.cmp(&b.key));
        cursors
    }

    /// The canonical key of the tag set.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Positions every series so the next value read is at or after `time`.
    pub fn seek_to(&mut self, time: i64) {
        for cursor in &mut self.cursors {
            cursor.seek_to(time);
        }
    }

    /// Returns the next value at `tmin`, or within `[tmin, tmax)`, that
    /// passes its series' filter. When several series have a value at the
    /// same time, the one that comes first in the tag set is read first.
    ///
    /// With a single select field only that field is decoded; otherwise the
    /// selected fields are returned by name. Points that cannot be decoded
    /// are skipped.
    pub fn next(
        &mut self,
        tmin: i64,
        tmax: i64,
        select_fields: &[String],
        where_fields: &[String],
    ) -> Option<(i64, DecodedValue)> {
        loop {
            let idx = self.next_cursor(tmin, tmax)?;
            let cursor = &mut self.cursors[idx];
            let (time, data) = cursor.next()?;

            let decoded = decode(
                &self.codec,
                &data,
                cursor.predicate(),
                select_fields,
                where_fields,
            );
            match decoded {
                Some(value) => return Some((time, value)),
                None => trace!(series = %cursor.key(), time, "skipping point"),
            }
        }
    }

    /// The index of the series with the lowest next timestamp in range.
    fn next_cursor(&mut self, tmin: i64, tmax: i64) -> Option<usize> {
        let mut next: Option<(usize, i64)> = None;
        for (i, cursor) in self.cursors.iter_mut().enumerate() {
            let Some((t, _)) = cursor.peek() else {
                continue;
            };
            if t != tmin && !(tmin <= t && t < tmax) {
                continue;
            }
            if next.is_none_or(|(_, min)| t < min) {
                next = Some((i, t));
            }
        }
        next.map(|(i, _)| i)
    }
}

/// Decodes the selected fields of `data`, returning `None` if the point
/// fails `filter` or cannot be decoded.
fn decode(
    codec: &FieldCodec,
    data: &[u8],
    filter: Option<&ConditionalExpression>,
    select_fields: &[String],
    where_fields: &[String],
) -> Option<DecodedValue> {
    if let [field] = select_fields {
        let value = codec
            .decode_by_name(field, data)
            .inspect_err(|e| trace!(%e, field, "failed to decode field"))
            .ok()?;

        if let Some(filter) = filter {
            let matched = match where_fields {
                [w] if w == field => matches_where(filter, &(field.as_str(), &value)),
                _ => matches_where(filter, &decode_all(codec, data)?),
            };
            if !matched {
                return None;
            }
        }
        return Some(DecodedValue::Single(value));
    }

    let mut fields = decode_all(codec, data)?;
    if filter.is_some_and(|f| !matches_where(f, &fields)) {
        return None;
    }
    fields.retain(|name, _| select_fields.contains(name));
    (!fields.is_empty()).then_some(DecodedValue::Fields(fields))
}

fn decode_all(codec: &FieldCodec, data: &[u8]) -> Option<BTreeMap<String, FieldValue>> {
    codec
        .decode_fields_with_names(data)
        .inspect_err(|e| trace!(%e, "failed to decode fields"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use influxdb3_influxql::ConditionalExpression as Cond;
    use influxdb3_influxql::Expr;
    use influxdb3_shard::{Point, Shard};
    use pretty_assertions::assert_eq;

    fn shard() -> Shard {
        let shard = Shard::new(1);
        shard
            .write_points(&[
                Point::new("cpu", 0)
                    .with_tag("host", "a")
                    .with_field("value", 1.0)
                    .with_field("idle", 10_i64),
                Point::new("cpu", 10)
                    .with_tag("host", "a")
                    .with_field("value", 2.0)
                    .with_field("idle", 20_i64),
                Point::new("cpu", 5)
                    .with_tag("host", "b")
                    .with_field("value", 3.0)
                    .with_field("idle", 30_i64),
                Point::new("cpu", 10)
                    .with_tag("host", "b")
                    .with_field("value", 4.0),
            ])
            .unwrap();
        shard
    }

    fn tag_set_cursors(shard: &Shard, cond: Option<&Cond>, dims: &[&str]) -> Vec<TagSetCursor> {
        let snapshot = shard.snapshot().unwrap();
        let cpu = snapshot.measurement("cpu").unwrap();
        let dims: Vec<_> = dims.iter().map(|d| d.to_string()).collect();
        let tag_sets = cpu.tag_sets(cond, &dims);
        TagSetCursor::build(&snapshot, cpu, &tag_sets)
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn drain(
        cursor: &mut TagSetCursor,
        tmin: i64,
        tmax: i64,
        select: &[&str],
        filter: &[&str],
    ) -> Vec<(i64, DecodedValue)> {
        let (select, filter) = (names(select), names(filter));
        std::iter::from_fn(|| cursor.next(tmin, tmax, &select, &filter)).collect()
    }

    fn single(values: &[(i64, f64)]) -> Vec<(i64, DecodedValue)> {
        values
            .iter()
            .map(|(t, v)| (*t, DecodedValue::Single(FieldValue::Float(*v))))
            .collect()
    }

    #[test_log::test]
    fn merges_series_in_time_order() {
        let shard = shard();
        let mut cursors = tag_set_cursors(&shard, None, &[]);
        assert_eq!(cursors.len(), 1);
        let cursor = &mut cursors[0];
        assert_eq!(cursor.key(), "cpu");
        assert_eq!(cursor.measurement(), "cpu");

        // host=a comes first in the tag set, so it wins the tie at 10
        assert_eq!(
            drain(cursor, 0, 11, &["value"], &[]),
            single(&[(0, 1.0), (5, 3.0), (10, 2.0), (10, 4.0)])
        );
    }

    #[test_log::test]
    fn time_window() {
        let shard = shard();
        let mut cursors = tag_set_cursors(&shard, None, &[]);
        let cursor = &mut cursors[0];

        cursor.seek_to(5);
        assert_eq!(drain(cursor, 5, 10, &["value"], &[]), single(&[(5, 3.0)]));

        // the lower bound is always admitted, even for an empty window
        cursor.seek_to(10);
        assert_eq!(
            drain(cursor, 10, 10, &["value"], &[]),
            single(&[(10, 2.0), (10, 4.0)])
        );
    }

    #[test_log::test]
    fn one_cursor_per_tag_set() {
        let shard = shard();
        let cursors = tag_set_cursors(&shard, None, &["host"]);
        let keys: Vec<_> = cursors.iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec!["cpu|host=a", "cpu|host=b"]);
        assert_eq!(
            cursors[1].tags(),
            &Tags::from([("host".to_string(), "b".to_string())])
        );
    }

    #[test_log::test]
    fn filters_skip_points() {
        let shard = shard();

        // filter on the selected field
        let cond = Cond::gt(Expr::var("value"), Expr::from(1.5));
        let mut cursors = tag_set_cursors(&shard, Some(&cond), &[]);
        assert_eq!(
            drain(&mut cursors[0], 0, 11, &["value"], &["value"]),
            single(&[(5, 3.0), (10, 2.0), (10, 4.0)])
        );

        // filter on another field; the last point has no idle field and
        // never matches
        let cond = Cond::lt(Expr::var("idle"), Expr::from(25_i64));
        let mut cursors = tag_set_cursors(&shard, Some(&cond), &[]);
        assert_eq!(
            drain(&mut cursors[0], 0, 11, &["value"], &["idle"]),
            single(&[(0, 1.0), (10, 2.0)])
        );
    }

    #[test_log::test]
    fn multiple_fields_are_projected() {
        let shard = shard();
        shard
            .write_points(&[Point::new("cpu", 20)
                .with_tag("host", "a")
                .with_field("value", 5.0)
                .with_field("extra", "x")])
            .unwrap();

        let mut cursors = tag_set_cursors(&shard, None, &[]);
        cursors[0].seek_to(20);
        let values = drain(&mut cursors[0], 20, 21, &["idle", "value"], &[]);
        assert_eq!(
            values,
            vec![(
                20,
                DecodedValue::Fields(BTreeMap::from([(
                    "value".to_string(),
                    FieldValue::Float(5.0)
                )]))
            )]
        );
    }

    #[test_log::test]
    fn missing_field_is_skipped() {
        let shard = shard();
        let mut cursors = tag_set_cursors(&shard, None, &[]);
        let idle: Vec<_> = drain(&mut cursors[0], 0, 11, &["idle"], &[])
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(idle, vec![0, 5, 10]);
    }

    #[test_log::test]
    fn no_cursors_without_data() {
        let shard = shard();
        let cond = Cond::eq(Expr::var("host"), Expr::from("z"));
        assert!(tag_set_cursors(&shard, Some(&cond), &[]).is_empty());
    }
}
