//! Resolution of a statement against a measurement: which names are fields
//! and which are tags, and which tag sets the query reads.

use crate::{Clause, Error, Result};
use influxdb3_influxql::{MeasurementSelection, SelectStatement, TIME_COLUMN_NAME};
use influxdb3_shard::{Measurement, TagSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTagSets {
    /// Tag sets in key order, after `SLIMIT` and `SOFFSET`.
    pub tag_sets: Vec<TagSet>,
    /// Fields referenced by the projection, in order of appearance.
    pub select_fields: Vec<String>,
    /// Tag keys referenced by the projection. These are also grouped by.
    pub select_tags: Vec<String>,
    /// Fields referenced by the `WHERE` clause.
    pub where_fields: Vec<String>,
}

/// Returns the measurement `stmt` selects from. Statements reaching a shard
/// must name exactly one measurement.
pub fn source_measurement(stmt: &SelectStatement) -> Result<&str> {
    match stmt.from.as_slice() {
        [MeasurementSelection::Name(name)] => Ok(name),
        [other] => Err(Error::InvalidSource(other.to_string())),
        sources => Err(Error::SourceCount(sources.len())),
    }
}

/// Classifies the names `stmt` references and computes its tag sets.
///
/// Every name in the projection or the `WHERE` clause other than `time`
/// must be a field or tag key of `measurement`, and `GROUP BY` must not
/// name a field. Tag keys in the projection are added to the `GROUP BY`
/// dimensions.
pub fn resolve_tag_sets(
    measurement: &Measurement,
    stmt: &SelectStatement,
) -> Result<ResolvedTagSets> {
    let dimensions = stmt.dimensions()?;
    let mut tag_keys: Vec<String> = if dimensions.wildcard {
        measurement.tag_keys().map(String::from).collect()
    } else {
        vec![]
    };
    for tag in dimensions.tags {
        if measurement.has_field(&tag) {
            return Err(Error::GroupByField(tag));
        }
        tag_keys.push(tag);
    }

    let mut select_fields = vec![];
    let mut select_tags = vec![];
    for name in stmt.names_in_select() {
        if name == TIME_COLUMN_NAME {
            continue;
        }
        if measurement.has_field(&name) {
            select_fields.push(name);
        } else if measurement.has_tag_key(&name) {
            select_tags.push(name);
        } else {
            return Err(Error::UnknownName {
                clause: Clause::Select,
                name,
            });
        }
    }

    let mut where_fields = vec![];
    for name in stmt.names_in_where() {
        if name == TIME_COLUMN_NAME || measurement.has_tag_key(&name) {
            continue;
        }
        if !measurement.has_field(&name) {
            return Err(Error::UnknownName {
                clause: Clause::Where,
                name,
            });
        }
        where_fields.push(name);
    }

    tag_keys.extend(select_tags.iter().cloned());
    tag_keys.sort_unstable();
    tag_keys.dedup();

    let tag_sets = measurement.tag_sets(stmt.condition.as_ref(), &tag_keys);
    let total = tag_sets.len();
    let tag_sets = limit_series(tag_sets, stmt.series_limit, stmt.series_offset);
    debug!(
        measurement = measurement.name(),
        ?tag_keys,
        total,
        selected = tag_sets.len(),
        "resolved tag sets"
    );

    Ok(ResolvedTagSets {
        tag_sets,
        select_fields,
        select_tags,
        where_fields,
    })
}

/// Applies a limit and offset to `items`. A missing or zero limit keeps
/// everything after the offset, and an offset past the end keeps nothing.
pub fn limit_series<T>(mut items: Vec<T>, limit: Option<u64>, offset: Option<u64>) -> Vec<T> {
    let offset = to_usize(offset.unwrap_or(0));
    if offset >= items.len() {
        return vec![];
    }
    items.drain(..offset);
    match limit.map(to_usize) {
        Some(limit) if limit > 0 => items.truncate(limit),
        _ => {}
    }
    items
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}
