//! The measurement index: which series, tag keys and fields exist, and how
//! series group into tag sets for a query.

use crate::series::{SeriesKey, Tags, tag_set_key};
use influxdb3_influxql::expression::walk::{Expression, walk_expression};
use influxdb3_influxql::{
    ConditionalBinary, ConditionalExpression, ConditionalOperator, Expr, FieldValue,
    TIME_COLUMN_NAME, Valuer, VarRef, eval_conditional,
};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

#[derive(Debug, Clone, Default)]
pub struct DatabaseIndex {
    measurements: BTreeMap<String, Measurement>,
}

impl DatabaseIndex {
    /// Returns the measurement `name`, or `None` if it has never been written.
    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements.get(name)
    }

    pub fn measurement_names(&self) -> impl Iterator<Item = &str> {
        self.measurements.keys().map(String::as_str)
    }

    /// Records that a point with `tags` and `fields` was written to
    /// `measurement`, creating the measurement and series as needed.
    pub fn record_point<'a>(
        &mut self,
        measurement: &str,
        tags: &Tags,
        fields: impl IntoIterator<Item = &'a String>,
    ) -> SeriesKey {
        let m = self
            .measurements
            .entry(measurement.to_string())
            .or_insert_with(|| Measurement::new(measurement));
        for field in fields {
            if !m.field_names.contains(field) {
                m.field_names.insert(field.clone());
            }
        }
        m.create_series_if_not_exists(tags)
    }
}

/// One concrete series of a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    pub key: SeriesKey,
    pub tags: Tags,
}

#[derive(Debug, Clone)]
pub struct Measurement {
    name: String,
    field_names: BTreeSet<String>,
    tag_keys: BTreeSet<String>,
    series: BTreeMap<SeriesKey, Series>,
}

impl Measurement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_names: BTreeSet::new(),
            tag_keys: BTreeSet::new(),
            series: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_names.contains(name)
    }

    pub fn has_tag_key(&self, key: &str) -> bool {
        self.tag_keys.contains(key)
    }

    /// Tag keys in sorted order.
    pub fn tag_keys(&self) -> impl Iterator<Item = &str> {
        self.tag_keys.iter().map(String::as_str)
    }

    /// Series in key order.
    pub fn series(&self) -> impl Iterator<Item = &Series> {
        self.series.values()
    }

    fn create_series_if_not_exists(&mut self, tags: &Tags) -> SeriesKey {
        let key = SeriesKey::new(&self.name, tags);
        if !self.series.contains_key(&key) {
            self.tag_keys.extend(tags.keys().cloned());
            self.series.insert(
                key.clone(),
                Series {
                    key: key.clone(),
                    tags: tags.clone(),
                },
            );
        }
        key
    }

    /// Groups the series matching `condition` into tag sets by the values
    /// of the `dimensions` tag keys. A series without a dimension tag
    /// groups under the empty value.
    ///
    /// Tag and time comparisons in `condition` are resolved per series;
    /// whatever remains references fields and becomes that series' filter.
    /// Tag sets are returned in key order, and the series of each tag set in
    /// series key order.
    pub fn tag_sets(
        &self,
        condition: Option<&ConditionalExpression>,
        dimensions: &[String],
    ) -> Vec<TagSet> {
        let mut sets: BTreeMap<String, TagSet> = BTreeMap::new();
        for series in self.series.values() {
            let filter = match condition.map(|c| self.reduce(c, &series.tags)) {
                None | Some(Reduced::Bool(true)) => None,
                Some(Reduced::Bool(false)) => continue,
                Some(Reduced::Expr(e)) => Some(e),
            };

            let tags: Tags = dimensions
                .iter()
                .map(|d| (d.clone(), series.tags.get(d).cloned().unwrap_or_default()))
                .collect();
            let key = tag_set_key(&self.name, &tags);
            let set = sets.entry(key.clone()).or_insert_with(|| TagSet {
                key,
                tags,
                series_keys: vec![],
                filters: vec![],
            });
            set.series_keys.push(series.key.clone());
            set.filters.push(filter);
        }
        sets.into_values().collect()
    }

    fn reduce(&self, cond: &ConditionalExpression, tags: &Tags) -> Reduced {
        match cond {
            ConditionalExpression::Grouped(inner) => match self.reduce(inner, tags) {
                Reduced::Expr(e) => Reduced::Expr(e.grouped()),
                r => r,
            },
            ConditionalExpression::Expr(_) => Reduced::Expr(cond.clone()),
            ConditionalExpression::Binary(ConditionalBinary { lhs, op, rhs }) => match op {
                ConditionalOperator::And => {
                    match (self.reduce(lhs, tags), self.reduce(rhs, tags)) {
                        (Reduced::Bool(false), _) | (_, Reduced::Bool(false)) => {
                            Reduced::Bool(false)
                        }
                        (Reduced::Bool(true), r) | (r, Reduced::Bool(true)) => r,
                        (Reduced::Expr(l), Reduced::Expr(r)) => Reduced::Expr(l.and(r)),
                    }
                }
                ConditionalOperator::Or => {
                    match (self.reduce(lhs, tags), self.reduce(rhs, tags)) {
                        (Reduced::Bool(true), _) | (_, Reduced::Bool(true)) => {
                            Reduced::Bool(true)
                        }
                        (Reduced::Bool(false), r) | (r, Reduced::Bool(false)) => r,
                        (Reduced::Expr(l), Reduced::Expr(r)) => Reduced::Expr(l.or(r)),
                    }
                }
                _ => match self.comparison_kind(cond) {
                    // time bounds are applied by the reader, not per series
                    ComparisonKind::Time => Reduced::Bool(true),
                    ComparisonKind::Tag => {
                        let valuer = TagValuer {
                            measurement: self,
                            tags,
                        };
                        Reduced::Bool(matches!(
                            eval_conditional(cond, &valuer),
                            Some(FieldValue::Boolean(true))
                        ))
                    }
                    ComparisonKind::Field => Reduced::Expr(cond.clone()),
                },
            },
        }
    }

    fn comparison_kind(&self, cond: &ConditionalExpression) -> ComparisonKind {
        let mut kind = ComparisonKind::Field;
        let _ = walk_expression::<()>(cond, &mut |e| {
            if let Expression::Arithmetic(Expr::VarRef(VarRef { name })) = e {
                if name == TIME_COLUMN_NAME {
                    kind = ComparisonKind::Time;
                    return ControlFlow::Break(());
                }
                if self.has_tag_key(name) {
                    kind = ComparisonKind::Tag;
                }
            }
            ControlFlow::Continue(())
        });
        kind
    }
}

/// The result of resolving the tag and time parts of a condition for one series.
#[derive(Debug)]
enum Reduced {
    Bool(bool),
    Expr(ConditionalExpression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComparisonKind {
    Time,
    Tag,
    Field,
}

/// Resolves tag keys of a measurement to one series' tag values.
#[derive(Debug)]
struct TagValuer<'a> {
    measurement: &'a Measurement,
    tags: &'a Tags,
}

impl Valuer for TagValuer<'_> {
    fn value(&self, name: &str) -> Option<FieldValue> {
        self.measurement.has_tag_key(name).then(|| {
            FieldValue::String(self.tags.get(name).cloned().unwrap_or_default())
        })
    }
}

/// A group of series sharing the same values for the query's dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct TagSet {
    /// The canonical key, see [`tag_set_key`].
    pub key: String,
    /// The dimension tags and their values.
    pub tags: Tags,
    pub series_keys: Vec<SeriesKey>,
    /// The residual field filter of each series, parallel to `series_keys`.
    pub filters: Vec<Option<ConditionalExpression>>,
}
