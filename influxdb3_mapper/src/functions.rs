//! The map side of the aggregate functions.
//!
//! A map function consumes the values of one tag set within one interval and
//! produces a partial result that a reducer can combine with the partial
//! results of other shards. That is why `mean` keeps its count and `median`
//! keeps every value rather than computing a final answer here.

use crate::{Error, Result};
use influxdb3_influxql::{Call, Expr, FieldValue};
use serde::{Deserialize, Serialize};

/// The map functions a shard can evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFunc {
    Count,
    /// `count(DISTINCT f)`: the distinct values, counted by the reducer.
    CountDistinct,
    Distinct,
    Sum,
    Mean,
    Min,
    Max,
    Spread,
    First,
    Last,
    /// Every value in the interval, for functions that need all of them
    /// such as `median`, `percentile` and `stddev`.
    Values,
    /// Every point in the interval with its time, for a derivative over raw
    /// values.
    Points,
}

impl MapFunc {
    /// Resolves the map function for `call`.
    ///
    /// A derivative maps with the function it is applied to, so
    /// `derivative(mean(value))` maps as `mean`.
    pub fn from_call(call: &Call) -> Result<Self> {
        let arg = call
            .args
            .first()
            .ok_or_else(|| Error::MissingArgument(call.name.clone()))?;

        Ok(match call.name.as_str() {
            "count" => match arg {
                Expr::Distinct(_) => Self::CountDistinct,
                Expr::Call(c) if c.name == "distinct" => Self::CountDistinct,
                _ => Self::Count,
            },
            "distinct" => Self::Distinct,
            "sum" => Self::Sum,
            "mean" => Self::Mean,
            "min" => Self::Min,
            "max" => Self::Max,
            "spread" => Self::Spread,
            "first" => Self::First,
            "last" => Self::Last,
            "median" | "percentile" | "stddev" => Self::Values,
            "derivative" | "non_negative_derivative" => match arg {
                Expr::Call(nested) => Self::from_call(nested)?,
                _ => Self::Points,
            },
            name => return Err(Error::UnknownFunction(name.to_string())),
        })
    }

    /// Runs the function over `values`, which are in ascending time order.
    /// Returns `None` if there are no values.
    pub fn map<I>(self, values: I) -> Option<MapOutput>
    where
        I: Iterator<Item = (i64, FieldValue)>,
    {
        match self {
            Self::Count => {
                let n = values.count() as u64;
                (n > 0).then_some(MapOutput::Count(n))
            }
            Self::CountDistinct | Self::Distinct => {
                let mut distinct: Vec<_> = values.map(|(_, v)| v).collect();
                if distinct.is_empty() {
                    return None;
                }
                distinct.sort_by(FieldValue::total_cmp);
                distinct.dedup_by(|a, b| a.total_cmp(b).is_eq());
                Some(MapOutput::Distinct(distinct))
            }
            Self::Sum => {
                let mut numbers = numbers(values).peekable();
                numbers.peek()?;
                Some(MapOutput::Sum(numbers.sum()))
            }
            Self::Mean => {
                let (mut count, mut mean) = (0_u64, 0_f64);
                for v in numbers(values) {
                    count += 1;
                    mean += (v - mean) / count as f64;
                }
                (count > 0).then_some(MapOutput::Mean { count, mean })
            }
            Self::Min => numbers(values).reduce(f64::min).map(MapOutput::Min),
            Self::Max => numbers(values).reduce(f64::max).map(MapOutput::Max),
            Self::Spread => numbers(values)
                .fold(None, |acc: Option<(f64, f64)>, v| {
                    Some(acc.map_or((v, v), |(min, max)| (min.min(v), max.max(v))))
                })
                .map(|(min, max)| MapOutput::Spread { min, max }),
            Self::First => values
                .map(|(time, value)| MapOutput::First { time, value })
                .next(),
            Self::Last => values.last().map(|(time, value)| MapOutput::Last { time, value }),
            Self::Values => {
                let all: Vec<_> = values.map(|(_, v)| v).collect();
                (!all.is_empty()).then_some(MapOutput::Values(all))
            }
            Self::Points => {
                let all: Vec<_> = values.collect();
                (!all.is_empty()).then_some(MapOutput::Points(all))
            }
        }
    }
}

fn numbers(values: impl Iterator<Item = (i64, FieldValue)>) -> impl Iterator<Item = f64> {
    values.filter_map(|(_, v)| v.as_f64())
}

/// The partial result of a map function for one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapOutput {
    Count(u64),
    Sum(f64),
    Mean { count: u64, mean: f64 },
    Min(f64),
    Max(f64),
    Spread { min: f64, max: f64 },
    First { time: i64, value: FieldValue },
    Last { time: i64, value: FieldValue },
    /// Distinct values in ascending order.
    Distinct(Vec<FieldValue>),
    Values(Vec<FieldValue>),
    Points(Vec<(i64, FieldValue)>),
}
