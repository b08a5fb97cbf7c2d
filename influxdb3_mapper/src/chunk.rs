//! The chunks a mapper hands to the reducer.

use crate::functions::MapOutput;
use influxdb3_influxql::FieldValue;
use influxdb3_shard::Tags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value read from a series: the one selected field, or every selected
/// field by name when the statement selects more than one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Single(FieldValue),
    Fields(BTreeMap<String, FieldValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawValue {
    pub time: i64,
    pub value: DecodedValue,
}

/// Raw values of a single tag set in ascending time order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChunk {
    pub name: String,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    pub values: Vec<RawValue>,
}

/// The results of every aggregate of a statement, in `SELECT` order, for one
/// interval of one tag set. An aggregate over an interval without values
/// has no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateChunk {
    pub name: String,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    /// The start of the interval, aligned to the interval size.
    pub time: i64,
    pub values: Vec<Option<MapOutput>>,
}

/// A chunk from either kind of mapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapperChunk {
    Raw(RawChunk),
    Aggregate(AggregateChunk),
}

impl From<RawChunk> for MapperChunk {
    fn from(chunk: RawChunk) -> Self {
        Self::Raw(chunk)
    }
}

impl From<AggregateChunk> for MapperChunk {
    fn from(chunk: AggregateChunk) -> Self {
        Self::Aggregate(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn raw_chunk_json() {
        let chunk = RawChunk {
            name: "cpu".into(),
            tags: Tags::from([("host".to_string(), "a".to_string())]),
            values: vec![
                RawValue {
                    time: 0,
                    value: DecodedValue::Single(FieldValue::Float(1.0)),
                },
                RawValue {
                    time: 5,
                    value: DecodedValue::Fields(BTreeMap::from([
                        ("up".to_string(), FieldValue::Boolean(true)),
                        ("value".to_string(), FieldValue::Integer(9)),
                    ])),
                },
            ],
        };
        let json = serde_json::to_string(&MapperChunk::from(chunk.clone())).unwrap();
        assert_eq!(
            json,
            r#"{"name":"cpu","tags":{"host":"a"},"values":[{"time":0,"value":1.0},{"time":5,"value":{"up":true,"value":9}}]}"#
        );
        let back: RawChunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn aggregate_chunk_without_tags() {
        let chunk = AggregateChunk {
            name: "cpu".into(),
            tags: Tags::new(),
            time: 10,
            values: vec![Some(MapOutput::Count(1)), None],
        };
        assert_eq!(
            serde_json::to_string(&chunk).unwrap(),
            r#"{"name":"cpu","time":10,"values":[{"count":1},null]}"#
        );
    }
}
