use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use twox_hash::XxHash64;

/// Tag key to tag value, sorted by key.
pub type Tags = BTreeMap<String, String>;

/// Identifies one series: a measurement plus an exact set of tag values.
///
/// The key is rendered the way line protocol writes a series, e.g.
/// `cpu,host=a,region=west`, with tags in key order and `,`, `=` and spaces
/// escaped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey(Arc<str>);

impl SeriesKey {
    pub fn new(measurement: &str, tags: &Tags) -> Self {
        let mut key = String::with_capacity(measurement.len() + tags.len() * 16);
        escape_into(&mut key, measurement);
        for (k, v) in tags {
            key.push(',');
            escape_into(&mut key, k);
            key.push('=');
            escape_into(&mut key, v);
        }
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the write-cache partition this series belongs to, out of
    /// `partitions`. The mapping is stable across processes.
    pub fn partition(&self, partitions: usize) -> usize {
        debug_assert!(partitions > 0);
        (XxHash64::oneshot(0, self.0.as_bytes()) % partitions as u64) as usize
    }
}

impl Display for SeriesKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// The canonical key of a tag set: the measurement name, then each tag as
/// `key=value` in key order, joined with `|`. A tag set without tags is
/// keyed by the bare measurement name.
pub fn tag_set_key(measurement: &str, tags: &Tags) -> String {
    let mut key = measurement.to_string();
    for (k, v) in tags {
        key.push('|');
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key
}
