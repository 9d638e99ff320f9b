use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Stderr counter for long passes, redrawn every `interval` units.
pub struct ProgressCounter {
    label: String,
    interval: u64,
    count: AtomicU64,
    started: Instant,
    enabled: bool,
}

impl ProgressCounter {
    pub fn new(label: impl Into<String>, interval: u64, enabled: bool) -> Self {
        let counter = Self {
            label: label.into(),
            interval: interval.max(1),
            count: AtomicU64::new(0),
            started: Instant::now(),
            enabled,
        };
        counter.print(0);
        counter
    }

    pub fn inc(&self, delta: u64) {
        let prev = self.count.fetch_add(delta, Ordering::Relaxed);
        let current = prev + delta;
        if prev / self.interval < current / self.interval {
            self.print(current);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        if !self.enabled {
            return;
        }
        let count = self.count();
        let secs = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        eprintln!(
            "\r{}: {} ({:.0}/s)",
            self.label,
            count,
            count as f64 / secs
        );
    }

    fn print(&self, current: u64) {
        if !self.enabled {
            return;
        }
        eprint!("\r{}: {}", self.label, current);
        let _ = std::io::stderr().flush();
    }
}

/// Flatten GeoJSON properties into string tags.
///
/// Strings are kept verbatim, numbers and booleans use their JSON text, and
/// nulls are dropped. A nested `tags` object (as written by OSM extract
/// tools) is merged into the top level without overriding existing keys.
pub fn tags_from_properties(properties: &Map<String, Value>) -> HashMap<String, String> {
    let mut tags = HashMap::with_capacity(properties.len());

    for (key, value) in properties {
        if key == "tags" && value.is_object() {
            continue;
        }
        if let Some(text) = value_to_tag(value) {
            tags.insert(key.clone(), text);
        }
    }

    if let Some(Value::Object(nested)) = properties.get("tags") {
        for (key, value) in nested {
            if tags.contains_key(key) {
                continue;
            }
            if let Some(text) = value_to_tag(value) {
                tags.insert(key.clone(), text);
            }
        }
    }

    tags
}

fn value_to_tag(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_scalars() {
        let props = json!({"name": "Iset", "width": 30, "tidal": false, "ref": null});
        let tags = tags_from_properties(props.as_object().unwrap());
        assert_eq!(tags.get("name").map(String::as_str), Some("Iset"));
        assert_eq!(tags.get("width").map(String::as_str), Some("30"));
        assert_eq!(tags.get("tidal").map(String::as_str), Some("false"));
        assert!(!tags.contains_key("ref"));
    }

    #[test]
    fn merges_nested_tags_object() {
        let props = json!({"name": "Top", "tags": {"name": "Nested", "waterway": "river"}});
        let tags = tags_from_properties(props.as_object().unwrap());
        assert_eq!(tags.get("name").map(String::as_str), Some("Top"));
        assert_eq!(tags.get("waterway").map(String::as_str), Some("river"));
        assert!(!tags.contains_key("tags"));
    }

    #[test]
    fn progress_counts_without_output() {
        let progress = ProgressCounter::new("zoom 3", 10, false);
        progress.inc(4);
        progress.inc(7);
        assert_eq!(progress.count(), 11);
        progress.finish();
    }
}
