//! Flattening of JSON API responses.

use serde_json::{Map, Value};
use tracing::debug;

use crate::catalog::{ApiFormat, SourceDefinition};
use crate::searcher::RawCandidate;

use super::locator::{append_headers, is_magnet};
use super::{ExtractError, ExtractedRow, SessionHeaders};

/// Follow a dotted key path. Numeric segments index into arrays.
/// An empty path is the value itself.
pub(crate) fn walk<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Text of a field: strings as is, numbers and booleans printed, anything
/// else empty.
fn field_text(item: &Value, path: Option<&str>) -> String {
    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return String::new();
    };
    match walk(item, path) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Child fields take precedence over the parent's.
fn overlay(parent: &Map<String, Value>, child: &Value, subresults_key: &str) -> Value {
    let mut merged = parent.clone();
    merged.remove(subresults_key);
    if let Value::Object(fields) = child {
        for (key, value) in fields {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Extracts candidates from a JSON document using a field map.
#[derive(Debug)]
pub struct ApiExtractor<'a> {
    source: &'a SourceDefinition,
    format: &'a ApiFormat,
    debug: bool,
}

impl<'a> ApiExtractor<'a> {
    pub fn new(source: &'a SourceDefinition, format: &'a ApiFormat, debug: bool) -> Self {
        Self {
            source,
            format,
            debug,
        }
    }

    /// Extract all records of `body`.
    ///
    /// A missing key anywhere on the results path, or a path that ends on
    /// anything but an array, yields no rows. With a subresults key
    /// configured, each child is yielded merged over its parent; the parent
    /// itself never is, and a parent without a child array yields nothing.
    pub fn extract(
        &self,
        body: &str,
        session: &SessionHeaders,
    ) -> Result<Vec<ExtractedRow>, ExtractError> {
        let document: Value =
            serde_json::from_str(body).map_err(|e| ExtractError::Json(e.to_string()))?;

        let Some(results) = walk(&document, &self.format.results) else {
            debug!(source = %self.source.id, path = %self.format.results, "Results path not found");
            return Ok(Vec::new());
        };

        let Value::Array(items) = results else {
            debug!(source = %self.source.id, path = %self.format.results, "Results path is not an array");
            return Ok(Vec::new());
        };

        let embedded = session.token_headers();
        let mut rows = Vec::new();

        for item in items {
            let Some(key) = self.format.subresults.as_deref() else {
                rows.extend(self.record(item, &embedded));
                continue;
            };
            if let (Value::Object(parent), Some(Value::Array(children))) = (item, item.get(key)) {
                for child in children {
                    rows.extend(self.record(&overlay(parent, child, key), &embedded));
                }
            }
        }

        Ok(rows)
    }

    fn record(&self, item: &Value, embedded: &[(String, String)]) -> Option<ExtractedRow> {
        let format = self.format;
        let mut name = field_text(item, Some(&format.name));
        let quality = field_text(item, format.quality.as_deref());
        if !quality.is_empty() && !name.is_empty() {
            name = format!("{} - {}", name, quality);
        }

        let info_hash = field_text(item, format.info_hash.as_deref());
        let mut torrent = field_text(item, Some(&format.torrent));
        if !torrent.is_empty() && !is_magnet(&torrent) {
            if let Some(prefix) = self.source.download_path.as_deref() {
                torrent = self.source.absolute(&format!("{}{}", prefix, torrent));
            }
        }
        if torrent.is_empty() && !info_hash.is_empty() {
            torrent = format!(
                "magnet:?xt=urn:btih:{}&dn={}",
                info_hash,
                urlencoding::encode(&name)
            );
        }

        if self.debug {
            debug!(source = %self.source.id, name = %name, torrent = %torrent, "API record");
        }

        if name.is_empty() || torrent.is_empty() {
            debug!(source = %self.source.id, "Skipping record without name or link");
            return None;
        }

        Some(ExtractedRow::Ready(RawCandidate {
            name,
            info_hash,
            uri: append_headers(&torrent, embedded),
            size: field_text(item, format.size.as_deref()),
            seeds: field_text(item, format.seeds.as_deref()),
            peers: field_text(item, format.peers.as_deref()),
        }))
    }
}
