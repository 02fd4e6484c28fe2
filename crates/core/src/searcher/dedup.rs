//! Cross-source merging of search results.

use std::collections::HashMap;

use crate::extract::split_headers;

use super::NormalizedRecord;

/// Identity of a record: its info hash when known, otherwise the locator
/// without embedded headers.
fn identity(record: &NormalizedRecord) -> String {
    if record.info_hash.is_empty() {
        split_headers(&record.uri).0.to_string()
    } else {
        format!("btih:{}", record.info_hash.to_lowercase())
    }
}

/// Merge the results of all sources.
///
/// Records with the same identity collapse into the one with the most seeds
/// (the first seen wins ties). The list is sorted by seeds descending, or by
/// resolution score then seeds when `sort_by_resolution` is set.
pub fn merge_results(
    records: Vec<NormalizedRecord>,
    sort_by_resolution: bool,
) -> Vec<NormalizedRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<NormalizedRecord> = Vec::with_capacity(records.len());

    for record in records {
        let key = identity(&record);
        match index.get(&key) {
            Some(&pos) => {
                if record.seeds > merged[pos].seeds {
                    merged[pos] = record;
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(record);
            }
        }
    }

    if sort_by_resolution {
        merged.sort_by(|a, b| {
            b.resolution
                .unwrap_or(0)
                .cmp(&a.resolution.unwrap_or(0))
                .then(b.seeds.cmp(&a.seeds))
        });
    } else {
        merged.sort_by(|a, b| b.seeds.cmp(&a.seeds));
    }
    merged
}
