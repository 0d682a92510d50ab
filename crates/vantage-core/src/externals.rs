//! External-resource side-channel.
//!
//! Large or binary result attributes never travel in the main JSON
//! document. At write time they are collected into one consolidated,
//! binary-safe blob per report run; at read time the blob is loaded and
//! the attributes are re-attached onto the live results by key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LEGACY_KEY_SEPARATOR;
use crate::error::Result;
use crate::key::join_key;
use crate::model::Report;
use crate::store::KeyValueStore;
use crate::table::Table;

/// Name of the consolidated side-channel blob under a run's prefix.
pub const RESOURCE_BLOB: &str = "res";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExternalValue {
    Table(Table),
    Bytes(Vec<u8>),
    Text(String),
}

/// `{external_key: {attribute: value}}` for one report run.
pub type ExternalMap = BTreeMap<String, BTreeMap<String, ExternalValue>>;

/// Walk the report and collect every result's external attributes,
/// assigning side-channel keys where missing.
pub(crate) fn collect(report: &mut Report) -> ExternalMap {
    let mut out = ExternalMap::new();
    for result in report.iter_results_mut() {
        let values = result.external_values();
        if values.is_empty() {
            continue;
        }
        if let Some(key) = result.ensure_external_key() {
            out.insert(key, values);
        }
    }
    out
}

/// Re-attach loaded external values onto the report's results.
pub(crate) fn attach(report: &mut Report, externals: &ExternalMap) {
    for result in report.iter_results_mut() {
        if let Some(key) = result.external_key()
            && let Some(values) = externals.get(key)
        {
            debug!(key, "attaching external resource");
            result.attach_externals(values);
        }
    }
}

pub(crate) fn encode_blob(externals: &ExternalMap) -> Result<Vec<u8>> {
    Ok(bincode::serialize(externals)?)
}

pub(crate) fn decode_blob(bytes: &[u8]) -> Result<ExternalMap> {
    Ok(bincode::deserialize(bytes)?)
}

/// Load the side-channel blob for a run, if present, and re-attach its
/// contents. The legacy `.`-separated key naming is checked before the
/// current one; an absent blob is not an error (old documents inline
/// their data instead).
pub(crate) fn load_for_report(store: &dyn KeyValueStore, report: &mut Report) -> Result<()> {
    let legacy_key = [
        report.id.as_str(),
        report.run_id.as_str(),
        RESOURCE_BLOB,
    ]
    .join(&LEGACY_KEY_SEPARATOR.to_string());
    let current_key = join_key([report.id.as_str(), report.run_id.as_str(), RESOURCE_BLOB]);

    let key = if store.contains(&legacy_key)? {
        legacy_key
    } else {
        current_key
    };
    if !store.contains(&key)? {
        return Ok(());
    }

    let externals = decode_blob(&store.get(&key)?)?;
    attach(report, &externals);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, Report, Section};
    use crate::result::{ReportResult, TableResult, TextResult};
    use crate::store::MemoryStore;
    use crate::table::Cell;

    fn report_with_table() -> Report {
        let table = Table::from_rows(&["a"], vec![vec![Cell::Int(1)]]).expect("table");
        Report::builder("Ext")
            .section(Section::new(
                "s",
                vec![Block::new(
                    "b",
                    vec![
                        ReportResult::from(
                            TableResult::new("t", Some(table), &[]).expect("result"),
                        ),
                        ReportResult::from(TextResult::new("plain", None, None)),
                    ],
                )],
            ))
            .build()
    }

    #[test]
    fn collect_assigns_keys_and_skips_inline_results() {
        let mut report = report_with_table();
        let externals = collect(&mut report);
        assert_eq!(externals.len(), 1);
        let key = report.iter_results().next().expect("result").external_key();
        assert!(key.is_some());
        assert!(externals.contains_key(key.expect("key")));
    }

    #[test]
    fn blob_roundtrip() {
        let mut report = report_with_table();
        let externals = collect(&mut report);
        let bytes = encode_blob(&externals).expect("encode");
        assert_eq!(decode_blob(&bytes).expect("decode"), externals);
    }

    #[test]
    fn load_prefers_legacy_key_naming() {
        let mut report = report_with_table();
        let externals = collect(&mut report);
        let blob = encode_blob(&externals).expect("encode");

        let store = MemoryStore::new();
        let legacy_key = format!("{}.{}.res", report.id, report.run_id);
        store.put(&legacy_key, &blob).expect("put");

        // strip external attributes to simulate a freshly decoded document
        let mut stripped = report.clone();
        for result in stripped.iter_results_mut() {
            if let ReportResult::Table(t) = result {
                t.data = None;
                t.status_table = None;
            }
        }
        load_for_report(&store, &mut stripped).expect("load");
        let ReportResult::Table(restored) = stripped.iter_results().next().expect("result")
        else {
            panic!("variant changed");
        };
        assert!(restored.data.is_some());
    }

    #[test]
    fn absent_blob_is_not_an_error() {
        let store = MemoryStore::new();
        let mut report = report_with_table();
        collect(&mut report);
        load_for_report(&store, &mut report).expect("absent blob tolerated");
    }
}
