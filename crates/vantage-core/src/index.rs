//! Per-report run index.
//!
//! Each report id owns one YAML index document listing its stored runs
//! with their titles, timestamps and block status counts, so catalog
//! views never have to load full report documents. The index is derived
//! data: when it drifts from storage it is rebuilt from the documents,
//! not the other way around.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::FORMAT_VERSION;
use crate::error::Result;
use crate::key::{join_key, split_key};
use crate::model::Report;
use crate::registry::ResultRegistry;
use crate::reports::MAIN_DOCUMENT;
use crate::serialize;
use crate::status::Status;
use crate::store::KeyValueStore;

/// Name of the index document under a report's prefix.
pub const INDEX_DOCUMENT: &str = "index";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub version: u32,
    pub title: String,
}

/// One run's summary line in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub runid: String,
    pub runtitle: String,
    #[serde(with = "serialize::timefmt")]
    pub timestamp: chrono::NaiveDateTime,
    pub status: BTreeMap<Status, u64>,
}

impl RunEntry {
    fn from_report(report: &Report) -> Self {
        Self {
            runid: report.run_id.clone(),
            runtitle: report.run_title.clone(),
            timestamp: report.timestamp,
            status: report.status_stats(),
        }
    }
}

/// Index contents for one report id.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportInfo {
    pub title: String,
    pub runs: BTreeMap<String, RunEntry>,
}

/// Runs added to and removed from an index by a repair pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexRepair {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl IndexRepair {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

fn index_key(report_id: &str) -> String {
    join_key([report_id, INDEX_DOCUMENT])
}

/// Read the raw index document. Unlike the side-channel blob, the index
/// has always lived at the canonical `/`-separated key, so no legacy
/// naming is checked here. A missing or unparseable index reads as
/// `None`; the caller decides whether that warrants a rebuild.
fn read_index(
    store: &dyn KeyValueStore,
    report_id: &str,
) -> Result<Option<(IndexHeader, Vec<RunEntry>)>> {
    let key = index_key(report_id);
    if !store.contains(&key)? {
        return Ok(None);
    }
    let bytes = store.get(&key)?;
    match serde_norway::from_slice(&bytes) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err) => {
            warn!(report_id, %err, "index document is unreadable, treating as absent");
            Ok(None)
        }
    }
}

fn write_index(
    store: &dyn KeyValueStore,
    report_id: &str,
    header: &IndexHeader,
    entries: &[RunEntry],
) -> Result<()> {
    let yaml = serde_norway::to_string(&(header, entries))?;
    store.put(&index_key(report_id), yaml.as_bytes())
}

/// All report ids present in the store, in sorted order. A prefix only
/// counts as a report when it holds an index document or at least one
/// stored run document; unrelated keys never become catalog entries.
pub fn list_reports(store: &dyn KeyValueStore) -> Result<Vec<String>> {
    let mut ids = BTreeSet::new();
    for key in store.keys()? {
        let parts = split_key(&key);
        let is_index = parts.len() == 2 && parts[1] == INDEX_DOCUMENT;
        let is_run_document = parts.len() >= 3 && key.ends_with(MAIN_DOCUMENT);
        if is_index || is_run_document {
            ids.insert(parts[0].to_string());
        }
    }
    Ok(ids.into_iter().collect())
}

/// Run ids that have stored data under a report's prefix, in sorted
/// order. The index document itself is not a run.
pub fn list_runs(store: &dyn KeyValueStore, report_id: &str) -> Result<Vec<String>> {
    let mut runs = BTreeSet::new();
    for key in store.keys()? {
        let parts = split_key(&key);
        if parts.len() >= 3 && parts[0] == report_id {
            runs.insert(parts[1].to_string());
        }
    }
    Ok(runs.into_iter().collect())
}

/// Insert or replace one run's entry. A prior entry under the same run
/// id is superseded; entries stay sorted by timestamp.
pub fn add_to_index(store: &dyn KeyValueStore, report: &Report) -> Result<()> {
    let (prior_header, mut entries) = read_index(store, &report.id)?.unwrap_or((
        IndexHeader {
            version: FORMAT_VERSION,
            title: report.title.clone(),
        },
        Vec::new(),
    ));
    entries.retain(|entry| entry.runid != report.run_id);
    entries.push(RunEntry::from_report(report));
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.runid.cmp(&b.runid)));

    let header = IndexHeader {
        version: FORMAT_VERSION,
        title: if prior_header.title.is_empty() {
            report.title.clone()
        } else {
            prior_header.title
        },
    };
    write_index(store, &report.id, &header, &entries)
}

/// Drop one run's entry. A missing index or entry is a no-op.
pub fn remove_from_index(store: &dyn KeyValueStore, report_id: &str, run_id: &str) -> Result<()> {
    let Some((header, mut entries)) = read_index(store, report_id)? else {
        return Ok(());
    };
    entries.retain(|entry| entry.runid != run_id);
    write_index(store, report_id, &header, &entries)
}

/// Compute the symmetric difference between the index and storage ground
/// truth, without writing anything back.
fn compute_repair(
    store: &dyn KeyValueStore,
    report_id: &str,
    registry: &ResultRegistry,
) -> Result<(IndexHeader, Vec<RunEntry>, IndexRepair)> {
    let (mut header, mut entries) = read_index(store, report_id)?.unwrap_or((
        IndexHeader {
            version: FORMAT_VERSION,
            title: report_id.to_string(),
        },
        Vec::new(),
    ));

    let stored_runs: BTreeSet<String> = list_runs(store, report_id)?
        .into_iter()
        .filter(|run| {
            store
                .contains(&join_key([report_id, run, MAIN_DOCUMENT]))
                .unwrap_or(false)
        })
        .collect();
    let indexed_runs: BTreeSet<String> = entries.iter().map(|e| e.runid.clone()).collect();

    let mut repair = IndexRepair::default();

    for run in stored_runs.difference(&indexed_runs) {
        let key = join_key([report_id, run, MAIN_DOCUMENT]);
        let report = match store
            .get(&key)
            .and_then(|bytes| serialize::decode_document(&bytes, registry))
        {
            Ok((report, _)) => report,
            Err(err) => {
                warn!(report_id, run, %err, "skipping unreadable run during index repair");
                continue;
            }
        };
        if header.title == report_id {
            header.title = report.title.clone();
        }
        entries.push(RunEntry::from_report(&report));
        repair.added.push(run.clone());
    }

    for run in indexed_runs.difference(&stored_runs) {
        entries.retain(|entry| &entry.runid != run);
        repair.removed.push(run.clone());
    }

    Ok((header, entries, repair))
}

/// Reconcile one report's index with the runs actually in storage.
///
/// Runs with a stored main document but no index entry are re-read and
/// added (a run whose document fails to load is logged and skipped, so
/// one corrupt run cannot block repair of the rest). Index entries whose
/// run no longer exists in storage are removed. A clean index is left
/// untouched, which makes the pass idempotent.
pub fn check_and_repair(
    store: &dyn KeyValueStore,
    report_id: &str,
    registry: &ResultRegistry,
) -> Result<IndexRepair> {
    let (mut header, mut entries, repair) = compute_repair(store, report_id, registry)?;
    if !repair.is_clean() {
        info!(
            report_id,
            added = repair.added.len(),
            removed = repair.removed.len(),
            "repaired run index"
        );
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.runid.cmp(&b.runid)));
        header.version = FORMAT_VERSION;
        write_index(store, report_id, &header, &entries)?;
    }
    Ok(repair)
}

/// Load one report's index summary.
///
/// `check_index` compares the index against storage ground truth and
/// logs any drift without touching it; `repair_index` additionally
/// writes the reconciled index back before reading. Repair implies the
/// check.
pub fn get_report_info(
    store: &dyn KeyValueStore,
    report_id: &str,
    check_index: bool,
    repair_index: bool,
    registry: &ResultRegistry,
) -> Result<ReportInfo> {
    if repair_index {
        check_and_repair(store, report_id, registry)?;
    } else if check_index {
        let (_, _, repair) = compute_repair(store, report_id, registry)?;
        if !repair.is_clean() {
            warn!(
                report_id,
                missing = ?repair.added,
                orphaned = ?repair.removed,
                "run index has drifted from storage"
            );
        }
    }
    let (header, entries) = read_index(store, report_id)?.unwrap_or((
        IndexHeader {
            version: FORMAT_VERSION,
            title: report_id.to_string(),
        },
        Vec::new(),
    ));
    Ok(ReportInfo {
        title: header.title,
        runs: entries
            .into_iter()
            .map(|entry| (entry.runid.clone(), entry))
            .collect(),
    })
}
