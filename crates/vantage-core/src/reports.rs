//! Report persistence and the catalog view.
//!
//! A run is stored under `<report_id>/<run_id>/` as the main JSON
//! document plus the optional side-channel blob, and summarized in the
//! report's run index. Storing a run under an existing (id, run_id) pair
//! supersedes the previous data.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::config::catalog_cache_ttl;
use crate::cache::TtlCache;
use crate::error::{Result, VantageError};
use crate::externals::{self, RESOURCE_BLOB};
use crate::index::{self, ReportInfo, RunEntry};
use crate::key::{join_key, split_key};
use crate::model::Report;
use crate::registry::ResultRegistry;
use crate::serialize;
use crate::store::KeyValueStore;

/// Name of the main document under a run's prefix.
pub const MAIN_DOCUMENT: &str = "report.json";

impl Report {
    /// Persist this run: externals blob, main document, index entry.
    ///
    /// Any previous data under the same (id, run_id) pair is removed
    /// first. If a later step fails the partially written keys are
    /// deleted again, so a run is either fully stored or absent.
    pub fn store(&mut self, store: &dyn KeyValueStore, registry: &ResultRegistry) -> Result<()> {
        let main_key = join_key([self.id.as_str(), self.run_id.as_str(), MAIN_DOCUMENT]);
        let res_key = join_key([self.id.as_str(), self.run_id.as_str(), RESOURCE_BLOB]);
        store.delete(&main_key)?;
        store.delete(&res_key)?;

        if let Err(err) = self.store_inner(store, registry, &main_key, &res_key) {
            let _ = store.delete(&main_key);
            let _ = store.delete(&res_key);
            return Err(err);
        }
        debug!(report_id = %self.id, run_id = %self.run_id, "stored report run");
        Ok(())
    }

    fn store_inner(
        &mut self,
        store: &dyn KeyValueStore,
        registry: &ResultRegistry,
        main_key: &str,
        res_key: &str,
    ) -> Result<()> {
        let external_values = externals::collect(self);
        if !external_values.is_empty() {
            store.put(res_key, &externals::encode_blob(&external_values)?)?;
        }
        store.put(main_key, &serialize::encode_document(self, registry)?)?;
        index::add_to_index(store, self)?;
        index::check_and_repair(store, &self.id, registry)?;
        Ok(())
    }

    /// Load a run from its main-document key: decode, re-attach the
    /// side-channel data, assign element addresses.
    pub fn from_storage(
        store: &dyn KeyValueStore,
        key: &str,
        registry: &ResultRegistry,
    ) -> Result<Report> {
        let bytes = store.get(key)?;
        let (mut report, _) = serialize::decode_document(&bytes, registry)?;

        // the storage prefix, not the document title, names the report
        let parts = split_key(key);
        if parts.len() >= 4 {
            report.id = parts[parts.len() - 4].to_string();
        }

        externals::load_for_report(store, &mut report)?;
        report.assign_addresses();
        Ok(report)
    }
}

/// Load one run of one report.
pub fn read_report(
    store: &dyn KeyValueStore,
    report_id: &str,
    run_id: &str,
    registry: &ResultRegistry,
) -> Result<Report> {
    let key = join_key([report_id, run_id, MAIN_DOCUMENT]);
    if !store.contains(&key)? {
        return Err(VantageError::NotFound(format!("{report_id}/{run_id}")));
    }
    Report::from_storage(store, &key, registry)
}

/// Remove every stored key of one run, then its index entry.
pub fn delete_run(store: &dyn KeyValueStore, report_id: &str, run_id: &str) -> Result<()> {
    for key in store.keys()? {
        let parts = split_key(&key);
        if parts.len() >= 3 && parts[0] == report_id && parts[1] == run_id {
            store.delete(&key)?;
        }
    }
    index::remove_from_index(store, report_id, run_id)
}

/// Delete runs whose timestamp is strictly before the cutoff. Returns
/// the affected run ids, oldest first; with `dry_run` nothing is
/// deleted.
pub fn delete_older_than(
    store: &dyn KeyValueStore,
    report_id: &str,
    cutoff: NaiveDateTime,
    dry_run: bool,
    registry: &ResultRegistry,
) -> Result<Vec<String>> {
    prune(store, report_id, dry_run, registry, |entries| {
        entries
            .iter()
            .filter(|entry| entry.timestamp < cutoff)
            .map(|entry| entry.runid.clone())
            .collect()
    })
}

/// Delete all but the newest `keep` runs. Returns the affected run ids,
/// oldest first; with `dry_run` nothing is deleted.
pub fn delete_keeping_latest(
    store: &dyn KeyValueStore,
    report_id: &str,
    keep: usize,
    dry_run: bool,
    registry: &ResultRegistry,
) -> Result<Vec<String>> {
    prune(store, report_id, dry_run, registry, |entries| {
        if entries.len() <= keep {
            return Vec::new();
        }
        entries[..entries.len() - keep]
            .iter()
            .map(|entry| entry.runid.clone())
            .collect()
    })
}

fn prune(
    store: &dyn KeyValueStore,
    report_id: &str,
    dry_run: bool,
    registry: &ResultRegistry,
    select: impl Fn(&[RunEntry]) -> Vec<String>,
) -> Result<Vec<String>> {
    // deleting from a drifted index would miss or invent runs
    if !dry_run {
        index::check_and_repair(store, report_id, registry)?;
    }
    let info = index::get_report_info(store, report_id, false, false, registry)?;
    let mut entries: Vec<RunEntry> = info.runs.into_values().collect();
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.runid.cmp(&b.runid)));

    let doomed = select(&entries);
    if !dry_run {
        for run_id in &doomed {
            delete_run(store, report_id, run_id)?;
        }
    }
    Ok(doomed)
}

/// Catalog entry: one report id with its index summary.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub runs: BTreeMap<String, RunEntry>,
}

impl CatalogEntry {
    /// Newest run by timestamp, if any.
    #[must_use]
    pub fn latest_run(&self) -> Option<&RunEntry> {
        self.runs.values().max_by_key(|entry| entry.timestamp)
    }
}

/// Read-side view over all stored reports, with a time-expiring cache
/// of per-report index summaries.
pub struct Catalog {
    store: Arc<dyn KeyValueStore>,
    registry: ResultRegistry,
    cache: TtlCache<String, ReportInfo>,
}

impl Catalog {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_registry(store, ResultRegistry::with_builtins())
    }

    #[must_use]
    pub fn with_registry(store: Arc<dyn KeyValueStore>, registry: ResultRegistry) -> Self {
        Self {
            store,
            registry,
            cache: TtlCache::new(catalog_cache_ttl()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &ResultRegistry {
        &self.registry
    }

    /// All reports with their run summaries, sorted by report id.
    pub fn find_reports(&self) -> Result<Vec<CatalogEntry>> {
        let mut out = Vec::new();
        for id in index::list_reports(self.store.as_ref())? {
            let info = self.report_info(&id)?;
            out.push(CatalogEntry {
                id,
                title: info.title,
                runs: info.runs,
            });
        }
        Ok(out)
    }

    /// One report's index summary, served from cache when fresh. A read
    /// failure falls back to the last known summary if one exists.
    pub fn report_info(&self, report_id: &str) -> Result<ReportInfo> {
        let key = report_id.to_string();
        if let Some(info) = self.cache.get(&key) {
            return Ok(info);
        }
        match index::get_report_info(self.store.as_ref(), report_id, false, false, &self.registry) {
            Ok(info) => {
                self.cache.insert(key, info.clone());
                Ok(info)
            }
            Err(err) => match self.cache.peek_stale(&key) {
                Some(stale) => {
                    warn!(report_id, %err, "serving stale catalog entry after read failure");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;
    use crate::model::{Block, Section};
    use crate::result::{ImageResult, ReportResult, TableResult, TextResult};
    use crate::status::Status;
    use crate::store::{FsStore, MemoryStore};
    use crate::table::{Cell, Table};

    fn registry() -> ResultRegistry {
        ResultRegistry::with_builtins()
    }

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .expect("date")
            .and_hms_opt(0, 0, 0)
            .expect("time")
    }

    fn good_table() -> Table {
        Table::from_rows(
            &["a", "b"],
            vec![
                vec![Cell::Int(1), Cell::Int(1)],
                vec![Cell::Int(1), Cell::Int(1)],
            ],
        )
        .expect("table")
    }

    fn nightly_report(day: u32) -> Report {
        let table = good_table();
        Report::builder("Nightly Build")
            .timestamp(ts(day))
            .section(Section::new(
                "Checks",
                vec![Block::new(
                    "cell health",
                    vec![ReportResult::Table(
                        TableResult::new("statuses", Some(table.clone()), &[table])
                            .expect("result"),
                    )],
                )],
            ))
            .build()
    }

    #[test]
    fn store_and_read_roundtrip_with_externals() {
        let store = MemoryStore::new();
        let mut report = nightly_report(1);
        report.store(&store, &registry()).expect("store");

        let loaded =
            read_report(&store, "nightly-build", &report.run_id, &registry()).expect("read");
        assert_eq!(loaded.title, "Nightly Build");
        assert_eq!(loaded.run_id, report.run_id);
        let ReportResult::Table(table) = loaded.iter_results().next().expect("result") else {
            panic!("wrong variant");
        };
        assert_eq!(table.data.as_ref().expect("side channel data"), &good_table());
        assert!(table.status_table.is_some());
        assert!(loaded.sections[0].addr.is_some());
    }

    #[test]
    fn stored_run_summarizes_block_statuses_in_the_index() {
        let store = MemoryStore::new();
        let mut report = nightly_report(1);
        report.store(&store, &registry()).expect("store");

        let info = index::get_report_info(&store, "nightly-build", false, false, &registry())
            .expect("info");
        let entry = &info.runs[&report.run_id];
        assert_eq!(entry.status[&Status::Good], 1);
        assert_eq!(entry.status[&Status::Neutral], 0);
        assert_eq!(entry.status[&Status::Bad], 0);
    }

    #[test]
    fn restoring_a_run_supersedes_it() {
        let store = MemoryStore::new();
        let mut first = nightly_report(1);
        first.store(&store, &registry()).expect("store");
        let mut second = nightly_report(1);
        second.sections[0].blocks[0].title = "rewritten".to_string();
        second.store(&store, &registry()).expect("store again");

        let loaded =
            read_report(&store, "nightly-build", &first.run_id, &registry()).expect("read");
        assert_eq!(loaded.sections[0].blocks[0].title, "rewritten");
        assert_eq!(
            index::list_runs(&store, "nightly-build").expect("runs"),
            vec![first.run_id]
        );
    }

    #[test]
    fn reading_a_missing_run_is_not_found() {
        let store = MemoryStore::new();
        let err = read_report(&store, "nope", "run", &registry()).expect_err("missing");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn run_without_external_data_stores_no_blob() {
        let store = MemoryStore::new();
        let mut report = Report::builder("Plain")
            .timestamp(ts(1))
            .section(Section::new(
                "s",
                vec![Block::new(
                    "b",
                    vec![ReportResult::Text(TextResult::new("t", None, None))],
                )],
            ))
            .build();
        report.store(&store, &registry()).expect("store");
        assert!(
            !store
                .contains(&join_key(["plain", report.run_id.as_str(), RESOURCE_BLOB]))
                .expect("contains")
        );
    }

    #[test]
    fn delete_run_removes_data_and_index_entry() {
        let store = MemoryStore::new();
        let mut report = nightly_report(1);
        let mut image = ImageResult::from_bytes(None, "shot.png", vec![1, 2, 3]);
        image.external_key = Some("imgkey01".to_string());
        report.sections[0]
            .blocks[0]
            .results
            .push(ReportResult::Image(image));
        report.store(&store, &registry()).expect("store");

        delete_run(&store, "nightly-build", &report.run_id).expect("delete");
        assert!(index::list_runs(&store, "nightly-build").expect("runs").is_empty());
        let info = index::get_report_info(&store, "nightly-build", false, false, &registry())
            .expect("info");
        assert!(info.runs.is_empty());
    }

    #[test]
    fn prune_by_age_and_by_count() {
        let store = MemoryStore::new();
        for day in 1..=3 {
            nightly_report(day).store(&store, &registry()).expect("store");
        }

        let dry = delete_older_than(&store, "nightly-build", ts(3), true, &registry())
            .expect("dry run");
        assert_eq!(dry.len(), 2);
        assert_eq!(
            index::list_runs(&store, "nightly-build").expect("runs").len(),
            3
        );

        let deleted = delete_keeping_latest(&store, "nightly-build", 1, false, &registry())
            .expect("prune");
        assert_eq!(
            deleted,
            vec![
                "2024_01_01_00_00_00".to_string(),
                "2024_01_02_00_00_00".to_string()
            ]
        );
        assert_eq!(
            index::list_runs(&store, "nightly-build").expect("runs"),
            vec!["2024_01_03_00_00_00".to_string()]
        );
    }

    #[test]
    fn catalog_lists_reports_and_caches_summaries() {
        let store = Arc::new(MemoryStore::new());
        nightly_report(1)
            .store(store.as_ref(), &registry())
            .expect("store");

        let catalog = Catalog::new(store.clone());
        let entries = catalog.find_reports().expect("find");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "nightly-build");
        assert_eq!(entries[0].title, "Nightly Build");
        assert_eq!(
            entries[0].latest_run().expect("run").runid,
            "2024_01_01_00_00_00"
        );

        // second run lands while the summary is cached
        nightly_report(2)
            .store(store.as_ref(), &registry())
            .expect("store");
        assert_eq!(catalog.report_info("nightly-build").expect("info").runs.len(), 1);

        catalog.cache.expire_all();
        assert_eq!(catalog.report_info("nightly-build").expect("info").runs.len(), 2);
    }

    #[test]
    fn roundtrip_on_filesystem_store() {
        let temp = tempdir().expect("tempdir");
        let store = FsStore::open(temp.path()).expect("open");
        let mut report = nightly_report(1);
        report.store(&store, &registry()).expect("store");

        assert!(temp.path().join("nightly-build/index").is_file());
        assert!(
            temp.path()
                .join("nightly-build")
                .join(&report.run_id)
                .join(MAIN_DOCUMENT)
                .is_file()
        );

        let loaded =
            read_report(&store, "nightly-build", &report.run_id, &registry()).expect("read");
        assert_eq!(loaded.worst_status(), Status::Good);
    }
}
