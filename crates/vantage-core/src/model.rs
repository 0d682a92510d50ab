//! Report domain model: Report → Sections → Blocks → Results.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Local, NaiveDateTime};
use globset::Glob;
use regex::Regex;

use crate::error::{Result, VantageError};
use crate::result::ReportResult;
use crate::status::{Status, status_max};
use crate::text::slugify;

/// Run ids derived from timestamps use this format.
pub const RUN_ID_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Positional address of an element inside a report. Assigned after
/// load, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementAddr {
    pub section: usize,
    pub block: Option<usize>,
    pub result: Option<usize>,
}

impl ElementAddr {
    #[must_use]
    pub fn id_string(&self) -> String {
        let mut parts = vec![self.section.to_string()];
        if let Some(block) = self.block {
            parts.push(block.to_string());
            if let Some(result) = self.result {
                parts.push(result.to_string());
            }
        }
        parts.join("-")
    }
}

/// Navigational link attached to a block. The presentation layer maps
/// `endpoint_id` to a configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub endpoint_id: String,
    pub path: String,
    pub text: String,
}

/// One evaluated check's output.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub title: String,
    pub results: Vec<ReportResult>,
    pub status: Status,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub emphasize: bool,
    pub link: Option<Link>,
    pub addr: Option<ElementAddr>,
}

impl Block {
    /// Build a block; status defaults to the worst result status.
    pub fn new(title: impl Into<String>, results: Vec<ReportResult>) -> Self {
        let status = status_max(results.iter().map(ReportResult::status)).unwrap_or_default();
        Self {
            title: title.into(),
            results,
            status,
            tags: Vec::new(),
            description: None,
            emphasize: false,
            link: None,
            addr: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Attach tags; duplicates collapse (set semantics).
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        self.tags = unique.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn emphasize(mut self) -> Self {
        self.emphasize = true;
        self
    }

    #[must_use]
    pub fn with_link(mut self, link: Link) -> Self {
        self.link = Some(link);
        self
    }
}

/// Named, display-ordered grouping of blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub description: String,
    pub blocks: Vec<Block>,
    pub addr: Option<ElementAddr>,
}

impl Section {
    pub fn new(title: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            blocks,
            addr: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Top-level bundle of checks generated together. The (id, run_id) pair
/// is the unique storage address; storing a run again under the same
/// run_id supersedes the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub title: String,
    pub id: String,
    pub run_id: String,
    pub run_title: String,
    pub timestamp: NaiveDateTime,
    pub sections: Vec<Section>,
}

impl Report {
    #[must_use]
    pub fn builder(title: impl Into<String>) -> ReportBuilder {
        ReportBuilder::new(title)
    }

    pub fn timestamp_from_run_id(run_id: &str) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(run_id, RUN_ID_FORMAT)
            .map_err(|err| VantageError::Validation(format!("run id is not a timestamp: {err}")))
    }

    /// Assign positional addresses to sections and blocks. Recomputed on
    /// every load, never persisted. Results carry no address of their
    /// own; they are reached positionally through [`Report::get_element`]
    /// and the find functions.
    pub fn assign_addresses(&mut self) {
        for (s, section) in self.sections.iter_mut().enumerate() {
            section.addr = Some(ElementAddr {
                section: s,
                block: None,
                result: None,
            });
            for (b, block) in section.blocks.iter_mut().enumerate() {
                block.addr = Some(ElementAddr {
                    section: s,
                    block: Some(b),
                    result: None,
                });
            }
        }
    }

    #[must_use]
    pub fn get_element(&self, addr: ElementAddr) -> Option<ReportElement<'_>> {
        let section = self.sections.get(addr.section)?;
        let Some(b) = addr.block else {
            return Some(ReportElement::Section(section));
        };
        let block = section.blocks.get(b)?;
        let Some(r) = addr.result else {
            return Some(ReportElement::Block(block));
        };
        block.results.get(r).map(ReportElement::Result)
    }

    pub fn iter_blocks(&self) -> impl Iterator<Item = &Block> {
        self.sections.iter().flat_map(|section| section.blocks.iter())
    }

    pub fn iter_results(&self) -> impl Iterator<Item = &ReportResult> {
        self.iter_blocks().flat_map(|block| block.results.iter())
    }

    pub(crate) fn iter_results_mut(&mut self) -> impl Iterator<Item = &mut ReportResult> {
        self.sections
            .iter_mut()
            .flat_map(|section| section.blocks.iter_mut())
            .flat_map(|block| block.results.iter_mut())
    }

    /// Blocks at or above a minimum status, in display order.
    pub fn blocks_at_least(&self, min_status: Status) -> impl Iterator<Item = &Block> {
        self.iter_blocks().filter(move |block| block.status >= min_status)
    }

    /// Worst block status in the report; neutral when empty.
    #[must_use]
    pub fn worst_status(&self) -> Status {
        status_max(self.iter_blocks().map(|block| block.status)).unwrap_or_default()
    }

    /// Count of blocks per status value. Every status appears in the
    /// map, zero-filled, so index summaries are shape-stable.
    #[must_use]
    pub fn status_stats(&self) -> BTreeMap<Status, u64> {
        let mut stats: BTreeMap<Status, u64> = Status::ALL.iter().map(|s| (*s, 0)).collect();
        for block in self.iter_blocks() {
            *stats.entry(block.status).or_insert(0) += 1;
        }
        stats
    }

    /// Find result addresses by a `section/block/result` glob pattern
    /// over titles. Missing pattern parts match everything; untitled
    /// results match everything.
    pub fn find_glob(&self, pattern: &str) -> Result<Vec<ElementAddr>> {
        let matchers = pattern
            .split('/')
            .map(|part| {
                let part = if part.is_empty() { "*" } else { part };
                Glob::new(&part.to_lowercase())
                    .map(|g| g.compile_matcher())
                    .map_err(|e| VantageError::Validation(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        let matcher = |title: Option<&str>, level: usize| -> bool {
            let Some(m) = matchers.get(level) else {
                return true;
            };
            title.is_none_or(|t| m.is_match(t.to_lowercase()))
        };
        Ok(self.find_matching(&matcher))
    }

    /// Find result addresses by a `section/block/result` regex pattern
    /// over titles. Missing parts and empty patterns match everything.
    pub fn find_regex(&self, pattern: &str) -> Result<Vec<ElementAddr>> {
        let regexes = pattern
            .split('/')
            .map(|part| Regex::new(part).map_err(|e| VantageError::Validation(e.to_string())))
            .collect::<Result<Vec<_>>>()?;
        let matcher = |title: Option<&str>, level: usize| -> bool {
            let Some(re) = regexes.get(level) else {
                return true;
            };
            title.is_none_or(|t| re.is_match(t))
        };
        Ok(self.find_matching(&matcher))
    }

    fn find_matching(&self, matches: &dyn Fn(Option<&str>, usize) -> bool) -> Vec<ElementAddr> {
        let mut out = Vec::new();
        for (s, section) in self.sections.iter().enumerate() {
            if !matches(Some(&section.title), 0) {
                continue;
            }
            for (b, block) in section.blocks.iter().enumerate() {
                if !matches(Some(&block.title), 1) {
                    continue;
                }
                for (r, result) in block.results.iter().enumerate() {
                    if matches(result.title(), 2) {
                        out.push(ElementAddr {
                            section: s,
                            block: Some(b),
                            result: Some(r),
                        });
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReportElement<'a> {
    Section(&'a Section),
    Block(&'a Block),
    Result(&'a ReportResult),
}

/// Builder applying the id/run-id/run-title derivation rules.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    title: String,
    sections: Vec<Section>,
    run_id: Option<String>,
    run_title: Option<String>,
    timestamp: Option<NaiveDateTime>,
}

impl ReportBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            sections: Vec::new(),
            run_id: None,
            run_title: None,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    #[must_use]
    pub fn sections(mut self, sections: Vec<Section>) -> Self {
        self.sections = sections;
        self
    }

    #[must_use]
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    #[must_use]
    pub fn run_title(mut self, run_title: impl Into<String>) -> Self {
        self.run_title = Some(run_title.into());
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn build(self) -> Report {
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| Local::now().naive_local());
        let run_id = match &self.run_id {
            Some(raw) => slugify(raw),
            None => timestamp.format(RUN_ID_FORMAT).to_string(),
        };
        let run_title = self
            .run_title
            .or(self.run_id)
            .unwrap_or_else(|| timestamp.format("%Y-%m-%d %H:%M:%S").to_string());
        Report {
            id: slugify(&self.title),
            title: self.title,
            run_id,
            run_title,
            timestamp,
            sections: self.sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::result::TextResult;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .expect("date")
            .and_hms_opt(0, 0, 0)
            .expect("time")
    }

    fn text(title: &str, status: Status) -> ReportResult {
        ReportResult::Text(TextResult::new(title, Some(status), None))
    }

    fn sample_report() -> Report {
        Report::builder("Nightly Build")
            .timestamp(ts())
            .section(Section::new(
                "Checks",
                vec![
                    Block::new("latency", vec![text("p99", Status::Good)]),
                    Block::new(
                        "errors",
                        vec![text("count", Status::Warning), text("rate", Status::Good)],
                    ),
                ],
            ))
            .build()
    }

    #[test]
    fn builder_derives_id_and_run_id() {
        let report = sample_report();
        assert_eq!(report.id, "nightly-build");
        assert_eq!(report.run_id, "2024_01_01_00_00_00");
        assert_eq!(report.run_title, "2024-01-01 00:00:00");
    }

    #[test]
    fn explicit_run_id_is_slugified_and_becomes_run_title() {
        let report = Report::builder("R")
            .timestamp(ts())
            .run_id("Release Candidate 1")
            .build();
        assert_eq!(report.run_id, "release-candidate-1");
        assert_eq!(report.run_title, "Release Candidate 1");
    }

    #[test]
    fn timestamp_roundtrips_through_run_id() {
        let report = sample_report();
        assert_eq!(
            Report::timestamp_from_run_id(&report.run_id).expect("parse"),
            ts()
        );
        assert!(Report::timestamp_from_run_id("not-a-timestamp").is_err());
    }

    #[test]
    fn block_status_is_worst_of_results() {
        let report = sample_report();
        let statuses: Vec<Status> = report.iter_blocks().map(|b| b.status).collect();
        assert_eq!(statuses, vec![Status::Good, Status::Warning]);
        assert_eq!(report.worst_status(), Status::Warning);
    }

    #[test]
    fn status_stats_counts_blocks_and_is_zero_filled() {
        let report = sample_report();
        let stats = report.status_stats();
        assert_eq!(stats[&Status::Neutral], 0);
        assert_eq!(stats[&Status::Good], 1);
        assert_eq!(stats[&Status::Warning], 1);
        assert_eq!(stats[&Status::Bad], 0);
    }

    #[test]
    fn tags_collapse_duplicates() {
        let block = Block::new("b", vec![]).with_tags(["x", "y", "x"]);
        assert_eq!(block.tags, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn addresses_are_assigned_positionally() {
        let mut report = sample_report();
        report.assign_addresses();
        let addr = report.sections[0].blocks[1].addr.expect("addr");
        assert_eq!(addr.id_string(), "0-1");
        assert!(matches!(
            report.get_element(addr),
            Some(ReportElement::Block(block)) if block.title == "errors"
        ));

        // results are addressable even though they carry no addr field
        let result_addr = report.find_glob("*/errors/count").expect("glob")[0];
        assert!(matches!(
            report.get_element(result_addr),
            Some(ReportElement::Result(ReportResult::Text(text))) if text.title == "count"
        ));
    }

    #[test]
    fn find_glob_matches_title_path() {
        let report = sample_report();
        let found = report.find_glob("*/errors/*").expect("glob");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id_string(), "0-1-0");

        let all = report.find_glob("*").expect("glob");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn find_regex_matches_title_path() {
        let report = sample_report();
        let found = report.find_regex("Checks/err/count").expect("regex");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id_string(), "0-1-0");
    }
}
