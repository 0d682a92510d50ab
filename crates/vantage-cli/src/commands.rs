use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{Duration, Local};
use serde::Serialize;
use serde_json::json;
use vantage_core::{Catalog, FsStore, ResultRegistry, index, reports, serialize};

use crate::cli::Commands;

pub(crate) fn run(root: &Path, command: Commands) -> Result<()> {
    let store = FsStore::open(root).context("failed to open store")?;
    let registry = ResultRegistry::with_builtins();

    match command {
        Commands::Reports => {
            let catalog = Catalog::new(Arc::new(store));
            let entries: Vec<_> = catalog
                .find_reports()?
                .into_iter()
                .map(|entry| {
                    json!({
                        "id": entry.id,
                        "title": entry.title,
                        "runs": entry.runs.len(),
                        "latest": entry.latest_run().map(|run| run.runid.clone()),
                    })
                })
                .collect();
            print_json(&entries)?;
        }
        Commands::Runs(args) => {
            for run in index::list_runs(&store, &args.report_id)? {
                println!("{run}");
            }
        }
        Commands::Info(args) => {
            let info =
                index::get_report_info(&store, &args.report_id, args.check, args.repair, &registry)?;
            print_json(&json!({"title": info.title, "runs": info.runs}))?;
        }
        Commands::Repair(args) => {
            let repair = index::check_and_repair(&store, &args.report_id, &registry)?;
            print_json(&json!({"added": repair.added, "removed": repair.removed}))?;
        }
        Commands::Show(args) => {
            let report = reports::read_report(&store, &args.report_id, &args.run_id, &registry)?;
            print_json(&serialize::encode_report(&report, &registry)?)?;
        }
        Commands::DeleteRun(args) => {
            reports::delete_run(&store, &args.report_id, &args.run_id)?;
            println!("deleted {}/{}", args.report_id, args.run_id);
        }
        Commands::Prune(args) => {
            let deleted = match (args.older_than_days, args.keep) {
                (Some(days), None) => {
                    let cutoff = Local::now().naive_local() - Duration::days(i64::from(days));
                    reports::delete_older_than(
                        &store,
                        &args.report_id,
                        cutoff,
                        args.dry_run,
                        &registry,
                    )?
                }
                (None, Some(keep)) => reports::delete_keeping_latest(
                    &store,
                    &args.report_id,
                    keep,
                    args.dry_run,
                    &registry,
                )?,
                _ => bail!("pass exactly one of --older-than-days or --keep"),
            };
            print_json(&json!({"dry_run": args.dry_run, "deleted": deleted}))?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use vantage_core::{Block, Report, ReportResult, Section, Status, TextResult};

    use super::*;
    use crate::cli::{InfoArgs, PruneArgs, ReportArg, RunArgs};

    fn seed(root: &Path, day: u32) -> Report {
        let store = FsStore::open(root).expect("open");
        let mut report = Report::builder("Nightly Build")
            .timestamp(
                chrono::NaiveDate::from_ymd_opt(2024, 1, day)
                    .expect("date")
                    .and_hms_opt(0, 0, 0)
                    .expect("time"),
            )
            .section(Section::new(
                "Checks",
                vec![Block::new(
                    "b",
                    vec![ReportResult::Text(TextResult::new(
                        "t",
                        Some(Status::Good),
                        None,
                    ))],
                )],
            ))
            .build();
        report
            .store(&store, &ResultRegistry::with_builtins())
            .expect("store");
        report
    }

    #[test]
    fn info_and_show_read_back_a_seeded_run() {
        let temp = tempdir().expect("tempdir");
        let report = seed(temp.path(), 1);

        run(
            temp.path(),
            Commands::Info(InfoArgs {
                report_id: report.id.clone(),
                check: true,
                repair: true,
            }),
        )
        .expect("info");
        run(
            temp.path(),
            Commands::Show(RunArgs {
                report_id: report.id.clone(),
                run_id: report.run_id.clone(),
            }),
        )
        .expect("show");
        run(
            temp.path(),
            Commands::Runs(ReportArg {
                report_id: report.id,
            }),
        )
        .expect("runs");
    }

    #[test]
    fn delete_run_removes_the_stored_run() {
        let temp = tempdir().expect("tempdir");
        let report = seed(temp.path(), 1);

        run(
            temp.path(),
            Commands::DeleteRun(RunArgs {
                report_id: report.id.clone(),
                run_id: report.run_id.clone(),
            }),
        )
        .expect("delete");

        let store = FsStore::open(temp.path()).expect("open");
        assert!(
            index::list_runs(&store, &report.id)
                .expect("runs")
                .is_empty()
        );
    }

    #[test]
    fn prune_requires_exactly_one_selector() {
        let temp = tempdir().expect("tempdir");
        seed(temp.path(), 1);
        let err = run(
            temp.path(),
            Commands::Prune(PruneArgs {
                report_id: "nightly-build".to_string(),
                older_than_days: None,
                keep: None,
                dry_run: true,
            }),
        )
        .expect_err("selector required");
        assert!(err.to_string().contains("--older-than-days"));
    }

    #[test]
    fn prune_keep_retains_newest_runs() {
        let temp = tempdir().expect("tempdir");
        seed(temp.path(), 1);
        seed(temp.path(), 2);

        run(
            temp.path(),
            Commands::Prune(PruneArgs {
                report_id: "nightly-build".to_string(),
                older_than_days: None,
                keep: Some(1),
                dry_run: false,
            }),
        )
        .expect("prune");

        let store = FsStore::open(temp.path()).expect("open");
        assert_eq!(
            index::list_runs(&store, "nightly-build").expect("runs"),
            vec!["2024_01_02_00_00_00".to_string()]
        );
    }
}
