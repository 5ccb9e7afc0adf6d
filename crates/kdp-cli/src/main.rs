use std::path::PathBuf;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use kdp_core::{Month, ReportingWindow, Snapshot};
use kdp_engine::{aggregate, fee, DashboardQuery, EngineConfig};
use kdp_storage::{ReportStore, SnapshotStore};
use serde_json::json;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "kdp-cli")]
#[command(about = "Contract brokerage opportunity scoring and revenue pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct SnapshotArg {
    /// JSON snapshot with `opportunities` and `revenue_events`.
    #[arg(long, default_value = "snapshot.json")]
    snapshot: PathBuf,
}

#[derive(Debug, Args)]
struct WindowArgs {
    /// First month of the reporting window (YYYY-MM).
    #[arg(long)]
    from: Option<Month>,
    /// Last month of the reporting window (YYYY-MM).
    #[arg(long)]
    to: Option<Month>,
    /// Window length when `--from` is not given.
    #[arg(long, default_value_t = 12)]
    months: u32,
    /// Reference date for recency scoring; defaults to today (UTC).
    #[arg(long)]
    as_of: Option<NaiveDate>,
}

impl WindowArgs {
    fn as_of(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn resolve(&self) -> Result<ReportingWindow> {
        let as_of = self.as_of();
        let window = match (self.from, self.to) {
            (Some(start), Some(end)) => ReportingWindow::new(start, end, as_of)?,
            (Some(start), None) => ReportingWindow::new(start, Month::from_date(as_of), as_of)?,
            (None, Some(end)) => ReportingWindow::ending(end, self.months, as_of)?,
            (None, None) => ReportingWindow::trailing_months(as_of, self.months)?,
        };
        Ok(window)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Dashboard KPIs, top agencies, monthly revenue and pipeline.
    Stats {
        #[command(flatten)]
        snapshot: SnapshotArg,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Score-bucketed pipeline over every opportunity in the snapshot.
    Pipeline {
        #[command(flatten)]
        snapshot: SnapshotArg,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Skip invalid opportunities instead of failing.
        #[arg(long)]
        lenient: bool,
    },
    /// Gap-filled monthly brokerage revenue.
    Revenue {
        #[command(flatten)]
        snapshot: SnapshotArg,
        #[command(flatten)]
        window: WindowArgs,
    },
    Agencies {
        #[command(flatten)]
        snapshot: SnapshotArg,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Value distribution and NAICS performance.
    Metrics {
        #[command(flatten)]
        snapshot: SnapshotArg,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    Activity {
        #[command(flatten)]
        snapshot: SnapshotArg,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Brokerage fee for a contract value at the standard rate.
    Fee {
        #[arg(long, allow_negative_numbers = true)]
        value: f64,
    },
    /// Append a placement to the snapshot's revenue log.
    Record {
        #[command(flatten)]
        snapshot: SnapshotArg,
        #[arg(long)]
        value: f64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        contract: Option<String>,
    },
    /// Append a correction for an earlier revenue event.
    Adjust {
        #[command(flatten)]
        snapshot: SnapshotArg,
        #[arg(long)]
        corrects: Uuid,
        #[arg(long, allow_negative_numbers = true)]
        delta: f64,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Write the weekly brief and dashboard JSON to the reports directory.
    Report {
        #[command(flatten)]
        snapshot: SnapshotArg,
        #[command(flatten)]
        window: WindowArgs,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn load_or_empty(store: &SnapshotStore) -> Result<Snapshot> {
    if store.path().exists() {
        store.load().await
    } else {
        warn!(path = %store.path().display(), "snapshot not found; starting empty");
        Ok(Snapshot::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let query = DashboardQuery::new(EngineConfig::from_env()?)?;

    match cli.command {
        Commands::Stats { snapshot, window } => {
            let snapshot = SnapshotStore::new(snapshot.snapshot).load().await?;
            let stats = query.get_dashboard_stats(&snapshot, &window.resolve()?)?;
            print_json(&stats)?;
        }
        Commands::Pipeline {
            snapshot,
            as_of,
            lenient,
        } => {
            let snapshot = SnapshotStore::new(snapshot.snapshot).load().await?;
            let as_of = as_of.unwrap_or_else(today);
            let pipeline = if lenient {
                let outcome = query.scorer().score_all(&snapshot.opportunities, as_of);
                aggregate(&outcome.scored)
            } else {
                query.get_opportunity_pipeline(&snapshot.opportunities, as_of)?
            };
            print_json(&pipeline)?;
        }
        Commands::Revenue { snapshot, window } => {
            let snapshot = SnapshotStore::new(snapshot.snapshot).load().await?;
            let monthly = query.get_monthly_revenue(&snapshot.revenue_events, &window.resolve()?)?;
            print_json(&monthly)?;
        }
        Commands::Agencies { snapshot, limit } => {
            let snapshot = SnapshotStore::new(snapshot.snapshot).load().await?;
            let limit = limit.unwrap_or(query.config().top_agencies_limit);
            print_json(&query.get_top_agencies(&snapshot.opportunities, limit))?;
        }
        Commands::Metrics { snapshot, as_of } => {
            let snapshot = SnapshotStore::new(snapshot.snapshot).load().await?;
            let metrics = query.get_performance_metrics(&snapshot, as_of.unwrap_or_else(today));
            print_json(&metrics)?;
        }
        Commands::Activity { snapshot, limit } => {
            let snapshot = SnapshotStore::new(snapshot.snapshot).load().await?;
            print_json(&query.get_recent_activity(&snapshot, limit))?;
        }
        Commands::Fee { value } => {
            let amount = fee(value)?;
            print_json(&json!({
                "contract_value": value,
                "fee_percentage": kdp_core::BROKERAGE_RATE * 100.0,
                "fee_amount": amount,
            }))?;
        }
        Commands::Record {
            snapshot,
            value,
            date,
            contract,
        } => {
            let store = SnapshotStore::new(snapshot.snapshot);
            let mut snapshot = load_or_empty(&store).await?;
            let mut ledger = query.ledger(std::mem::take(&mut snapshot.revenue_events))?;
            let event = match contract {
                Some(contract_ref) => {
                    query.record_placement_for(&mut ledger, contract_ref, value, date)?
                }
                None => query.record_placement(&mut ledger, value, date)?,
            };
            snapshot.revenue_events = ledger.into_events();
            store.save(&snapshot).await?;
            print_json(&event)?;
        }
        Commands::Adjust {
            snapshot,
            corrects,
            delta,
            date,
        } => {
            let store = SnapshotStore::new(snapshot.snapshot);
            let mut snapshot = store.load().await?;
            let mut ledger = query.ledger(std::mem::take(&mut snapshot.revenue_events))?;
            let event = query.record_adjustment(&mut ledger, corrects, delta, date)?;
            snapshot.revenue_events = ledger.into_events();
            store.save(&snapshot).await?;
            print_json(&event)?;
        }
        Commands::Report { snapshot, window } => {
            let snapshot = SnapshotStore::new(snapshot.snapshot).load().await?;
            let window = window.resolve()?;
            let stats = query.get_dashboard_stats(&snapshot, &window)?;
            let weekly = query.get_weekly_report(&snapshot, window.as_of)?;

            let reports = ReportStore::new(query.config().reports_dir.clone());
            let (run_dir, manifest) = reports
                .write_run(
                    Utc::now(),
                    &[
                        ("weekly_brief.md", weekly.to_markdown().into_bytes()),
                        ("weekly_report.json", serde_json::to_vec_pretty(&weekly)?),
                        ("dashboard.json", serde_json::to_vec_pretty(&stats)?),
                    ],
                )
                .await?;
            println!(
                "report complete: run_id={} files={} dir={}",
                manifest.run_id,
                manifest.files.len(),
                run_dir.display()
            );
        }
    }

    Ok(())
}
