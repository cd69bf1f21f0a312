use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kudos_corner::config::AppConfig;
use kudos_corner::db::{self, PgRecordStore};
use kudos_corner::leaderboard::ScoreField;
use kudos_corner::table::{MembersTable, SortDirection, SortField};
use kudos_corner::{report, server, telemetry};
use kudos_corner::{DashboardService, InMemoryRecordStore, RecordStore, ScopeFilter};

#[derive(Parser)]
#[command(name = "kudos-corner")]
#[command(about = "Team recognition analytics for the Kudos Corner dashboard", long_about = None)]
struct Cli {
    /// Use the bundled sample team instead of DATABASE_URL
    #[arg(long, global = true)]
    sample: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// Quarter to include (Q1-Q4, or All)
    #[arg(long)]
    quarter: Option<String>,
    /// Year to include (0 for every year)
    #[arg(long)]
    year: Option<i64>,
}

impl FilterArgs {
    fn filter(&self) -> anyhow::Result<ScopeFilter> {
        ScopeFilter::parse(self.quarter.as_deref(), self.year).context("invalid filter")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import members, posts and evaluations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show the team metrics per dimension
    Metrics {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// List members with their aggregated scores
    Members {
        #[command(flatten)]
        filter: FilterArgs,
        /// Case-insensitive match on name or email
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_enum, default_value_t = SortField::AppreciationPoints)]
        sort: SortField,
        /// Sort ascending instead of descending
        #[arg(long)]
        asc: bool,
    },
    /// Show the top contributors
    Leaderboard {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum, default_value_t = ScoreField::TotalScore)]
        by: ScoreField,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List the years that have appreciation posts
    Years,
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "kudos-report.md")]
        out: PathBuf,
    },
    /// Serve the dashboard and team-metrics function over HTTP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

async fn open_store(config: &AppConfig, sample: bool) -> anyhow::Result<Arc<dyn RecordStore>> {
    if sample {
        return Ok(Arc::new(InMemoryRecordStore::sample()));
    }
    let pool = db::connect(&config.database).await?;
    Ok(Arc::new(PgRecordStore::new(pool)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match &cli.command {
        Commands::InitDb => {
            let pool = db::connect(&config.database).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
            return Ok(());
        }
        Commands::Seed => {
            let pool = db::connect(&config.database).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
            return Ok(());
        }
        Commands::Import { csv } => {
            let pool = db::connect(&config.database).await?;
            let inserted = db::import_csv(&pool, csv).await?;
            println!("Inserted {inserted} evaluations from {}.", csv.display());
            return Ok(());
        }
        _ => {}
    }

    let store = open_store(&config, cli.sample).await?;
    let dashboard = DashboardService::new(store)
        .with_max_concurrent_reads(config.dashboard.max_concurrent_reads)
        .with_leaderboard_limit(config.dashboard.leaderboard_limit)
        .with_cache_ttl(config.dashboard.cache_ttl)
        .with_cache_capacity(config.dashboard.cache_max_entries);

    match cli.command {
        Commands::InitDb | Commands::Seed | Commands::Import { .. } => {}
        Commands::Metrics { filter } => {
            let filter = filter.filter()?;
            let metrics = dashboard.team_metrics(&filter).await?;
            println!("Team metrics for {}:", filter.label());
            for metric in metrics.iter() {
                println!("- {}: {:.1}%", metric.name, metric.score);
            }
        }
        Commands::Members {
            filter,
            search,
            sort,
            asc,
        } => {
            let filter = filter.filter()?;
            let aggregation = dashboard.member_summaries(&filter).await?;
            let table = MembersTable {
                search,
                sort,
                direction: if asc {
                    SortDirection::Asc
                } else {
                    SortDirection::Desc
                },
            };
            let rows = table.apply(&aggregation.summaries);

            if rows.is_empty() {
                println!("No members match.");
                return Ok(());
            }

            println!("Members for {}:", filter.label());
            for summary in rows {
                println!(
                    "- {} ({}) points {:.0} | leadership {} | communication {} | management {} | problem solving {}",
                    summary.display_name(),
                    summary.member.email.as_deref().unwrap_or("no email"),
                    summary.appreciation_points,
                    summary.leadership,
                    summary.communication,
                    summary.management,
                    summary.problem_solving
                );
            }
            for failure in &aggregation.failures {
                println!("! evaluations unavailable for {}: {}", failure.user_id, failure.error);
            }
        }
        Commands::Leaderboard { filter, by, limit } => {
            let filter = filter.filter()?;
            let entries = dashboard.leaderboard(&filter, by, limit).await?;

            if entries.is_empty() {
                println!("No team members recorded.");
                return Ok(());
            }

            println!("Top contributors by {} for {}:", by.label(), filter.label());
            for (position, entry) in entries.iter().enumerate() {
                println!(
                    "{}. {} {} points across {} evaluated posts",
                    position + 1,
                    entry.name,
                    entry.points,
                    entry.appreciation_posts
                );
            }
        }
        Commands::Years => {
            let years = dashboard.store().available_years().await?;
            if years.is_empty() {
                println!("No dated appreciation posts.");
            }
            for year in years {
                println!("{year}");
            }
        }
        Commands::Report { filter, out } => {
            let filter = filter.filter()?;
            dashboard.select_filter(filter);
            let snapshot = dashboard.snapshot(&filter).await;
            let kudos = dashboard.store().recent_kudos(&filter, 5).await?;
            let report = report::build_report(&snapshot, &kudos);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let addr = config.server.socket_addr()?;
            server::serve(Arc::new(dashboard), addr).await?;
        }
    }

    Ok(())
}
