use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod cache;
mod db;
mod engine;
mod error;
mod models;
mod report;
mod scorer;
mod signals;
mod store;

use engine::EngagementEngine;

#[derive(Parser)]
#[command(name = "client-engagement")]
#[command(about = "Client engagement scoring engine for ForgeFit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import activity events from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Run a scoring pass and print clients ranked by engagement
    Score {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
        /// Also print the cached score detail for one client
        #[arg(long)]
        client: Option<uuid::Uuid>,
    },
    /// Run a scoring pass and write the fleet report
    Report {
        #[arg(long, default_value = "engagement-report.md")]
        out: PathBuf,
        /// Write the report as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_activity_csv(&pool, &csv).await?;
            println!("Inserted {inserted} activity events from {}.", csv.display());
        }
        Commands::Score {
            limit,
            concurrency,
            client,
        } => {
            let store = Arc::new(db::PgRecordStore::new(pool.clone()));
            let engine = EngagementEngine::with_concurrency(store, concurrency);
            engine.run_batch().await?;

            let mut ranked = engine.cached_scores();
            if ranked.is_empty() {
                println!("No clients scored.");
                return Ok(());
            }
            ranked.sort_by(|a, b| {
                b.overall_score
                    .partial_cmp(&a.overall_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            println!("Top clients by engagement:");
            for score in ranked.iter().take(limit) {
                let recency = match score.last_activity {
                    Some(_) => format!("last active {} days ago", score.days_since_last_activity),
                    None => "no recorded activity".to_string(),
                };
                println!(
                    "- {} ({}) score {:.0}, {} risk, {}",
                    score.client_name,
                    score.client_email,
                    score.overall_score,
                    score.churn_risk.label(),
                    recency
                );
            }

            if let Some(client_id) = client {
                match engine.cached_score(client_id) {
                    Some(score) => {
                        println!("Insights for {}:", score.client_name);
                        for insight in &score.insights {
                            println!("  - {insight}");
                        }
                    }
                    None => println!("Client {client_id} was not scored in this pass."),
                }
            }

            let info = engine.cache_info();
            if let Some(at) = info.last_computed_at {
                println!(
                    "Cached {} scores at {}.",
                    info.count,
                    at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        Commands::Report { out, json } => {
            let store = Arc::new(db::PgRecordStore::new(pool.clone()));
            let engine = EngagementEngine::new(store);
            let fleet_report = engine.generate_report().await?;

            if json {
                std::fs::write(&out, serde_json::to_string_pretty(&fleet_report)?)?;
            } else {
                std::fs::write(&out, report::render_markdown(&fleet_report))?;
            }
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
