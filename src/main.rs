//! pg_diff - compare two PostgreSQL databases
//!
//! Collects one dimension (table names, schemas, row counts, sizes, ...)
//! from a source and a target database and reports what differs. Without a
//! target it prints the source's figures instead.
//!
//! Exit status: 0 when the databases match (or in info mode), 1 when
//! differences were found, 2 on any failure.

mod catalog;
mod compare;
mod config;
mod connection;
mod dimension;
mod error;
mod report;
mod snapshot;

use crate::compare::{collect_side, Side};
use crate::config::{OutputFormat, Settings};
use crate::connection::{ConnectionParams, PgConnection};
use crate::dimension::Dimension;
use crate::error::{AppError, AppResult};
use crate::snapshot::Snapshot;
use serde_json::json;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Same,
    Different,
    Info,
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("pg_diff: {}", e);
            return ExitCode::from(2);
        }
    };

    init_tracing(settings.verbose);

    match run(&settings).await {
        Ok(Outcome::Different) => ExitCode::from(1),
        Ok(outcome) => {
            debug!("Finished: {:?}", outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            debug!("Run failed: {:?}", e);
            report_failure(&settings, &e);
            ExitCode::from(2)
        }
    }
}

/// Initialize tracing on stderr so stdout only carries the report
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,pg_diff=debug"
    } else {
        "warn,pg_diff=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .compact(),
        )
        .init();
}

async fn run(settings: &Settings) -> anyhow::Result<Outcome> {
    let dimension = settings.dimension;

    // Both sessions are checked before any collection starts
    let source = open(Side::Source, &settings.source, dimension).await?;
    let target = match settings.target.as_deref() {
        Some(dsn) => Some(open(Side::Target, dsn, dimension).await?),
        None => None,
    };

    let Some(target) = target else {
        info!("No target given, collecting {} from source only", dimension);
        let snapshot = collect_side(Side::Source, dimension, &source).await?;
        log_snapshot(Side::Source, &snapshot);

        match settings.format {
            OutputFormat::Text => print!(
                "{}",
                report::render_snapshot(source.display(), &snapshot, settings.verbose)
            ),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        }
        return Ok(Outcome::Info);
    };

    let run = compare::compare(dimension, &source, &target).await?;
    log_snapshot(Side::Source, &run.source);
    log_snapshot(Side::Target, &run.target);

    match settings.format {
        OutputFormat::Text => {
            if settings.verbose {
                print!("{}", report::render_snapshot(source.display(), &run.source, true));
                println!();
                print!("{}", report::render_snapshot(target.display(), &run.target, true));
                println!();
            }
            print!("{}", report::render_text(&run.report));
        }
        OutputFormat::Json => {
            let snapshots = settings.verbose.then_some((&run.source, &run.target));
            println!("{}", report::render_json(&run.report, snapshots)?);
        }
    }

    Ok(if run.report.is_empty() {
        Outcome::Same
    } else {
        Outcome::Different
    })
}

/// Parse, pool and ping one side; failures name the side
async fn open(side: Side, dsn: &str, dimension: Dimension) -> AppResult<PgConnection> {
    let connect = async {
        let params = ConnectionParams::from_dsn(dsn)?;
        let db = PgConnection::new(&params)?;
        db.verify().await?;
        Ok::<_, AppError>(db)
    };

    let db = connect.await.map_err(|e| e.on_side(side, dimension))?;
    debug!("{} database is {}", side, db.display());
    Ok(db)
}

fn log_snapshot(side: Side, snapshot: &Snapshot) {
    debug!(
        "{} snapshot of {} captured at {} (checksum {})",
        side,
        snapshot.dimension(),
        snapshot.captured_at().to_rfc3339(),
        snapshot.checksum()
    );
}

/// Failures go to stderr; JSON mode also gets a machine-readable body on stdout
fn report_failure(settings: &Settings, err: &anyhow::Error) {
    eprintln!("pg_diff: {:#}", err);

    if settings.format == OutputFormat::Json {
        let code = err
            .downcast_ref::<AppError>()
            .map(AppError::code)
            .unwrap_or("INTERNAL_ERROR");
        let body = json!({
            "error": {
                "code": code,
                "message": format!("{:#}", err),
            }
        });
        println!("{}", body);
    }
}
