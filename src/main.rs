//! sqlrun - run multi-statement SQL and stream every result as it arrives.

mod cli;
mod logging;

use cli::Cli;
use db_sqlrun::config::Config;
use db_sqlrun::db::{redact_target, SqlxConnector};
use db_sqlrun::error::{Result, SqlRunError};
use db_sqlrun::output::Renderer;
use db_sqlrun::query::{
    fetch_result, ExecutionSummary, QueryWorker, ResultEvent, SinkEvent, WorkerEvent,
};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Exit code when some submission ended in an error.
const EXIT_SQL_ERROR: i32 = 2;

/// Exit code for configuration and other setup errors.
const EXIT_FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    logging::init_stderr_logging();

    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env loaded: {}", e);
    }

    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_SQL_ERROR),
        Err(e) => {
            error!("{}: {}", e.category(), e);
            eprintln!("{}: {}", e.category(), e.message());
            std::process::exit(EXIT_FAILURE);
        }
    }
}

/// Runs every submission. Returns whether all of them succeeded.
async fn run() -> Result<bool> {
    let cli = Cli::parse_args();

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let target = resolve_target(&cli, &config)?;
    info!("Connection: {}", redact_target(&target));

    let submissions = cli.read_submissions(&mut io::stdin().lock())?;
    let format = cli.output_format(config.defaults.format);
    let mut renderer = Renderer::new(io::stdout().lock(), format);

    if cli.buffered {
        run_buffered(&mut renderer, &target, &submissions).await
    } else {
        run_streaming(&mut renderer, &target, submissions).await
    }
}

/// Resolves the connection target with precedence:
/// 1. Positional TARGET argument (highest)
/// 2. Named connection from config
/// 3. Default connection from config
/// 4. `DATABASE_URL`
fn resolve_target(cli: &Cli, config: &Config) -> Result<String> {
    if let Some(target) = &cli.target {
        return Ok(target.clone());
    }

    if let Some(name) = cli.connection_name() {
        let connection = config.get_connection(Some(name)).ok_or_else(|| {
            SqlRunError::config(format!("Connection '{}' not found in config file", name))
        })?;
        return connection.to_target();
    }

    if let Some(connection) = config.get_connection(None) {
        return connection.to_target();
    }

    std::env::var("DATABASE_URL").map_err(|_| {
        SqlRunError::config(
            "No database connection configured. Pass a TARGET, use --connection, or set DATABASE_URL",
        )
    })
}

async fn run_streaming<W: Write>(
    renderer: &mut Renderer<W>,
    target: &str,
    submissions: Vec<String>,
) -> Result<bool> {
    let (mut worker, mut events) = QueryWorker::spawn(Arc::new(SqlxConnector));

    let expected = submissions.len();
    for sql in submissions {
        worker.submit(target, sql).await?;
    }

    let mut finished = 0;
    let mut success = true;

    while finished < expected {
        let Some(event) = events.recv().await else {
            return Err(SqlRunError::internal("Query worker stopped early"));
        };

        match event {
            WorkerEvent::Result(event) => renderer.render_event(&event).map_err(write_error)?,
            WorkerEvent::Finished {
                submission,
                summary,
            } => {
                renderer
                    .render_finished(submission, &summary)
                    .and_then(|_| renderer.flush())
                    .map_err(write_error)?;
                success &= summary.is_success();
                finished += 1;
            }
        }
    }

    worker.shutdown().await?;
    Ok(success)
}

async fn run_buffered<W: Write>(
    renderer: &mut Renderer<W>,
    target: &str,
    submissions: &[String],
) -> Result<bool> {
    let mut success = true;

    for (id, sql) in (1u64..).zip(submissions) {
        let summary = match fetch_result(target, sql).await {
            Ok(snapshot) => {
                renderer.render_snapshot(id, &snapshot).map_err(write_error)?;
                ExecutionSummary {
                    results: 1,
                    error: None,
                }
            }
            Err(e) => {
                renderer
                    .render_event(&ResultEvent {
                        submission: id,
                        ordinal: 0,
                        payload: SinkEvent::Error(e.clone()),
                    })
                    .map_err(write_error)?;
                ExecutionSummary {
                    results: 1,
                    error: Some(e),
                }
            }
        };

        renderer
            .render_finished(id, &summary)
            .and_then(|_| renderer.flush())
            .map_err(write_error)?;
        success &= summary.is_success();
    }

    Ok(success)
}

fn write_error(e: io::Error) -> SqlRunError {
    SqlRunError::internal(format!("Failed to write output: {e}"))
}
