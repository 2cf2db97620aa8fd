use anyhow::Context;
use clap::{Parser, Subcommand};
use rustycounsel::{
    api,
    config::{self, ConfigPaths},
    logging,
    pipeline::{Pipeline, RunOptions},
    query::{Answer, QueryComponent},
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

/// Question answering over a local corpus of legal PDFs.
#[derive(Parser)]
#[command(name = "rusty-counsel", version, about)]
struct Cli {
    /// Path to config.yaml.
    #[arg(long, global = true, env = "RUSTY_COUNSEL_CONFIG")]
    config: Option<PathBuf>,
    /// Path to params.yaml.
    #[arg(long, global = true, env = "RUSTY_COUNSEL_PARAMS")]
    params: Option<PathBuf>,
    /// Path to secret.yaml.
    #[arg(long, global = true, env = "RUSTY_COUNSEL_SECRETS")]
    secrets: Option<PathBuf>,
    /// Append logs to this file instead of `logs/rusty-counsel.log`.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the configured PDFs.
    Ingest,
    /// Load, chunk, embed, and persist the index.
    Build,
    /// Answer one question from the persisted index.
    Ask {
        /// Question to answer.
        question: String,
    },
    /// Run the whole pipeline, then answer a question or read questions from stdin.
    Run {
        /// Download the configured PDFs first.
        #[arg(long)]
        ingest: bool,
        /// Reuse the persisted index when present.
        #[arg(long)]
        reuse_index: bool,
        /// Question to answer; omit for an interactive prompt.
        #[arg(long)]
        question: Option<String>,
    },
    /// Serve the HTTP API over the persisted index.
    Serve {
        /// Rebuild the index before serving.
        #[arg(long)]
        rebuild: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init_tracing(cli.log_file.as_deref());

    let mut paths = ConfigPaths::from_env();
    if let Some(path) = cli.config {
        paths.config = path;
    }
    if let Some(path) = cli.params {
        paths.params = path;
    }
    if let Some(path) = cli.secrets {
        paths.secrets = path;
    }
    let config = config::init_config(paths).context("Failed to load configuration")?;
    let pipeline = Pipeline::from_config(config)?;

    match cli.command {
        Command::Ingest => {
            let report = pipeline.ingest().await?;
            println!(
                "Downloaded {}, skipped {}, failed {}",
                report.downloaded.len(),
                report.skipped.len(),
                report.failed.len()
            );
            for failure in &report.failed {
                println!("  FAILED {}: {}", failure.url, failure.reason);
            }
        }
        Command::Build => {
            let (document_count, chunks) = pipeline.load_and_chunk().await?;
            let embedder = pipeline.embedder()?;
            let index = pipeline.build_index(&chunks, embedder.as_ref()).await?;
            pipeline
                .metrics()
                .record_indexing(document_count as u64, index.len() as u64);
            println!(
                "Indexed {} chunks from {} pages",
                index.len(),
                document_count
            );
        }
        Command::Ask { question } => {
            let query = pipeline.open_query().await?;
            let answer = query.answer_query(&question).await?;
            print_answer(&answer);
        }
        Command::Run {
            ingest,
            reuse_index,
            question,
        } => {
            let outcome = pipeline
                .run(RunOptions {
                    ingest,
                    reuse_index,
                })
                .await?;
            tracing::info!(chunks = outcome.chunk_count, "Pipeline ready");
            match question {
                Some(question) => {
                    let answer = outcome.query.answer_query(&question).await?;
                    print_answer(&answer);
                }
                None => prompt_loop(&outcome.query).await?,
            }
        }
        Command::Serve { rebuild } => {
            let query = if rebuild {
                pipeline.run(RunOptions::default()).await?.query
            } else {
                pipeline.open_query().await?
            };
            let service = api::QueryService::new(query, pipeline.metrics());
            let app = api::create_router(Arc::new(service));

            let (listener, port) = bind_listener(config.server_config().port)
                .await
                .context("Failed to bind listener")?;
            tracing::info!("Listening on http://0.0.0.0:{}", port);
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

async fn prompt_loop(query: &QueryComponent) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nAsk a legal question (blank line or 'exit' to quit): ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() || question.eq_ignore_ascii_case("exit") {
            break;
        }
        match query.answer_query(question).await {
            Ok(answer) => print_answer(&answer),
            Err(error) => {
                tracing::error!(error = %error, "Query failed");
                eprintln!("Error: {error}");
            }
        }
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("\n{}", answer.text);
    if answer.has_context() {
        println!("\nSources:");
        for hit in &answer.sources {
            println!(
                "  - {} (page {}, score {:.3})",
                hit.payload.source,
                hit.payload.page + 1,
                hit.score
            );
        }
    }
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
