use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use mail_translate::channels::{ImapInbox, SmtpOutbox};
use mail_translate::config::Config;
use mail_translate::error::Error;
use mail_translate::llm::{ChunkedTranslator, HttpTranslationModel};
use mail_translate::pipeline::{RunParams, RunSummary, TranslationPipeline};
use mail_translate::store::Ledger;

/// Translate incoming mail and forward the translation.
#[derive(Parser, Debug)]
#[command(name = "mail-translate", version, about)]
struct Cli {
    /// IMAP search expression, passed through verbatim (e.g. 'FROM "uni-potsdam.de"')
    #[arg(long, env = "MT_CRITERIA")]
    criteria: String,

    /// Skip messages older than this many days
    #[arg(long, default_value_t = 10, env = "MT_MAX_AGE_DAYS")]
    max_age_days: i64,

    /// File holding ids of messages already handled
    #[arg(long, default_value = "processed_ids.txt", env = "MT_LEDGER")]
    ledger: PathBuf,

    /// Keep running, polling every N seconds (default: run once)
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    setup_logging(level, cli.log_file.as_deref());

    let config = Arc::new(Config::from_env().map_err(Error::from)?);
    let params = RunParams {
        criteria: cli.criteria.clone(),
        max_age_days: cli.max_age_days,
        sender_address: config.smtp.sender_address.clone(),
        recipient_address: config.smtp.recipient_address.clone(),
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        imap = %config.imap.host,
        mailbox = %config.imap.mailbox,
        model = %config.model.url,
        ledger = %cli.ledger.display(),
        "Mail translate starting"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, finishing current message");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    loop {
        let summary = {
            let config = Arc::clone(&config);
            let params = params.clone();
            let ledger = cli.ledger.clone();
            let shutdown = Arc::clone(&shutdown);
            tokio::task::spawn_blocking(move || run_once(&config, params, ledger, &shutdown))
                .await
                .context("Run task panicked")?
        };

        match summary {
            Ok(summary) if summary.stopped => break,
            Ok(_) => {}
            Err(e) if cli.poll_interval_secs.is_none() => return Err(e.into()),
            // A failed run in polling mode is retried on the next tick.
            Err(e) => error!(error = %e, "Run failed"),
        }

        let Some(secs) = cli.poll_interval_secs else {
            break;
        };
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        info!(secs, "Sleeping until next poll");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                shutdown.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    info!("Mail translate stopped");
    Ok(())
}

/// One full pass: connect, process, close. Runs on a blocking thread.
fn run_once(
    config: &Config,
    params: RunParams,
    ledger_path: PathBuf,
    shutdown: &AtomicBool,
) -> Result<RunSummary, Error> {
    let model = HttpTranslationModel::new(&config.model)?;
    let outbox = SmtpOutbox::new(&config.smtp)?;
    let pipeline = TranslationPipeline::new(ChunkedTranslator::new(model), Box::new(outbox), params);

    let mut ledger = Ledger::load(ledger_path)?;
    let mut inbox = ImapInbox::connect(&config.imap)?;

    pipeline.run(&mut inbox, &mut ledger, shutdown)
}

fn setup_logging(level: &str, log_file: Option<&Path>) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = log_file.and_then(|path| {
        let name = path.file_name()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).ok()?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(tracing_appender::rolling::never(dir, name)),
        )
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}
