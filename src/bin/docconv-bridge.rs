//! CLI binary for docconv-bridge.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! to `BridgeConfig` / `StoreConfig`, starts the listener supervisor and
//! serves HTTP until Ctrl-C.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use docconv_bridge::engine::probe::{DEFAULT_LISTENER_ADDR, DEFAULT_LISTENER_BINARY};
use docconv_bridge::{server, BridgeConfig, BridgeError, ProbeKind, RequestPipeline};
use docconv_store::{S3ObjectStore, StoreConfig};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default port with credentials from the environment
  AWS_ACCESS_KEY=... AWS_SECRET=... docconv-bridge

  # Local MinIO, path-style addressing, plain HTTP
  AWS_ENDPOINT=localhost:9000 AWS_S3FORCEPATHSTYLE=true AWS_SSLENABLED=false \
    docconv-bridge --port 8080

  # Convert docs/report.docx to PDF next to the source
  curl 'http://localhost:9080/docs/report.docx?format=pdf'

  # Store the result somewhere else
  curl 'http://localhost:9080/docs/report.docx?format=pdf&dbucket=out&dkey=final.pdf'

OBJECT STORE ENVIRONMENT VARIABLES:
  AWS_ACCESS_KEY          Access key id (required)
  AWS_SECRET              Secret access key (required)
  AWS_ENDPOINT            Custom endpoint (MinIO, R2, Ceph, ...)
  AWS_REGION              Region (default: us-east-1)
  AWS_S3FORCEPATHSTYLE    'true' enables path-style addressing
  AWS_SSLENABLED          'false' uses plain HTTP for the endpoint

RESPONSE CODES:
  0 conversion complete            6 source datablock can't be retrieved
  1 missing source object path     7 converted datablock can't be read
  2 missing destination format     8 conversion process can't be started
  3 source object not found        9 no converted document created
  4 source object unavailable     10 converted datablock can't be stored
  5 temporary data can't be instantiated

A `.env` file in the working directory is loaded first.
"#;

/// Convert documents stored in S3-compatible object storage over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "docconv-bridge",
    version,
    about = "Convert documents stored in S3-compatible object storage over HTTP",
    long_about = "HTTP bridge between S3-compatible object storage and an external document \
conversion engine (unoconv). GET/POST /<bucket>/<key>?format=<fmt> downloads the object, \
converts it and uploads the result.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "DOCCONV_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// HTTP port.
    #[arg(short, long, env = "DOCCONV_PORT", default_value_t = docconv_bridge::config::DEFAULT_PORT)]
    port: u16,

    /// Conversion engine executable.
    #[arg(long, env = "DOCCONV_ENGINE", default_value = docconv_bridge::engine::DEFAULT_ENGINE)]
    engine: String,

    /// Extra arguments placed before the engine's mode flags (whitespace separated).
    #[arg(long, env = "DOCCONV_ENGINE_ARGS", default_value = "")]
    engine_args: String,

    /// Per-conversion timeout in seconds (0 disables).
    #[arg(long, env = "DOCCONV_JOB_TIMEOUT", default_value_t = 300)]
    job_timeout: u64,

    /// Directory for temporary files (default: system temp dir).
    #[arg(long, env = "DOCCONV_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Listener liveness check: socket or process.
    #[arg(long, env = "DOCCONV_PROBE", default_value = "socket")]
    probe: String,

    /// Socket the listener accepts connections on (socket probe).
    #[arg(long, env = "DOCCONV_LISTENER_ADDR", default_value = DEFAULT_LISTENER_ADDR)]
    listener_addr: SocketAddr,

    /// Listener binary to look for (process probe).
    #[arg(long, env = "DOCCONV_LISTENER_BINARY", default_value = DEFAULT_LISTENER_BINARY)]
    listener_binary: PathBuf,

    /// Delay before the first listener restart, in milliseconds.
    #[arg(long, env = "DOCCONV_RESTART_BACKOFF_MS", default_value_t = 500)]
    restart_backoff_ms: u64,

    /// Upper bound of the restart delay, in milliseconds.
    #[arg(long, env = "DOCCONV_RESTART_MAX_BACKOFF_MS", default_value_t = 30_000)]
    restart_max_backoff_ms: u64,

    /// Give up after this many consecutive listener restarts (default: never).
    #[arg(long, env = "DOCCONV_RESTART_MAX")]
    restart_max: Option<u32>,

    /// Log every restart at error level from this many consecutive restarts on.
    #[arg(long, env = "DOCCONV_RESTART_ALERT_AFTER", default_value_t = 5)]
    restart_alert_after: u32,

    /// Enable verbose debug logging.
    #[arg(short, long, env = "DOCCONV_VERBOSE")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, env = "DOCCONV_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn bridge_config(&self) -> Result<BridgeConfig, BridgeError> {
        let probe = ProbeKind::from_name(
            &self.probe,
            self.listener_addr,
            Some(self.listener_binary.clone()),
        )?;

        let mut builder = BridgeConfig::builder()
            .bind_addr(SocketAddr::new(self.host, self.port))
            .engine_program(&self.engine)
            .engine_args(self.engine_args.split_whitespace())
            .job_timeout_secs(self.job_timeout)
            .probe(probe)
            .restart_backoff_ms(self.restart_backoff_ms)
            .restart_max_backoff_ms(self.restart_max_backoff_ms)
            .max_restarts(self.restart_max)
            .alert_after(self.restart_alert_after);
        if let Some(dir) = &self.temp_dir {
            builder = builder.temp_dir(dir);
        }
        builder.build()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` must be loaded before clap reads the environment.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    // ── Configuration ────────────────────────────────────────────────────
    let store_config = StoreConfig::from_env()
        .map_err(BridgeError::Store)
        .context("Object store is not configured")?;
    let config = cli.bridge_config().context("Invalid service configuration")?;
    info!(?store_config, "Object store configured");
    info!(?config, "Service configured");

    // ── Listener supervisor ──────────────────────────────────────────────
    let supervisor = config.supervisor();
    let mut supervision = tokio::spawn(async move {
        match supervisor.run().await {
            // External listener: nothing left to supervise.
            Ok(()) => std::future::pending().await,
            Err(e) => e,
        }
    });

    // ── HTTP server ──────────────────────────────────────────────────────
    let store = Arc::new(S3ObjectStore::new(&store_config));
    let pipeline = Arc::new(RequestPipeline::from_config(store, &config));
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| BridgeError::Bind {
            addr: config.bind_addr,
            source,
        })?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutting down");
    };

    tokio::select! {
        served = server::serve(listener, pipeline, shutdown) => {
            supervision.abort();
            served.context("HTTP server failed")?;
        }
        fatal = &mut supervision => {
            let err = match fatal {
                Ok(e) => anyhow::Error::new(e),
                Err(join) => anyhow::anyhow!("listener supervisor panicked: {}", join),
            };
            error!("{:#}", err);
            return Err(err.context("Conversion listener failed"));
        }
    }

    Ok(())
}
