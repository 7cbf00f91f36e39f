use attendance::{lms, settings::MetadataKeys, ConferenceEndEvent, Engine, HttpConnector, Settings};
use clap::{Args, Parser, Subcommand};
use eyre::WrapErr;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs,
    io::{self, AsyncReadExt},
    signal,
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    common::dotenv()?;

    let config = Config::parse();
    common::logging::init(config.log_level)?;

    let db = database::connect(&config.database_url)
        .await
        .wrap_err("failed to connect to the database")?;

    match config.command {
        Command::Migrate => {
            database::migrate(&db)
                .await
                .wrap_err("failed to apply migrations")?;
            info!("migrations applied");
        }
        Command::Sync(args) => {
            let event = read_event(&args.event).await?;
            let engine = Engine::new(db, HttpConnector::new(args.lms()), args.settings());

            tokio::select! {
                result = engine.synchronize(&event) => {
                    let summary = result?;
                    println!("{}", serde_json::to_string(&summary)?);
                }
                _ = shutdown() => {
                    warn!("synchronization cancelled");
                    eyre::bail!("synchronization cancelled before completing");
                }
            }
        }
    }

    Ok(())
}

/// Load the event from a file, or stdin when the path is `-`
async fn read_event(path: &Path) -> eyre::Result<ConferenceEndEvent> {
    let raw = if path.as_os_str() == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .await
            .wrap_err("failed to read event from stdin")?;
        raw
    } else {
        fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("failed to read event from {}", path.display()))?
    };

    ConferenceEndEvent::parse(&raw).wrap_err("invalid conference-ended event")
}

/// Wait for SIGINT (ctrl+c) or SIGTERM
async fn shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl+c handler")
    };
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Records the attendance of finished conferences in the LMS they were launched from
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Config {
    /// The credential store to read from
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// The default level to log at
    #[arg(long, default_value_t = Level::INFO, env = "LOG_LEVEL")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record the attendance of a finished conference
    Sync(SyncArgs),
    /// Apply the credential store migrations
    Migrate,
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// The conference-ended event to process, or `-` for stdin
    #[arg(long)]
    event: PathBuf,

    /// The name of the per-course container attendance buckets are grouped under
    #[arg(long, default_value = "Conference attendance", env = "CONTAINER_NAME")]
    container_name: String,

    /// Create buckets outside of any container
    #[arg(long)]
    no_container: bool,

    /// How many member writes may be in flight at once
    #[arg(long, default_value_t = 4, env = "WRITE_CONCURRENCY")]
    concurrency: usize,

    /// How long to wait for each LMS request, in seconds
    #[arg(long, default_value_t = 10, env = "LMS_TIMEOUT")]
    timeout: u64,

    /// The points awarded for attending, in web-service gradebooks
    #[arg(long, default_value_t = 100.0, env = "MAX_POINTS")]
    max_points: f64,

    /// The resource version of REST LMS APIs
    #[arg(long, default_value = "v1", env = "LMS_API_VERSION")]
    api_version: String,

    /// How many members to request per enrollment page
    #[arg(long, default_value_t = 100, env = "PAGE_SIZE")]
    page_size: u32,

    /// The metadata entry holding the scheduled meeting reference
    #[arg(long, default_value = "scheduled-meeting", env = "MEETING_KEY")]
    meeting_key: String,

    /// The metadata entry holding the launch nonce
    #[arg(long, default_value = "launch-nonce", env = "LAUNCH_KEY")]
    launch_key: String,
}

impl SyncArgs {
    fn lms(&self) -> lms::Settings {
        lms::Settings {
            timeout: Duration::from_secs(self.timeout),
            max_points: self.max_points,
            api_version: self.api_version.clone(),
            page_size: self.page_size,
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            container_name: (!self.no_container).then(|| self.container_name.clone()),
            metadata: MetadataKeys {
                meeting: self.meeting_key.clone(),
                launch: self.launch_key.clone(),
            },
            write_concurrency: self.concurrency,
            lms: self.lms(),
            ..Settings::default()
        }
    }
}
