//! Thin CLI wiring over the synchronization core. Per the design notes, the
//! interesting engineering lives in `engine`/`scheduler`/`maintenance`; these
//! subcommands only parse arguments and call into them.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use escale::callback::TracingCallback;
use escale::cancel::CancellationToken;
use escale::config::Config;
use escale::conflict::ConflictResolver;
use escale::engine::Engine;
use escale::error::SyncError;
use escale::exclusion::{ExcludeConfig, ExclusionEngine};
use escale::framing::PayloadKey;
use escale::identity::{self, Pseudonym};
use escale::index::Index;
use escale::maintenance::{self, MigrateMode};
use escale::path::LogicalPath;
use escale::relay::local::LocalRelay;
use escale::scheduler::{Scheduler, SchedulerConfig};
use escale::strategies::AccessPolicy;
use escale::utils::FileLock;

#[derive(Parser)]
#[command(name = "escale", version, about = "Relay-mediated file synchronization")]
struct Cli {
	/// Path to a repository config file; defaults apply where absent.
	#[arg(short, long, value_name = "FILE")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Run the scheduler against the configured repository until interrupted.
	Start,

	/// Request, grant, or advertise gated (`r?`/`w?`) access to a path.
	Access {
		#[command(subcommand)]
		action: AccessAction,
	},

	/// Copy every blob from this repository's relay to another relay.
	Migrate {
		/// Destination relay URI (only `file://` is built into this binary).
		destination: String,
		#[arg(long, value_enum, default_value = "fast")]
		mode: MigrateModeArg,
	},

	/// Archive every blob on the relay to a local file.
	Backup {
		destination: PathBuf,
		#[arg(long)]
		no_compress: bool,
	},

	/// Restore every blob from a backup archive onto the relay.
	Restore {
		source: PathBuf,
		#[arg(long)]
		no_compress: bool,
	},
}

#[derive(Subcommand)]
enum AccessAction {
	/// Ask the owner of `path` for access.
	Request { path: String, owner: String },
	/// Grant a pending request from `requester`.
	Grant { path: String, requester: String },
	/// Broadcast a policy change to a list of peers.
	Advertise { path: String, read: String, write: String, peers: Vec<String> },
}

#[derive(ValueEnum, Clone, Copy)]
enum MigrateModeArg {
	Fast,
	Safe,
}

impl From<MigrateModeArg> for MigrateMode {
	fn from(value: MigrateModeArg) -> Self {
		match value {
			MigrateModeArg::Fast => MigrateMode::Fast,
			MigrateModeArg::Safe => MigrateMode::Safe,
		}
	}
}

#[tokio::main]
async fn main() -> ExitCode {
	escale::logging::init_tracing();

	let cli = Cli::parse();
	match run(cli).await {
		Ok(()) => ExitCode::from(0),
		Err(e) => {
			tracing::error!(error = %e, "escale exiting with error");
			ExitCode::from(exit_code(&e))
		}
	}
}

fn exit_code(error: &SyncError) -> u8 {
	match error {
		SyncError::Config { .. } => 1,
		SyncError::LicenseNotAccepted => 2,
		SyncError::Relay(_) | SyncError::Busy { .. } => 3,
		SyncError::LocalIo { .. } | SyncError::Index(_) => 4,
		SyncError::Integrity { .. } | SyncError::Framing(_) => 5,
		SyncError::Conflict(_) => 6,
		SyncError::Cancelled | SyncError::Other { .. } => 1,
	}
}

async fn open_relay(config: &Config) -> Result<LocalRelay, SyncError> {
	open_relay_uri(&config.relay_uri).await
}

async fn open_relay_uri(uri: &str) -> Result<LocalRelay, SyncError> {
	let root = uri.strip_prefix("file://").ok_or_else(|| SyncError::Config {
		message: format!("unsupported relay URI scheme (only file:// is built into this binary): {}", uri),
	})?;
	Ok(LocalRelay::open(root).await?)
}

fn payload_key(config: &Config) -> Result<Option<PayloadKey>, SyncError> {
	match &config.passphrase {
		Some(passphrase) => Ok(Some(PayloadKey::derive(passphrase, &config.kdf_salt)?)),
		None => Ok(None),
	}
}

fn open_index(config: &Config) -> Result<Index, SyncError> {
	std::fs::create_dir_all(&config.state_dir)
		.map_err(|e| SyncError::LocalIo { path: config.state_dir.display().to_string(), source: e })?;
	Index::open(&config.state_dir.join("index.redb")).map_err(SyncError::Index)
}

async fn run(cli: Cli) -> Result<(), SyncError> {
	let config = Config::load(cli.config.as_deref())?;

	if !config.license_accepted {
		return Err(SyncError::LicenseNotAccepted);
	}

	match cli.command {
		Commands::Start => cmd_start(&config).await,
		Commands::Access { action } => cmd_access(&config, action).await,
		Commands::Migrate { destination, mode } => {
			cmd_migrate(&config, &destination, mode.into()).await
		}
		Commands::Backup { destination, no_compress } => {
			cmd_backup(&config, &destination, !no_compress).await
		}
		Commands::Restore { source, no_compress } => {
			cmd_restore(&config, &source, !no_compress).await
		}
	}
}

async fn cmd_start(config: &Config) -> Result<(), SyncError> {
	std::fs::create_dir_all(&config.state_dir)
		.map_err(|e| SyncError::LocalIo { path: config.state_dir.display().to_string(), source: e })?;
	let _lock = FileLock::acquire(&config.state_dir).map_err(|e| SyncError::Config { message: e.to_string() })?;

	let relay = open_relay(config).await?;
	let pseudonym = Pseudonym::new(config.pseudonym.clone());
	identity::claim(&relay, &pseudonym, config.lock_ttl_secs).await?;

	let index = open_index(config)?;
	let engine = Engine {
		relay: &relay,
		index: &index,
		pseudonym,
		key: payload_key(config)?,
		compress: config.compress,
		retention: config.placeholder_retention,
		resolver: ConflictResolver::new(config.conflict_strategy),
		lock_ttl_secs: config.lock_ttl_secs,
		lock_settle: config.lock_settle_interval,
		max_name_len: config.max_relay_name_len,
	};

	let exclude_config = ExcludeConfig::from_config(config);
	let exclusion = ExclusionEngine::new_with_includes(
		&exclude_config,
		&config.repository_path,
		&config.include_patterns,
	)?;

	let callback = TracingCallback;
	let scheduler = Scheduler::new(
		engine,
		config.repository_path.clone(),
		exclusion,
		SchedulerConfig {
			scan_interval: config.scan_interval,
			scan_jitter: config.scan_jitter,
			backoff_initial: config.backoff_initial,
			backoff_max: config.backoff_max,
			access: config.default_access,
		},
		&callback,
	);

	let cancel = CancellationToken::new();
	let ctrl_c_token = cancel.clone();
	tokio::spawn(async move {
		let _ = tokio::signal::ctrl_c().await;
		ctrl_c_token.cancel();
	});

	scheduler.run(&cancel).await;
	Ok(())
}

async fn cmd_access(config: &Config, action: AccessAction) -> Result<(), SyncError> {
	let relay = open_relay(config).await?;
	let max_name_len = config.max_relay_name_len;

	match action {
		AccessAction::Request { path, owner } => {
			let path = LogicalPath::new(path)?;
			let requester = Pseudonym::new(config.pseudonym.clone());
			let owner = Pseudonym::new(owner);
			maintenance::request_access(&relay, &path, &requester, &owner, max_name_len).await
		}
		AccessAction::Grant { path, requester } => {
			let path = LogicalPath::new(path)?;
			let owner = Pseudonym::new(config.pseudonym.clone());
			let requester = Pseudonym::new(requester);
			maintenance::grant_access(&relay, &path, &owner, &requester, max_name_len).await
		}
		AccessAction::Advertise { path, read, write, peers } => {
			let path = LogicalPath::new(path)?;
			let owner = Pseudonym::new(config.pseudonym.clone());
			let read = read.parse().map_err(|e| SyncError::Config { message: e })?;
			let write = write.parse().map_err(|e| SyncError::Config { message: e })?;
			let peers: Vec<Pseudonym> = peers.into_iter().map(Pseudonym::new).collect();
			maintenance::advertise_access_change(
				&relay,
				&path,
				&owner,
				AccessPolicy::new(read, write),
				&peers,
				max_name_len,
			)
			.await
		}
	}
}

async fn cmd_migrate(config: &Config, destination: &str, mode: MigrateMode) -> Result<(), SyncError> {
	let source = open_relay(config).await?;
	let dest = open_relay_uri(destination).await?;
	let holder = Pseudonym::new(config.pseudonym.clone());
	let migrated = maintenance::migrate(
		&source,
		&dest,
		mode,
		&holder,
		config.lock_ttl_secs,
		config.lock_settle_interval,
		config.max_relay_name_len,
	)
	.await?;
	tracing::info!(migrated, destination, "migration complete");
	Ok(())
}

async fn cmd_backup(config: &Config, destination: &std::path::Path, compress: bool) -> Result<(), SyncError> {
	let relay = open_relay(config).await?;
	let count = maintenance::backup(&relay, destination, compress).await?;
	tracing::info!(count, path = %destination.display(), "backup complete");
	Ok(())
}

async fn cmd_restore(config: &Config, source: &std::path::Path, compress: bool) -> Result<(), SyncError> {
	let relay = open_relay(config).await?;
	let count = maintenance::restore(&relay, source, compress).await?;
	tracing::info!(count, path = %source.display(), "restore complete");
	Ok(())
}

// vim: ts=4
