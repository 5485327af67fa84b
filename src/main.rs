use clap::{Parser, Subcommand};
use dump_manager::config::{self, Config};
use dump_manager::managers::conditions::{ConditionGate, ShellConditions};
use dump_manager::managers::logging::{self, LoggingConfig};
use dump_manager::managers::metrics::{MetricsSink, ZabbixSender};
use dump_manager::scheduler::{BackupResult, DumpScheduler, SchedulerError, SchedulerOptions};
use dump_manager::store::GenerationStore;
use dump_manager::utils::{format_duration, CommandExecutor, RealExecutor, RunLock};
use dump_manager::{MysqlInventory, MysqldumpPipeline};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Exit codes of a run
mod exit {
    pub const SUCCESS: u8 = 0;
    pub const FAILURE: u8 = 1;
    pub const NOT_ENOUGH_SPACE: u8 = 2;
    pub const LOCKED: u8 = 3;
    pub const FILESYSTEM: u8 = 4;
}

#[derive(Parser)]
#[command(name = "dump-manager")]
#[command(about = "Space-aware, versioned mysqldump backups", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/dump-manager/dump-manager.toml")]
    config: PathBuf,

    /// Set log level to debug, overriding the configured level
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up all selected databases (default)
    Run,

    /// Validate configuration file
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match cli.command.unwrap_or(Commands::Run) {
        Commands::Validate => handle_validate(&cli.config),
        Commands::Run => handle_run(&cli.config, cli.debug),
    };

    ExitCode::from(code)
}

/// Handle validate command (console logging only, no generation is created)
fn handle_validate(config_path: &Path) -> u8 {
    logging::init_console_logging();

    let config = match config::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return exit::FAILURE;
        }
    };

    for bin in [&config.main.mysqldump_bin, &config.main.mysql_bin] {
        if which::which(bin).is_err() {
            warn!("'{}' not found in PATH", bin);
        }
    }

    println!("Configuration is valid!");
    println!("Backup directory: {}", config.main.backup_dir.display());
    println!("Versions: {}", config.main.versions);
    println!("Parallelism: {}", config.main.effective_parallelism());
    println!("Link strategy: {:?}", config.main.link_strategy);

    exit::SUCCESS
}

fn handle_run(config_path: &Path, debug_flag: bool) -> u8 {
    let config = match config::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return exit::FAILURE;
        }
    };

    let mut lock = match RunLock::open(&config.main.backup_dir) {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("{:#}", e);
            return exit::FILESYSTEM;
        }
    };
    let _guard = match lock.try_acquire() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Another instance of dump-manager is already running: {:#}", e);
            return exit::LOCKED;
        }
    };

    let store = match GenerationStore::open(&config.main.backup_dir, config.main.link_strategy) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to prepare backup directory: {}", e);
            return exit::FILESYSTEM;
        }
    };

    let log_file = store.current().log_path();
    let logging_config = LoggingConfig::from_config(&log_file, &config.main.log_level, debug_flag);
    if let Err(e) = logging::init_logging(&logging_config) {
        eprintln!("{:#}", e);
        return exit::FILESYSTEM;
    }

    debug!("Using configuration file: {}", config_path.display());
    if debug_flag {
        debug!("Debug mode enabled via command line argument");
    }

    run(&config, store, &log_file)
}

/// Everything after the lock is held and logging writes into the generation
fn run(config: &Config, mut store: GenerationStore, log_file: &Path) -> u8 {
    let started = Instant::now();
    let executor: Arc<dyn CommandExecutor> = Arc::new(RealExecutor::new());
    let conditions = ShellConditions::new(Arc::clone(&executor), config.conditions.clone());
    let metrics = ZabbixSender::new(Arc::clone(&executor), config.zabbix.clone());

    if conditions.check_skip() {
        info!("Backup skipped due to skip conditions (but considered successful)");
        report(&metrics, &BackupResult::skipped_successfully(), log_file);
        return discard(store, exit::SUCCESS);
    }

    if !conditions.check_run() {
        error!("Backup aborted due to failed run conditions");
        report(&metrics, &BackupResult::skipped_faulty(), log_file);
        return discard(store, exit::FAILURE);
    }

    if config.main.delete_before {
        debug!(
            "Removing old backup directories before new backup. Will keep {} versions ...",
            config.main.versions
        );
        match store.cleanup_before(config.main.versions) {
            Ok(removed) => info!("Removed old backup directories: {:?}", removed),
            Err(e) => {
                error!("{}", e);
                report(&metrics, &BackupResult::skipped_faulty(), log_file);
                return exit::FILESYSTEM;
            }
        }
    }

    let inventory = match MysqlInventory::connect(Arc::clone(&executor), &config.main.mysql_bin) {
        Ok(inventory) => inventory,
        Err(e) => {
            error!("{:#}", e);
            report(&metrics, &BackupResult::skipped_faulty(), log_file);
            return discard(store, exit::FAILURE);
        }
    };
    let pipeline = MysqldumpPipeline::new(
        config.main.mysqldump_bin.clone(),
        config.main.mysqldump_options.clone(),
    );
    let mut scheduler = DumpScheduler::new(
        Arc::new(inventory),
        Arc::new(pipeline),
        SchedulerOptions::from_config(&config.main),
    );

    info!("Performing the backup now ...");
    let result = match scheduler.execute(&store) {
        Ok(result) => result,
        Err(e) if e.is_admission_failure() => {
            error!("{}", e);
            report(&metrics, &BackupResult::skipped_faulty(), log_file);
            return discard(store, exit::NOT_ENOUGH_SPACE);
        }
        Err(SchedulerError::Store(e)) => {
            error!("{}", e);
            report(&metrics, &BackupResult::skipped_faulty(), log_file);
            return exit::FILESYSTEM;
        }
        Err(e) => {
            error!("{}", e);
            report(&metrics, &BackupResult::skipped_faulty(), log_file);
            return discard(store, exit::FAILURE);
        }
    };

    let mut fatal = false;
    if !config.main.delete_before {
        debug!(
            "Removing old backup directories after current backup. Will keep {} versions ...",
            config.main.versions
        );
        match store.cleanup_after(config.main.versions) {
            Ok(removed) => info!("Removed old backup directories: {:?}", removed),
            Err(e) => {
                error!("{}", e);
                fatal = true;
            }
        }
    }

    // Does not change the run result
    if !conditions.execute_terminate(store.current().path()) {
        error!("One or more terminate conditions failed");
    }

    info!(
        "{} Took {}.",
        result,
        format_duration(started.elapsed().as_secs())
    );
    report(&metrics, &result, log_file);

    if fatal {
        exit::FILESYSTEM
    } else if result.is_success() {
        exit::SUCCESS
    } else {
        exit::FAILURE
    }
}

/// Send the result; a failing sink never changes the exit status
fn report(metrics: &dyn MetricsSink, result: &BackupResult, log_file: &Path) {
    if let Err(e) = metrics.send(result, log_file) {
        warn!("Failed to send result to Zabbix: {:#}", e);
    }
}

/// Collapse the unused generation into `last.log`
fn discard(store: GenerationStore, code: u8) -> u8 {
    match store.remove_skipped() {
        Ok(()) => code,
        Err(e) => {
            error!("{}", e);
            exit::FILESYSTEM
        }
    }
}
