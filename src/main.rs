use anyhow::Result;
use clap::Parser;
use fitrec::{ActivityRecorder, FitrecConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fitrec")]
#[command(about = "Background activity recorder with sensor aggregation and local persistence")]
#[command(version)]
#[command(long_about = "A background activity recorder that samples position, motion and \
step-count sources, aggregates them into periodic summary records, persists each summary \
into a local SQLite log, and forwards summaries to an optional decision endpoint that can \
answer with rate-limited local notifications.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "fitrec.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the recorder")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - build the recorder but don't start it
    #[arg(long, help = "Perform dry run - wire up components but don't start recording")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config();
        return Ok(());
    }

    // Initialize logging
    init_logging(&args)?;

    info!("Starting fitrec v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Load and validate configuration
    let config = match FitrecConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    // Build the recorder: providers probed, endpoint wired when configured
    let recorder = ActivityRecorder::new(config).map_err(|e| {
        error!("Failed to build recorder: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - recorder built but not started");
        println!("✓ Dry run completed successfully - recorder wired up");
        return Ok(());
    }

    recorder.start().await.map_err(|e| {
        error!("Failed to start recorder: {}", e);
        e
    })?;

    // Record until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Interrupt received; shutting down");

    recorder.stop();
    info!("fitrec exited cleanly");
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fitrec={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Fitrec Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Any value can also be overridden via environment, e.g.");
    println!("#   FITREC_STORAGE__DATABASE_PATH=/var/lib/fitrec/fitrec.sqlite");
    println!();
    println!("{}", fitrec::config::DEFAULT_CONFIG_TOML);
}
