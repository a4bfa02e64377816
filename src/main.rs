use clap::{Parser, Subcommand};
use fci::config;
use fci::engine::Engine;
use fci::telemetry::{init_logging, LogConfig, MetricsRegistry};
use fci::transport::EngineServer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "fci")]
#[command(about = "Forwarding engine control interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the engine daemon
    Run {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a default config.toml
    Generate {
        /// Output path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate config.toml
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Config { action }) => {
            init_logging(None);
            match action {
                ConfigAction::Generate { output } => cmd_config_generate(output.as_ref()),
                ConfigAction::Validate {
                    config: config_path,
                } => cmd_config_validate(&config_path),
            }
        }
        Some(Commands::Run {
            config: config_path,
        }) => cmd_run(&config_path),
        None => cmd_run(&PathBuf::from("config.toml")),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(config_path: &PathBuf) -> Result<(), String> {
    use tokio::runtime::Runtime;

    let cfg = config::load(config_path).map_err(|e| format!("Failed to load config: {}", e))?;

    // RUST_LOG still takes priority over [logging]
    init_logging(Some(&LogConfig::from(&cfg.logging)));
    info!("Loaded {}", config_path.display());

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let engine = Arc::new(
        Engine::with_metrics(&cfg, metrics.clone())
            .map_err(|e| format!("Failed to initialize engine: {}", e))?,
    );

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let server = EngineServer::bind(cfg.engine.listen, engine)
            .await
            .map_err(|e| format!("Failed to bind {}: {}", cfg.engine.listen, e))?
            .with_aging_interval(Some(Duration::from_secs(cfg.engine.aging_interval)));
        let handle = server.handle();
        let task = tokio::spawn(server.run());

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to wait for ctrl-c: {}", e);
        }
        info!("Shutting down...");
        handle.shutdown();

        match task.await {
            Ok(result) => result.map_err(|e| format!("Engine server failed: {}", e))?,
            Err(e) => return Err(format!("Engine server task failed: {}", e)),
        }

        for (name, value) in metrics.export() {
            info!("{} = {}", name, value);
        }
        Ok(())
    })
}

fn cmd_config_generate(output: Option<&PathBuf>) -> Result<(), String> {
    let rendered = config::render(&config::Config::default())
        .map_err(|e| format!("Failed to render config: {}", e))?;

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .map_err(|e| format!("Failed to write config file: {}", e))?;
            println!("[INFO] Generated {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn cmd_config_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}
