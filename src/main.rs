//! Interop Runtime CLI entry point.
//!
//! Loads a guest module with the standard host bundles registered and
//! either lists its exports or calls one of them.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use interop_runtime_common::{ConfigFile, LoggingConfig};
use interop_runtime_core::{ExportKind, ModuleHandle, RuntimeContext, Value};
use interop_runtime_host::{LogSink, register_all};

#[derive(Parser, Debug)]
#[command(name = "interop-runtime")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "INTEROP_RUNTIME_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a module's exports with their types
    Exports {
        /// Module file (`.wasm` is loaded as binary, anything else as text)
        module: PathBuf,
    },
    /// Call an exported function
    Call {
        /// Module file (`.wasm` is loaded as binary, anything else as text)
        module: PathBuf,
        /// Export to call
        export: String,
        /// Arguments, parsed according to the export's signature
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    init_tracing(&config.logging);
    debug!(?config, "Configuration loaded");

    let mut ctx = RuntimeContext::with_config(config.runtime)?;
    let sink = LogSink::new();
    register_all(&mut ctx, &sink)?;

    match cli.command {
        Command::Exports { module } => {
            let handle = load(&mut ctx, &module)?;
            for export in handle.exports()? {
                println!("{:<24} {}", export.name, export.kind);
            }
        }
        Command::Call {
            module,
            export,
            args,
        } => {
            let handle = load(&mut ctx, &module)?;
            let values = parse_args(&handle, &export, &args)?;
            let result = handle.call_dynamic(&mut ctx, &export, &values)?;

            info!(export = %export, host_calls = ctx.host_calls()?, "Call completed");
            match result {
                Some(value) => println!("{value}"),
                None => println!("()"),
            }
        }
    }

    ctx.dispose();
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(logging.json.then(|| fmt::layer().json()))
        .with((!logging.json).then(|| fmt::layer()))
        .init();
}

fn load(ctx: &mut RuntimeContext, path: &Path) -> anyhow::Result<ModuleHandle> {
    let is_binary = path.extension().is_some_and(|ext| ext == "wasm");
    let handle = if is_binary {
        ctx.load_from_binary_file(path)?
    } else {
        ctx.load_from_file(path)?
    };
    info!(module = handle.name(), "Module loaded");
    Ok(handle)
}

fn parse_args(handle: &ModuleHandle, export: &str, args: &[String]) -> anyhow::Result<Vec<Value>> {
    let Some(info) = handle.exports()?.into_iter().find(|e| e.name == export) else {
        bail!("Module '{}' has no export '{export}'", handle.name());
    };

    let ExportKind::Function {
        signature: Some(signature),
        description,
    } = &info.kind
    else {
        bail!("Export '{export}' is not a callable numeric function: {}", info.kind);
    };

    if signature.params().len() != args.len() {
        bail!(
            "Export '{export}' {description} takes {} arguments, got {}",
            signature.params().len(),
            args.len()
        );
    }

    signature
        .params()
        .iter()
        .zip(args)
        .map(|(kind, text)| {
            Value::parse(*kind, text)
                .with_context(|| format!("Argument '{text}' is not a valid {kind}"))
        })
        .collect()
}
