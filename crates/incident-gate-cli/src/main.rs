// crates/incident-gate-cli/src/main.rs
// ============================================================================
// Module: Incident Gate CLI Entry Point
// Description: Command dispatcher for serving and inspecting Incident Gate.
// Purpose: Start the MCP server and validate configuration and catalogs.
// Dependencies: clap, incident-gate-config, incident-gate-mcp, thiserror, tokio.
// ============================================================================

//! ## Overview
//! The Incident Gate CLI runs the MCP server over SSE or stdio and offers
//! offline checks for configuration files and tool catalogs. Diagnostics go
//! to stderr through `tracing` so stdout stays free for the stdio transport
//! and for command output.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use incident_gate_backend::TableApiBackend;
use incident_gate_config::IncidentGateConfig;
use incident_gate_config::ServerTransport;
use incident_gate_mcp::McpServer;
use incident_gate_mcp::ToolCatalog;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "incident-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Incident Gate MCP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Tool catalog utilities.
    Catalog {
        /// Selected catalog subcommand.
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to incident-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the bind host for the SSE transport.
    #[arg(long, value_name = "HOST")]
    host: Option<String>,
    /// Override the bind port for the SSE transport.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
    /// Override the configured transport.
    #[arg(long, value_enum, value_name = "TRANSPORT")]
    transport: Option<TransportArg>,
}

/// Transport selection on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TransportArg {
    /// Content-Length framed JSON over stdin/stdout.
    Stdio,
    /// HTTP server with SSE streams and the REST facade.
    Sse,
}

impl From<TransportArg> for ServerTransport {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Stdio => Self::Stdio,
            TransportArg::Sse => Self::Sse,
        }
    }
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a configuration file.
    Validate(ConfigPathArgs),
}

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// List packages and their tools.
    List(CatalogListCommand),
}

/// Shared `--config` argument.
#[derive(Args, Debug)]
struct ConfigPathArgs {
    /// Optional config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `catalog list`.
#[derive(Args, Debug)]
struct CatalogListCommand {
    /// Optional config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Only list tools of this package.
    #[arg(long, value_name = "NAME")]
    package: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures, each mapped to a non-zero exit code.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration could not be loaded or validated.
    #[error("config error: {0}")]
    Config(String),
    /// The server could not be built.
    #[error("server init failed: {0}")]
    Init(String),
    /// The server stopped with an error.
    #[error("server failed: {0}")]
    Serve(String),
    /// The tool catalog is invalid or the package is unknown.
    #[error("catalog error: {0}")]
    Catalog(String),
    /// Writing command output failed.
    #[error("failed to write {stream}: {error}")]
    Output {
        /// Stream label.
        stream: &'static str,
        /// Underlying I/O error text.
        error: String,
    },
}

impl CliError {
    /// Exit code for the failure class.
    const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Catalog(_) => 2,
            Self::Init(_) | Self::Serve(_) | Self::Output {
                ..
            } => 1,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => emit_error(&err),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command: ConfigCommand::Validate(args),
        } => command_config_validate(&args),
        Commands::Catalog {
            command: CatalogCommand::List(command),
        } => command_catalog_list(&command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<()> {
    let mut config = load_config(command.config.as_deref())?;
    apply_serve_overrides(&mut config, &command);
    init_tracing(&config.server.log_level);
    tracing::info!(
        transport = config.server.transport.as_str(),
        bind = config.server.bind_address(),
        "starting incident gate"
    );
    let server = McpServer::from_config(config).map_err(|err| CliError::Init(err.to_string()))?;
    server.serve().await.map_err(|err| CliError::Serve(err.to_string()))
}

/// Applies `--host`, `--port`, and `--transport` to the loaded config.
fn apply_serve_overrides(config: &mut IncidentGateConfig, command: &ServeCommand) {
    if let Some(transport) = command.transport {
        config.server.transport = transport.into();
    }
    if command.host.is_none() && command.port.is_none() {
        return;
    }
    let current = config.server.bind_address().to_string();
    let (current_host, current_port) = split_bind(&current);
    let host = command.host.as_deref().map_or(current_host, str::trim);
    let port = command.port.map_or_else(|| current_port.to_string(), |port| port.to_string());
    config.server.bind = Some(join_bind(host, &port));
}

/// Splits `host:port`, keeping IPv6 brackets on the host.
fn split_bind(bind: &str) -> (&str, &str) {
    bind.rsplit_once(':').unwrap_or((bind, ""))
}

/// Joins a host and port, bracketing bare IPv6 hosts.
fn join_bind(host: &str, port: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Installs the tracing subscriber on stderr.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Executes `config validate`.
fn command_config_validate(args: &ConfigPathArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    write_stdout_line(&format!(
        "config ok: transport={} bind={} table={} package={}",
        config.server.transport.as_str(),
        config.server.bind_address(),
        config.backend.table,
        config.catalog.default_package,
    ))
}

/// Loads and validates configuration.
fn load_config(path: Option<&std::path::Path>) -> CliResult<IncidentGateConfig> {
    IncidentGateConfig::load(path).map_err(|err| CliError::Config(err.to_string()))
}

// ============================================================================
// SECTION: Catalog Command
// ============================================================================

/// Executes `catalog list`.
fn command_catalog_list(command: &CatalogListCommand) -> CliResult<()> {
    let config = load_config(command.config.as_deref())?;
    let backend = TableApiBackend::from_config(&config.backend)
        .map_err(|err| CliError::Init(err.to_string()))?;
    let catalog = ToolCatalog::load(&config.catalog, &backend)
        .map_err(|err| CliError::Catalog(err.to_string()))?;
    for line in render_catalog(&catalog, command.package.as_deref())? {
        write_stdout_line(&line)?;
    }
    Ok(())
}

/// Renders packages and tools as text lines.
///
/// Without a package every package is listed with its tool names; with one,
/// each tool is listed with its description.
fn render_catalog(catalog: &ToolCatalog, package: Option<&str>) -> CliResult<Vec<String>> {
    if let Some(name) = package {
        let resolved = catalog.resolve(name).map_err(|err| CliError::Catalog(err.to_string()))?;
        return Ok(resolved
            .tools()
            .iter()
            .map(|tool| format!("{}\t{}", tool.name, tool.description))
            .collect());
    }
    let mut lines = Vec::new();
    for name in catalog.package_names() {
        let resolved = catalog.resolve(name).map_err(|err| CliError::Catalog(err.to_string()))?;
        let tools: Vec<&str> = resolved.tools().iter().map(|tool| tool.name.as_str()).collect();
        let marker = if name == catalog.default_package() { " (default)" } else { "" };
        lines.push(format!("{name}{marker}: {}", tools.join(", ")));
    }
    Ok(lines)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError::Output {
        stream: "stdout",
        error: err.to_string(),
    })
}

/// Emits an error message to stderr and returns its exit code.
fn emit_error(err: &CliError) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "incident-gate: {err}");
    ExitCode::from(err.exit_code())
}
