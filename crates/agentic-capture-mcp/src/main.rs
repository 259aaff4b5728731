//! AgenticCapture MCP Server entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use agentic_capture::find_chromium;
use agentic_capture_mcp::config::{resolve_download_dir, ServerConfig};
use agentic_capture_mcp::prompts::PromptRegistry;
use agentic_capture_mcp::protocol::ProtocolHandler;
use agentic_capture_mcp::resources::ResourceRegistry;
use agentic_capture_mcp::session::CaptureSessionManager;
use agentic_capture_mcp::tools::ToolRegistry;
use agentic_capture_mcp::transport::StdioTransport;

#[derive(Parser)]
#[command(
    name = "agentic-capture-mcp",
    about = "MCP server for AgenticCapture — click a button in a browser and get the file",
    version
)]
struct Cli {
    /// Directory that persisting tools write into.
    #[arg(short, long, global = true)]
    download_dir: Option<String>,

    /// Path to a Chromium or Chrome executable.
    #[arg(long, global = true)]
    chromium: Option<PathBuf>,

    /// Show the browser window instead of running headless.
    #[arg(long, global = true)]
    headful: bool,

    /// Default time to wait for a file after clicking, in milliseconds.
    #[arg(long, global = true)]
    default_wait_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    Serve,

    /// Print server capabilities as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   agentic-capture-mcp completions bash > ~/.local/share/bash-completion/completions/agentic-capture-mcp
    ///   agentic-capture-mcp completions zsh > ~/.zfunc/_agentic-capture-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn server_config(cli: &Cli) -> ServerConfig {
    let mut config = ServerConfig::new(resolve_download_dir(cli.download_dir.as_deref()));
    config.chromium.executable = cli.chromium.clone().or_else(find_chromium);
    config.chromium.headless = !cli.headful;
    if let Some(wait) = cli.default_wait_ms {
        config.capture.default_wait_ms = wait;
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.as_ref().unwrap_or(&Commands::Serve) {
        Commands::Serve => {
            let config = server_config(&cli);
            tracing::info!("AgenticCapture MCP server");
            tracing::info!("Download dir: {}", config.download_dir.display());
            match &config.chromium.executable {
                Some(path) => tracing::info!("Browser: {}", path.display()),
                None => tracing::warn!("No Chromium found; browser tools will fail until one is installed"),
            }

            let session = Arc::new(CaptureSessionManager::new(config));
            let handler = ProtocolHandler::new(Arc::clone(&session));
            let transport = StdioTransport::new(handler);
            let served = transport.run().await;
            session.shutdown().await;
            served?;
        }

        Commands::Info => {
            let init = agentic_capture_mcp::types::InitializeResult::capture_server();
            let info = serde_json::json!({
                "server": init.server_info,
                "protocolVersion": init.protocol_version,
                "capabilities": init.capabilities,
                "tools": ToolRegistry::list_tools()
                    .into_iter()
                    .map(|t| t.name)
                    .collect::<Vec<_>>(),
                "prompts": PromptRegistry::list_prompts()
                    .into_iter()
                    .map(|p| p.name)
                    .collect::<Vec<_>>(),
                "resourceTemplates": ResourceRegistry::list_templates()
                    .into_iter()
                    .map(|t| t.uri_template)
                    .collect::<Vec<_>>(),
                "downloadDir": resolve_download_dir(cli.download_dir.as_deref()),
                "chromium": cli.chromium.clone().or_else(find_chromium),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(
                *shell,
                &mut cmd,
                "agentic-capture-mcp",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
