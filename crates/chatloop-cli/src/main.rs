use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chatloop_agents::{ToolContext, TurnExecutor};
use chatloop_common::ChatMessage;
use chatloop_config::{AppConfig, ConfigLoader};
use chatloop_gateway::GatewayServer;
use chatloop_security::RedactingMakeWriter;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// chatloop: a chat model behind HTTP, with per-thread memory and tool calls.
#[derive(Parser, Debug)]
#[command(name = "chatloop", version, about)]
struct Cli {
    /// Config file (.yaml, .yml or .toml). Environment variables override it.
    #[arg(short, long, global = true, env = "CHATLOOP_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `chatloop_agents=trace`. Defaults to RUST_LOG, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ask one question without conversation memory and print the answer.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// List the tools the model can call with the current configuration.
    Tools,
}

fn init_tracing(level: Option<&str>, json: bool) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log filter '{level}'"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(RedactingMakeWriter::stderr());

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    loader.load().context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref(), cli.log_json)?;

    let mut config = load_config(cli.config)?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }

            let executor = TurnExecutor::build(&config).context("failed to set up the agent")?;
            info!(
                model = %config.llm.model,
                address = %config.bind_address(),
                "starting chatloop"
            );
            GatewayServer::new(config, executor)
                .run()
                .await
                .context("gateway stopped with an error")?;
        }
        Command::Ask { question } => {
            let executor = TurnExecutor::build(&config).context("failed to set up the agent")?;
            let outcome = executor
                .run_turn(
                    vec![ChatMessage::user(question.join(" "))],
                    &ToolContext::default(),
                )
                .await
                .context("turn failed")?;
            println!("{}", outcome.reply.content);
        }
        Command::Tools => {
            let executor = TurnExecutor::build(&config).context("failed to set up the agent")?;
            let tools = executor.tools().describe_all();
            if tools.is_empty() {
                println!("No tools enabled.");
            }
            for tool in tools {
                println!("{:<14} {}", tool.name, tool.description);
            }
        }
    }

    Ok(())
}
