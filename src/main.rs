use anyhow::Result;
use clap::Parser;
use spyglass::agents::{self, AgentFilter};
use spyglass::output;
use spyglass::platform;

#[derive(Parser, Debug)]
#[command(name = "spyglass")]
#[command(about = "Discover local AI coding-agent processes and their session status")]
#[command(version)]
struct Args {
    /// Output machine-readable JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Comma-separated agents to probe (opencode,codex,claude,amp,gemini); default: all
    #[arg(long)]
    agents: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout carries only the session list.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("spyglass=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let filter = AgentFilter::parse(args.agents.as_deref().unwrap_or(""));

    let platform = platform::host_platform();
    let sessions = agents::discover_all(platform.as_ref(), &filter).await;

    if sessions.is_empty() {
        if args.json {
            println!("[]");
        } else {
            println!("No agent sessions found.");
        }
        return Ok(());
    }

    if args.json {
        println!("{}", output::render_json(&sessions)?);
    } else {
        print!("{}", output::render_table(&sessions));
    }
    Ok(())
}
