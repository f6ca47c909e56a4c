use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use aps_gateway::messages::{OrderType, WorkpieceColor};
use aps_gateway::mqtt::BuildRequest;
use aps_gateway::{Config, Daemon, ModuleOrderParams, SendOptions};

/// APS - Order workflow and message coordination gateway
#[derive(Parser)]
#[command(name = "aps", version, about)]
struct Cli {
    /// Path to the config file (defaults to the platform config dir)
    #[arg(short, long, env = "APS_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway until interrupted
    Run,
    /// Load the registry and report what it declares
    Check,
    /// Resolve a concrete topic against the mapping
    Route {
        /// Concrete MQTT topic
        topic: String,
    },
    /// Build and send one order through the gateway
    SendOrder {
        /// Module id or serial (e.g. "DRILL")
        #[arg(short, long)]
        module: String,
        /// Module command (e.g. "PICK")
        command: String,
        /// Workpiece color to stamp on the order
        #[arg(long)]
        workpiece: Option<String>,
    },
    /// Build and send a CCU order request
    CcuOrder {
        /// Workpiece color (RED, WHITE, BLUE)
        color: String,
        /// Order type (PRODUCTION, STORAGE, RETRIEVAL)
        #[arg(default_value = "PRODUCTION")]
        order_type: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,aps_gateway=info",
        1 => "info,aps_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let daemon = Daemon::new(config)?;
            tracing::info!("aps gateway ready");
            daemon.run().await?;
        }
        Command::Check => cmd_check(&config)?,
        Command::Route { topic } => cmd_route(&config, &topic)?,
        Command::SendOrder {
            module,
            command,
            workpiece,
        } => cmd_send_order(config, &module, &command, workpiece).await?,
        Command::CcuOrder { color, order_type } => {
            cmd_ccu_order(config, &color, &order_type).await?;
        }
    }
    Ok(())
}

/// Load the registry, print a summary, and verify mapping→template links
fn cmd_check(config: &Config) -> anyhow::Result<()> {
    let registry = std::sync::Arc::new(aps_gateway::Registry::load(&config.registry_root)?);

    println!("registry:  {}", registry.root().display());
    println!("version:   {}", registry.manifest().version);
    println!("modules:   {}", registry.modules().modules.len());
    println!("mappings:  {}", registry.mapping().mappings.len());
    println!("templates: {}", registry.templates().len());
    println!("topics:    {}", registry.topics().len());
    println!("workpieces: {}", registry.workpieces().nfc_codes.len());

    let templates = aps_gateway::TemplateManager::new(registry);
    let dangling = templates.dangling_mapping_refs();
    for (route, template) in &dangling {
        println!("dangling:  {route} -> {template}");
    }
    if !dangling.is_empty() {
        anyhow::bail!("{} mapping entries reference missing templates", dangling.len());
    }
    Ok(())
}

/// Resolve one topic and print the match
fn cmd_route(config: &Config, topic: &str) -> anyhow::Result<()> {
    let registry = std::sync::Arc::new(aps_gateway::Registry::load(&config.registry_root)?);
    let resolver = aps_gateway::TopicResolver::new(registry);

    match resolver.route(topic) {
        Some(m) => {
            println!("template:  {}", m.template);
            println!("direction: {:?}", m.direction);
            for (name, value) in &m.vars {
                println!("var {name} = {value}");
            }
        }
        None => println!("no mapping for {topic}"),
    }
    Ok(())
}

/// Send a single module order through the full gateway path
async fn cmd_send_order(
    config: Config,
    module: &str,
    command: &str,
    workpiece: Option<String>,
) -> anyhow::Result<()> {
    let workpiece = workpiece.as_deref().map(WorkpieceColor::parse).transpose()?;
    let daemon = Daemon::new(config)?;
    daemon.start().await?;

    let report = daemon
        .gateway()
        .send(
            &BuildRequest::ModuleOrder {
                module: module.to_string(),
                command: command.to_string(),
                params: ModuleOrderParams {
                    workpiece,
                    ..ModuleOrderParams::default()
                },
            },
            &SendOptions::default(),
        )
        .await?;

    println!("topic:     {}", report.topic);
    println!("published: {}", report.published);
    for finding in &report.findings {
        println!("finding:   {finding}");
    }
    daemon.client().disconnect().await;
    Ok(())
}

/// Send a CCU order request
async fn cmd_ccu_order(config: Config, color: &str, order_type: &str) -> anyhow::Result<()> {
    let color = WorkpieceColor::parse(color)?;
    let order_type = OrderType::parse(order_type)?;
    let daemon = Daemon::new(config)?;
    daemon.start().await?;

    let report = daemon
        .gateway()
        .send(
            &BuildRequest::CcuOrder {
                color,
                order_type,
                workpiece_id: None,
                ai_inspection: None,
            },
            &SendOptions::default(),
        )
        .await?;

    println!("topic:     {}", report.topic);
    println!("published: {}", report.published);
    daemon.client().disconnect().await;
    Ok(())
}
