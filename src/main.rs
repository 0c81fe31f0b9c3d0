use anyhow::Result;
use clap::Parser;
use log::{info, LevelFilter};
use serde_json::json;

use coevolve::agent::{Agent, Capability, ConfidenceUpdater};
use coevolve::core::config::Config;
use coevolve::inference::InferenceFactory;
use coevolve::protocol::CollaborationProtocol;

#[derive(Parser)]
#[clap(author, version, about = "A collaboration and trust protocol for autonomous AI agents")]
struct Cli {
    /// Path to config file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Debug mode
    #[clap(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new().filter_level(log_level).init();

    info!("Starting coevolve - agent collaboration protocol");

    // Load configuration
    let config = Config::from_file(&cli.config)?;
    let inference = InferenceFactory::create(&config.inference)?;
    let updater = ConfidenceUpdater::new(config.protocol.learning_rate);

    let protocol = CollaborationProtocol::new(config.protocol.clone());

    // Two demo agents with the capabilities the protocol matches on
    protocol.register_agent(Agent::new(
        "agent-1",
        vec![Capability::new(
            "textAnalysis",
            "Analyze text content",
            vec!["content".to_string()],
            0.9,
        )],
        inference.clone(),
        updater,
        config.agent.clone(),
    ));
    protocol.register_agent(Agent::new(
        "agent-2",
        vec![Capability::new(
            "patternRecognition",
            "Identify patterns in text",
            vec!["data".to_string()],
            0.85,
        )],
        inference,
        updater,
        config.agent,
    ));

    let participants = vec!["agent-1".to_string(), "agent-2".to_string()];
    let task = json!({"content": "please analyze this text and identify patterns"});

    let outcome = protocol.collaborate(&participants, &task).await?;

    info!(
        "Session {} finished with status {} at confidence {:.3}",
        outcome.session_id, outcome.status, outcome.confidence
    );
    if let Some(result) = outcome.result {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}
