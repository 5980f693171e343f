use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pacebot::ai::OpenAiClient;
use pacebot::line::LineClient;
use pacebot::memory::{self, ConversationRepo};
use pacebot::mention::MentionGrace;
use pacebot::name::NameHintResolver;
use pacebot::reward::RewardPool;
use pacebot::{ApiState, Config, api};

/// Pacebot - LINE conversational running coach
#[derive(Parser)]
#[command(name = "pacebot", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PACEBOT_PORT", default_value = "8080")]
    port: u16,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,pacebot=info",
        1 => "info,pacebot=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli.port).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(port: u16) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing::info!(
        mention_only = config.mention_only,
        model = %config.openai_model,
        "starting pacebot"
    );

    let pool = memory::init(&config.db_path)?;
    let conversations = ConversationRepo::new(pool, config.history_max_turns, config.history_ttl);

    let platform = Arc::new(LineClient::new(config.channel_access_token.clone()));
    let ai = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
    ));
    let names = NameHintResolver::new(config.name_cache_ttl);
    let grace = Mutex::new(MentionGrace::new(config.mention_grace));
    let rewards = RewardPool::new(config.rewards_dir.clone(), config.base_url.clone());

    let state = Arc::new(ApiState {
        config,
        platform,
        ai,
        conversations,
        names,
        grace,
        rewards,
    });

    api::serve(state, port).await?;
    Ok(())
}
