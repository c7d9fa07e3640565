// Gossip Coin - node binary

use clap::Parser;
use gossip_coin::{BlockchainDB, Chain, Cli, CommandHandler, MemoryStore, Node, NodeConfig};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let console = !cli.no_console;
    let config = cli.into_config();

    if let Err(e) = run(config, console).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: NodeConfig, console: bool) -> gossip_coin::Result<()> {
    // Storage must open before anything listens
    let chain = open_chain(&config)?;
    let node = Node::start(config, chain).await?;

    if console {
        CommandHandler::new(node).run().await?;
    } else {
        tokio::signal::ctrl_c().await?;
    }

    log::info!("Shutting down");
    Ok(())
}

fn open_chain(config: &NodeConfig) -> gossip_coin::Result<Chain> {
    let chain = if config.in_memory {
        Chain::new(config.difficulty, MemoryStore::new())?
    } else {
        let path = config.db_path();
        log::info!("Opening block database at {}", path.display());
        Chain::new(config.difficulty, BlockchainDB::new(path)?)?
    };
    Ok(chain)
}
