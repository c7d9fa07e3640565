// CLI flags and the interactive node console

use crate::config::{NodeConfig, DEFAULT_BOOTSTRAP_PORTS};
use crate::consensus::pow::DEFAULT_DIFFICULTY;
use crate::core::Block;
use crate::error::Result;
use crate::network::Node;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "gossip-coin")]
#[command(about = "Proof-of-work ledger node with gossip replication", long_about = None)]
pub struct Cli {
    /// Port to listen on; also this node's ledger address
    #[arg(short, long, default_value_t = DEFAULT_BOOTSTRAP_PORTS[0])]
    pub port: u16,

    /// Host peers use to reach this node
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Leading zero hex digits required of a block hash
    #[arg(short, long, default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,

    /// Directory holding the block database
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Keep the chain in memory only
    #[arg(long)]
    pub memory: bool,

    /// Connect and send timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub timeout_secs: u64,

    /// Bootstrap port on the same host (repeatable, defaults to 5001-5004)
    #[arg(short, long = "bootstrap")]
    pub bootstrap: Vec<u16>,

    /// Run without the interactive console
    #[arg(long)]
    pub no_console: bool,
}

impl Cli {
    pub fn into_config(self) -> NodeConfig {
        let bootstrap_ports = if self.bootstrap.is_empty() {
            DEFAULT_BOOTSTRAP_PORTS.to_vec()
        } else {
            self.bootstrap
        };

        NodeConfig {
            host: self.host,
            port: self.port,
            difficulty: self.difficulty,
            data_dir: self.data_dir,
            in_memory: self.memory,
            bootstrap_ports,
            timeout: Duration::from_secs(self.timeout_secs),
            ..NodeConfig::default()
        }
    }
}

/// One console line, parsed with the command name first
#[derive(Parser, Debug)]
#[command(multicall = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Show a balance (this node's if no address is given)
    Balance { address: Option<String> },

    /// Pay from this node's account
    Send { recipient: String, amount: u64 },

    /// Mine the pending transactions into a block
    Mine,

    /// List known peers
    Peers,

    /// Connect to another node
    Connect { host: String, port: u16 },

    /// Print the chain
    Chain,

    /// List pending transactions
    Pending,

    /// Stop the node
    #[command(alias = "exit")]
    Quit,
}

/// Parse a console line. Blank lines yield `None`; `help` and mistakes
/// come back as a clap error that prints the usage text.
pub fn parse_line(line: &str) -> std::result::Result<Option<ConsoleCommand>, clap::Error> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(None);
    }
    ConsoleLine::try_parse_from(words).map(|parsed| Some(parsed.command))
}

/// Console command handler
pub struct CommandHandler {
    node: Arc<Node>,
}

impl CommandHandler {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    /// Read commands from stdin until `quit` or end of input
    pub async fn run(&self) -> Result<()> {
        println!("Node {} ready. Type 'help' for commands.", self.node.address());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match parse_line(&line) {
                Ok(Some(command)) => {
                    if !self.handle(command).await? {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = e.print();
                }
            }
        }
        Ok(())
    }

    /// Execute one command. Returns false when the console should stop.
    pub async fn handle(&self, command: ConsoleCommand) -> Result<bool> {
        match command {
            ConsoleCommand::Balance { address } => {
                let address = address.unwrap_or_else(|| self.node.address().to_string());
                println!("Balance of {}: {}", address, self.node.balance_of(&address).await);
            }
            ConsoleCommand::Send { recipient, amount } => {
                if self.node.add_transaction(&recipient, amount).await {
                    println!("✓ Queued {} -> {}: {}", self.node.address(), recipient, amount);
                } else {
                    println!("Insufficient balance for {}", amount);
                }
            }
            ConsoleCommand::Mine => match self.node.start_mining().await? {
                Some(block) => {
                    println!("✓ Mined block {}", block.index);
                    println!("  Hash: {}", block.hash);
                    println!("  Nonce: {}", block.nonce);
                }
                None => println!("No pending transactions to mine"),
            },
            ConsoleCommand::Peers => {
                let peers = self.node.peers();
                println!("Peers ({}):", peers.len());
                for peer in peers {
                    println!("  {}", peer);
                }
            }
            ConsoleCommand::Connect { host, port } => {
                if self.node.connect_to_peer(&host, port).await {
                    println!("✓ Connected to {}:{}", host, port);
                } else {
                    println!("Not connected to {}:{}", host, port);
                }
            }
            ConsoleCommand::Chain => {
                let chain = self.node.chain().read().await;
                println!("Chain ({} blocks, difficulty {}):", chain.len(), chain.difficulty());
                for block in chain.blocks() {
                    print_block(block);
                }
            }
            ConsoleCommand::Pending => {
                let chain = self.node.chain().read().await;
                println!("Pending ({}):", chain.pending().len());
                for tx in chain.pending() {
                    println!("  {}", tx);
                }
            }
            ConsoleCommand::Quit => return Ok(false),
        }
        Ok(true)
    }
}

fn print_block(block: &Block) {
    println!(
        "  [{}] {} <- {} nonce {} txs {}",
        block.index,
        block.hash.short(),
        block.previous_hash.short(),
        block.nonce,
        block.transactions.len()
    );
    for tx in &block.transactions {
        println!("      {}", tx);
    }
}
