//! Node configuration

use crate::consensus::pow::DEFAULT_DIFFICULTY;
use crate::network::PeerAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Well-known ports every node tries at startup
pub const DEFAULT_BOOTSTRAP_PORTS: [u16; 4] = [5001, 5002, 5003, 5004];

/// Bound on outbound connect plus send
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest inbound message accepted
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Fingerprints kept per dedup set
pub const DEFAULT_SEEN_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Host peers should use to reach us
    pub host: String,
    /// Listening port; 0 picks a free one. Also the node's ledger address.
    pub port: u16,
    pub difficulty: usize,
    pub data_dir: PathBuf,
    /// Keep blocks in memory instead of on disk
    pub in_memory: bool,
    pub bootstrap_ports: Vec<u16>,
    pub timeout: Duration,
    pub max_message_bytes: usize,
    pub seen_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_BOOTSTRAP_PORTS[0],
            difficulty: DEFAULT_DIFFICULTY,
            data_dir: PathBuf::from("./data"),
            in_memory: false,
            bootstrap_ports: DEFAULT_BOOTSTRAP_PORTS.to_vec(),
            timeout: DEFAULT_TIMEOUT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
        }
    }
}

impl NodeConfig {
    /// Bootstrap peers on our host, minus our own port
    pub fn bootstrap_peers(&self) -> Vec<PeerAddr> {
        self.bootstrap_ports
            .iter()
            .filter(|port| **port != self.port)
            .map(|port| PeerAddr::new(self.host.clone(), *port))
            .collect()
    }

    /// Per-port database directory so several nodes can share a data dir
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("node-{}", self.port))
    }
}
