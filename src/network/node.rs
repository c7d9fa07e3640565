// Gossip node - peer membership, message handling and broadcast

use crate::config::NodeConfig;
use crate::core::{Address, Amount, Balance, Block, BlockHash, Transaction};
use crate::error::{Error, Result};
use crate::ledger::Chain;
use crate::network::{read_message, send_to, Message, MessageError, MessageType, PeerAddr, PeerRegistry, SeenSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinSet;

/// Notifications for a display or console attached to the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    MessageReceived { kind: MessageType, from: SocketAddr },
    TransactionAdded(Transaction),
    BlockMined { index: u64, hash: BlockHash },
    BlockAccepted { index: u64, hash: BlockHash },
    ChainReplaced { length: usize },
    PeerAdded(PeerAddr),
    PeerRemoved(PeerAddr),
}

/// What an inbound message did to local state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Rejected,
    /// Already processed; nothing changed and nothing was re-broadcast
    Duplicate,
}

const EVENT_CAPACITY: usize = 256;

/// Network node
///
/// Shares one ledger and one peer registry between the accept loop, a task
/// per inbound connection, and local callers (mining, submissions).
pub struct Node {
    config: NodeConfig,
    /// Ledger identity: the listening port
    address: Address,
    chain: Arc<RwLock<Chain>>,
    peers: PeerRegistry,
    seen_transactions: SeenSet,
    seen_blocks: SeenSet,
    events: broadcast::Sender<NodeEvent>,
}

impl Node {
    /// Create a node around an existing ledger without listening yet
    pub fn new(config: NodeConfig, chain: Chain) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            address: config.port.to_string(),
            chain: Arc::new(RwLock::new(chain)),
            peers: PeerRegistry::new(),
            seen_transactions: SeenSet::new(config.seen_capacity),
            seen_blocks: SeenSet::new(config.seen_capacity),
            events,
            config,
        })
    }

    /// Bind the listening socket. Port 0 is resolved to the port actually bound.
    pub async fn bind(mut config: NodeConfig, chain: Chain) -> Result<(Arc<Self>, TcpListener)> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        config.port = listener.local_addr()?.port();
        Ok((Self::new(config, chain), listener))
    }

    /// Bind, start serving in the background, then contact the bootstrap peers
    pub async fn start(config: NodeConfig, chain: Chain) -> Result<Arc<Self>> {
        let (node, listener) = Self::bind(config, chain).await?;

        tokio::spawn(node.clone().serve(listener));
        node.bootstrap().await;

        Ok(node)
    }

    /// Accept connections forever, one task each
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        log::info!("Node listening on {}:{}", self.config.host, self.config.port);

        loop {
            match listener.accept().await {
                Ok((stream, from)) => {
                    let node = self.clone();
                    tokio::spawn(async move { node.handle_connection(stream, from).await });
                }
                Err(e) => log::error!("Failed to accept connection: {}", e),
            }
        }
    }

    /// Connect to every configured bootstrap peer except ourselves
    pub async fn bootstrap(&self) {
        for peer in self.config.bootstrap_peers() {
            self.connect_to_peer(&peer.host, peer.port).await;
        }
    }

    async fn handle_connection(&self, stream: TcpStream, from: SocketAddr) {
        match read_message(stream, self.config.max_message_bytes).await {
            Ok(message) => {
                log::debug!("Received {} from {}", message.message_type(), from);
                self.emit(NodeEvent::MessageReceived {
                    kind: message.message_type(),
                    from,
                });
                self.handle_message(message).await;
            }
            Err(e) => log::warn!("Dropping connection from {}: {}", from, e),
        }
    }

    /// Apply one inbound message
    pub async fn handle_message(&self, message: Message) -> Outcome {
        match message {
            Message::NewPeer { host, port } => self.on_new_peer(PeerAddr::new(host, port)).await,
            Message::GetPeers { host, port } => {
                let reply = Message::PeerList {
                    peers: self.peers.snapshot(),
                };
                self.send(&PeerAddr::new(host, port), &reply).await;
                Outcome::Accepted
            }
            Message::PeerList { peers } => {
                for peer in peers {
                    self.add_peer(peer);
                }
                Outcome::Accepted
            }
            Message::NewBlock { block } => self.on_new_block(block).await,
            Message::Chain { chain } => self.on_chain(chain).await,
            Message::NewTransaction { transaction } => self.on_new_transaction(transaction).await,
            Message::PendingTransactions { transactions } => {
                let added = self.chain.write().await.merge_pending(transactions);
                log::info!("Merged {} pending transactions from peer", added);
                Outcome::Accepted
            }
        }
    }

    async fn on_new_peer(&self, peer: PeerAddr) -> Outcome {
        if self.is_self(&peer) {
            return Outcome::Rejected;
        }
        self.add_peer(peer.clone());

        // Bootstrap sync for the newcomer
        let (chain, pending) = {
            let chain = self.chain.read().await;
            (chain.blocks().to_vec(), chain.pending().to_vec())
        };
        self.send(&peer, &Message::Chain { chain }).await;
        self.send(&peer, &Message::PendingTransactions { transactions: pending }).await;
        Outcome::Accepted
    }

    async fn on_new_block(&self, block: Block) -> Outcome {
        if !self.seen_blocks.insert(block.fingerprint()) {
            return Outcome::Duplicate;
        }

        let appended = self.chain.write().await.append_received_block(block.clone());
        match appended {
            Ok(()) => {
                self.emit(NodeEvent::BlockAccepted {
                    index: block.index,
                    hash: block.hash.clone(),
                });
                self.broadcast(&Message::NewBlock { block }).await;
                Outcome::Accepted
            }
            Err(Error::Validation(e)) => {
                log::info!("Block {} not appended ({}); waiting for a full chain", block.index, e);
                Outcome::Rejected
            }
            Err(e) => {
                log::error!("Failed to store block {}: {}", block.index, e);
                Outcome::Rejected
            }
        }
    }

    async fn on_chain(&self, chain: Vec<Block>) -> Outcome {
        let replaced = self.chain.write().await.replace_chain(chain);
        match replaced {
            Ok(true) => {
                let length = self.chain.read().await.len();
                self.emit(NodeEvent::ChainReplaced { length });
                Outcome::Accepted
            }
            Ok(false) => Outcome::Rejected,
            Err(e) => {
                log::error!("Failed to store received chain: {}", e);
                Outcome::Rejected
            }
        }
    }

    async fn on_new_transaction(&self, transaction: Transaction) -> Outcome {
        if !self.seen_transactions.insert(transaction.fingerprint()) {
            return Outcome::Duplicate;
        }

        let added = self
            .chain
            .write()
            .await
            .add_transaction(&transaction.sender, &transaction.recipient, transaction.amount);
        if !added {
            return Outcome::Rejected;
        }

        self.emit(NodeEvent::TransactionAdded(transaction.clone()));
        self.broadcast(&Message::NewTransaction { transaction }).await;
        Outcome::Accepted
    }

    /// Announce ourselves to `host:port` and remember it on success.
    /// Failures are logged, never fatal.
    pub async fn connect_to_peer(&self, host: &str, port: u16) -> bool {
        let peer = PeerAddr::new(host, port);
        if self.is_self(&peer) || self.peers.contains(&peer) {
            return false;
        }

        let hello = Message::NewPeer {
            host: self.config.host.clone(),
            port: self.config.port,
        };
        match self.deliver(&peer, &hello).await {
            Ok(()) => {
                log::info!("Connected to peer {}", peer);
                self.add_peer(peer);
                true
            }
            Err(e) => {
                log::warn!("Could not connect to {}: {}", peer, e);
                false
            }
        }
    }

    /// Send `message` to every peer over a fresh connection each, concurrently.
    /// Peers that cannot be reached are removed. Returns how many received it.
    pub async fn broadcast(&self, message: &Message) -> usize {
        let data = match message.serialize() {
            Ok(data) => Arc::new(data),
            Err(e) => {
                log::error!("Failed to encode {}: {}", message.message_type(), e);
                return 0;
            }
        };

        let mut sends = JoinSet::new();
        for peer in self.peers.snapshot() {
            let data = data.clone();
            let timeout = self.config.timeout;
            sends.spawn(async move {
                let result = send_to(&peer, &data, timeout).await;
                (peer, result)
            });
        }

        let mut delivered = 0;
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(()))) => delivered += 1,
                Ok((peer, Err(e))) => self.drop_peer(&peer, &e),
                Err(e) => log::error!("Broadcast task failed: {}", e),
            }
        }

        log::debug!("Broadcast {} to {} peers", message.message_type(), delivered);
        delivered
    }

    /// Point-to-point send; an unreachable peer is removed
    pub async fn send(&self, peer: &PeerAddr, message: &Message) -> bool {
        match self.deliver(peer, message).await {
            Ok(()) => true,
            Err(e) => {
                self.drop_peer(peer, &e);
                false
            }
        }
    }

    async fn deliver(&self, peer: &PeerAddr, message: &Message) -> std::result::Result<(), MessageError> {
        let data = message.serialize()?;
        send_to(peer, &data, self.config.timeout).await
    }

    /// Mine the pending queue, then broadcast the whole chain followed by the new block.
    ///
    /// Proof-of-work runs on the blocking pool while holding the ledger lock,
    /// so it runs to completion and no other mutation interleaves.
    pub async fn start_mining(&self) -> Result<Option<Block>> {
        let mut chain = self.chain.clone().write_owned().await;
        let mined = tokio::task::spawn_blocking(move || -> Result<Option<(Block, Vec<Block>)>> {
            Ok(chain.mine_pending()?.map(|block| (block, chain.blocks().to_vec())))
        })
        .await??;

        let Some((block, blocks)) = mined else {
            return Ok(None);
        };

        self.seen_blocks.insert(block.fingerprint());
        self.emit(NodeEvent::BlockMined {
            index: block.index,
            hash: block.hash.clone(),
        });
        self.broadcast(&Message::Chain { chain: blocks }).await;
        self.broadcast(&Message::NewBlock { block: block.clone() }).await;
        Ok(Some(block))
    }

    /// Submit a payment from this node and gossip it if admitted
    pub async fn add_transaction(&self, recipient: &str, amount: Amount) -> bool {
        let transaction = Transaction::new(self.address.clone(), recipient, amount);
        let added = self
            .chain
            .write()
            .await
            .add_transaction(&transaction.sender, &transaction.recipient, transaction.amount);
        if !added {
            return false;
        }

        self.seen_transactions.insert(transaction.fingerprint());
        self.emit(NodeEvent::TransactionAdded(transaction.clone()));
        self.broadcast(&Message::NewTransaction { transaction }).await;
        true
    }

    /// This node's own balance
    pub async fn get_balance(&self) -> Balance {
        self.balance_of(&self.address).await
    }

    pub async fn balance_of(&self, address: &str) -> Balance {
        self.chain.read().await.get_balance(address)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Get peer information
    pub fn peers(&self) -> Vec<PeerAddr> {
        self.peers.snapshot()
    }

    /// Get number of known peers
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Shared ledger handle
    pub fn chain(&self) -> &Arc<RwLock<Chain>> {
        &self.chain
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    fn add_peer(&self, peer: PeerAddr) -> bool {
        if self.is_self(&peer) || !self.peers.add(peer.clone()) {
            return false;
        }
        log::info!("New peer added: {}", peer);
        self.emit(NodeEvent::PeerAdded(peer));
        true
    }

    fn drop_peer(&self, peer: &PeerAddr, error: &MessageError) {
        if self.peers.remove(peer) {
            log::warn!("Peer {} unavailable ({}), removed", peer, error);
            self.emit(NodeEvent::PeerRemoved(peer.clone()));
        } else {
            log::warn!("Could not reach {}: {}", peer, error);
        }
    }

    fn is_self(&self, peer: &PeerAddr) -> bool {
        peer.port == self.config.port && (peer.host == self.config.host || is_local_host(&peer.host))
    }

    fn emit(&self, event: NodeEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn is_local_host(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback() || ip.is_unspecified())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn test_config(port: u16) -> NodeConfig {
        NodeConfig {
            port,
            difficulty: 1,
            in_memory: true,
            bootstrap_ports: Vec::new(),
            timeout: Duration::from_secs(1),
            ..NodeConfig::default()
        }
    }

    fn node_on(port: u16, store: MemoryStore) -> Arc<Node> {
        let chain = Chain::new(1, store).unwrap();
        Node::new(test_config(port), chain)
    }

    fn test_node(port: u16) -> Arc<Node> {
        node_on(port, MemoryStore::new())
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_node_address_is_port() {
        let node = test_node(5002);
        assert_eq!(node.address(), "5002");
        assert_eq!(node.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_get_balance_uses_own_port() {
        let node = test_node(5003);
        assert_eq!(node.get_balance().await, 100);
        assert_eq!(test_node(6100).get_balance().await, 0);
    }

    #[tokio::test]
    async fn test_add_transaction_and_mine() {
        let node = test_node(5001);

        assert!(node.add_transaction("5002", 40).await);
        assert!(!node.add_transaction("5002", 500).await);
        assert_eq!(node.get_balance().await, 100);

        let block = node.start_mining().await.unwrap().unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(node.get_balance().await, 60);
        assert_eq!(node.balance_of("5002").await, 140);

        assert!(node.start_mining().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_transaction_ignored() {
        let node = test_node(5001);
        let msg = Message::NewTransaction {
            transaction: Transaction::new("5002", "5003", 10),
        };

        assert_eq!(node.handle_message(msg.clone()).await, Outcome::Accepted);
        assert_eq!(node.handle_message(msg).await, Outcome::Duplicate);
        assert_eq!(node.chain().read().await.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_transaction_not_rebroadcast() {
        let node = test_node(5001);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = PeerAddr::new("127.0.0.1", listener.local_addr().unwrap().port());
        node.handle_message(Message::PeerList { peers: vec![peer] }).await;

        let msg = Message::NewTransaction {
            transaction: Transaction::new("5002", "5004", 12),
        };
        assert_eq!(node.handle_message(msg.clone()).await, Outcome::Accepted);
        assert_eq!(node.handle_message(msg.clone()).await, Outcome::Duplicate);

        // Broadcasts complete before handle_message returns, so every delivery is queued by now
        let (stream, _) = listener.accept().await.unwrap();
        assert_eq!(read_message(stream, 1024).await.unwrap(), msg);
        let second = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(second.is_err());
        assert_eq!(node.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_transaction_still_marked_seen() {
        let node = test_node(5001);
        let msg = Message::NewTransaction {
            transaction: Transaction::new("7777", "5003", 10),
        };

        assert_eq!(node.handle_message(msg.clone()).await, Outcome::Rejected);
        assert_eq!(node.handle_message(msg).await, Outcome::Duplicate);
        assert!(node.chain().read().await.pending().is_empty());
    }

    #[tokio::test]
    async fn test_new_block_accepted_once() {
        let genesis = Block::genesis();
        let local = node_on(5001, MemoryStore::with_blocks(vec![genesis.clone()]));
        let remote = node_on(5002, MemoryStore::with_blocks(vec![genesis]));

        assert!(remote.add_transaction("5001", 30).await);
        let block = remote.start_mining().await.unwrap().unwrap();
        let msg = Message::NewBlock { block: block.clone() };

        assert_eq!(local.handle_message(msg.clone()).await, Outcome::Accepted);
        assert_eq!(local.handle_message(msg).await, Outcome::Duplicate);
        assert_eq!(local.chain().read().await.latest_block(), &block);
        assert_eq!(local.get_balance().await, 130);
    }

    #[tokio::test]
    async fn test_unlinked_block_rejected() {
        let local = test_node(5001);
        let remote = test_node(5002);
        remote.add_transaction("5001", 30).await;
        let block = remote.start_mining().await.unwrap().unwrap();

        assert_eq!(local.handle_message(Message::NewBlock { block }).await, Outcome::Rejected);
        assert_eq!(local.chain().read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_chain_message_replaces_shorter_chain() {
        let local = test_node(5001);
        let remote = test_node(5002);
        remote.add_transaction("5004", 60).await;
        remote.start_mining().await.unwrap();
        let chain = remote.chain().read().await.blocks().to_vec();

        assert_eq!(local.handle_message(Message::Chain { chain: chain.clone() }).await, Outcome::Accepted);
        assert_eq!(local.chain().read().await.blocks(), chain.as_slice());
        assert_eq!(local.balance_of("5004").await, 160);

        // Same length again is not a replacement
        assert_eq!(local.handle_message(Message::Chain { chain }).await, Outcome::Rejected);
    }

    #[tokio::test]
    async fn test_pending_transactions_merged_without_check() {
        let node = test_node(5001);
        let msg = Message::PendingTransactions {
            transactions: vec![Transaction::new("8888", "5001", 1_000)],
        };

        assert_eq!(node.handle_message(msg).await, Outcome::Accepted);
        assert_eq!(node.chain().read().await.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_peer_list_skips_self() {
        let node = test_node(5001);
        let msg = Message::PeerList {
            peers: vec![
                PeerAddr::new("localhost", 5001),
                PeerAddr::new("127.0.0.1", 5002),
                PeerAddr::new("127.0.0.1", 5003),
            ],
        };

        node.handle_message(msg).await;
        let mut ports: Vec<u16> = node.peers().iter().map(|p| p.port).collect();
        ports.sort();
        assert_eq!(ports, vec![5002, 5003]);
    }

    #[tokio::test]
    async fn test_broadcast_prunes_unreachable_peers() {
        let node = test_node(5001);
        let mut events = node.subscribe();
        let dead = PeerAddr::new("127.0.0.1", closed_port().await);
        node.handle_message(Message::PeerList { peers: vec![dead.clone()] }).await;
        assert_eq!(events.recv().await.unwrap(), NodeEvent::PeerAdded(dead.clone()));

        let delivered = node.broadcast(&Message::PeerList { peers: vec![] }).await;

        assert_eq!(delivered, 0);
        assert_eq!(node.peer_count(), 0);
        assert_eq!(events.recv().await.unwrap(), NodeEvent::PeerRemoved(dead));
    }

    #[tokio::test]
    async fn test_new_peer_unreachable_is_pruned() {
        let node = test_node(5001);
        let port = closed_port().await;

        let outcome = node
            .handle_message(Message::NewPeer {
                host: "127.0.0.1".to_string(),
                port,
            })
            .await;

        assert_eq!(outcome, Outcome::Accepted);
        assert_eq!(node.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_peer_is_not_fatal() {
        let node = test_node(5001);
        let port = closed_port().await;

        assert!(!node.connect_to_peer("127.0.0.1", port).await);
        assert!(!node.connect_to_peer("localhost", 5001).await);
        assert_eq!(node.peer_count(), 0);
    }

    #[test]
    fn test_local_hosts() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("127.0.0.1"));
        assert!(is_local_host("0.0.0.0"));
        assert!(!is_local_host("10.1.2.3"));
    }
}
