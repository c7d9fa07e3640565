// Peer addressing, membership and one-shot connections

use crate::network::{Message, MessageError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A peer's listening address. Travels on the wire as a `[host, port]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, u16)", into = "(String, u16)")]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl From<(String, u16)> for PeerAddr {
    fn from((host, port): (String, u16)) -> Self {
        Self { host, port }
    }
}

impl From<PeerAddr> for (String, u16) {
    fn from(addr: PeerAddr) -> Self {
        (addr.host, addr.port)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The set of known peers.
///
/// Mutations are serialized by one lock; broadcasts walk a [`PeerRegistry::snapshot`]
/// so concurrent joins and removals never disturb an in-flight fan-out.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<HashSet<PeerAddr>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the peer was not known yet
    pub fn add(&self, peer: PeerAddr) -> bool {
        match self.peers.lock() {
            Ok(mut peers) => peers.insert(peer),
            Err(_) => {
                log::error!("Peer registry lock poisoned");
                false
            }
        }
    }

    /// Returns true if the peer was known
    pub fn remove(&self, peer: &PeerAddr) -> bool {
        match self.peers.lock() {
            Ok(mut peers) => peers.remove(peer),
            Err(_) => {
                log::error!("Peer registry lock poisoned");
                false
            }
        }
    }

    pub fn contains(&self, peer: &PeerAddr) -> bool {
        self.peers
            .lock()
            .map(|peers| peers.contains(peer))
            .unwrap_or(false)
    }

    /// Copy of the current membership
    pub fn snapshot(&self) -> Vec<PeerAddr> {
        self.peers
            .lock()
            .map(|peers| peers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().map(|peers| peers.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outbound connection carrying exactly one message
pub struct Peer {
    pub addr: PeerAddr,
    stream: TcpStream,
}

impl Peer {
    /// Connect to a peer, giving up after `timeout`
    pub async fn connect(addr: &PeerAddr, timeout: Duration) -> Result<Self, MessageError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((addr.host.as_str(), addr.port)))
            .await
            .map_err(|_| MessageError::Timeout(timeout))??;

        Ok(Self {
            addr: addr.clone(),
            stream,
        })
    }

    /// Write the encoded message and close our side, which marks its end
    pub async fn send_bytes(mut self, data: &[u8]) -> Result<(), MessageError> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Deliver pre-encoded bytes to `addr` over a fresh connection, connect and
/// write together bounded by `timeout`
pub async fn send_to(addr: &PeerAddr, data: &[u8], timeout: Duration) -> Result<(), MessageError> {
    tokio::time::timeout(timeout, async {
        let peer = Peer::connect(addr, timeout).await?;
        peer.send_bytes(data).await
    })
    .await
    .map_err(|_| MessageError::Timeout(timeout))?
}

/// Read one message: everything until the peer closes its side.
/// More than `limit` bytes is refused.
pub async fn read_message<R>(reader: R, limit: usize) -> Result<Message, MessageError>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut data).await?;
    if data.len() > limit {
        return Err(MessageError::TooLarge { limit });
    }
    Message::deserialize(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_registry_membership() {
        let registry = PeerRegistry::new();
        let peer = PeerAddr::new("localhost", 5002);

        assert!(registry.add(peer.clone()));
        assert!(!registry.add(peer.clone()));
        assert!(registry.contains(&peer));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&peer));
        assert!(!registry.remove(&peer));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = PeerRegistry::new();
        registry.add(PeerAddr::new("localhost", 5002));
        let snapshot = registry.snapshot();

        registry.add(PeerAddr::new("localhost", 5003));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_peer_addr_display() {
        assert_eq!(PeerAddr::new("127.0.0.1", 5004).to_string(), "127.0.0.1:5004");
    }

    #[tokio::test]
    async fn test_send_and_read_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let reader = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            read_message(stream, 1024).await
        });

        let msg = Message::GetPeers {
            host: "127.0.0.1".to_string(),
            port: 5001,
        };
        send_to(&PeerAddr::new("127.0.0.1", port), &msg.serialize().unwrap(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(reader.await.unwrap().unwrap(), msg);
    }

    #[tokio::test]
    async fn test_read_message_limit() {
        let data = vec![b' '; 64];
        let err = read_message(&data[..], 16).await.unwrap_err();
        assert!(matches!(err, MessageError::TooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn test_send_to_closed_port_fails() {
        // Bind then drop to find a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = send_to(&PeerAddr::new("127.0.0.1", port), b"{}", Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
