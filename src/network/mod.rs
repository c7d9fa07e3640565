// P2P networking

mod dedup;
mod message;
mod node;
mod peer;

pub use dedup::SeenSet;
pub use message::{Message, MessageError, MessageType};
pub use node::{Node, NodeEvent, Outcome};
pub use peer::{read_message, send_to, Peer, PeerAddr, PeerRegistry};
