/*!
 * Host
 *
 * The transport seam. The head node never manages connections, discovery or
 * streams itself; everything it sends goes through a [`Host`].
 */

use crate::core::{HostError, PeerId};
use crate::models::Message;
use async_trait::async_trait;

/// Network host capable of broadcast and point-to-point delivery
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Host: Send + Sync {
    /// Identity of this node
    fn id(&self) -> PeerId;

    /// Whether a peer currently has an open connection to this node
    fn is_connected(&self, peer: &PeerId) -> bool;

    /// Broadcast a message on a pubsub topic
    async fn publish(&self, topic: &str, message: &Message) -> Result<(), HostError>;

    /// Deliver a message directly to one peer
    async fn send(&self, peer: &PeerId, message: &Message) -> Result<(), HostError>;
}
