// networking/src/p2p.rs
use crate::peer::{PeerId, PeerManager};
use crate::protocol::{
    BlocksFromIdMessage, HighestCommonBlockMessage, LastBlockMessage, PostNodeInfoMessage,
    ProtocolMessage,
};
use crate::sync::{PeerClient, SYNC_PENALTY_POINTS};
use crate::{NetworkError, NetworkResult};
use blockchain_core::Block;
use blockchain_crypto::Hash;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub listen_addr: SocketAddr,
    pub max_peers: usize,
    pub max_inbound: usize,
    pub max_outbound: usize,
    pub bootstrap_peers: Vec<SocketAddr>,
}

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    MessageReceived(PeerId, ProtocolMessage),
}

/// Local answers to the request side of [`ProtocolMessage`] so
/// [`NetworkService::handle_message`] can be exercised without depending on
/// the coordinator's async mutex directly.
#[async_trait::async_trait]
pub trait ConsensusHandler: Send + Sync {
    async fn last_block(&self) -> Block;
    async fn blocks_from_id(&self, block_id: Hash, max_blocks: usize) -> Vec<Block>;
    async fn highest_common_block(&self, block_ids: Vec<Hash>) -> Option<Hash>;
    /// Accepts a block posted by a peer; errors are logged and do not
    /// otherwise affect the connection.
    async fn receive_block(&self, peer: PeerId, block: Block) -> Result<(), String>;
}

/// Sends a request to a specific peer and awaits its correlated response.
/// A real implementation backs this with a TCP/libp2p connection; tests use
/// an in-process double.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_request(
        &self,
        peer: PeerId,
        message: ProtocolMessage,
    ) -> NetworkResult<ProtocolMessage>;
}

pub struct NetworkService {
    config: NetworkConfig,
    peer_manager: PeerManager,
}

impl NetworkService {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            peer_manager: PeerManager::new(
                config.max_peers,
                config.max_inbound,
                config.max_outbound,
            ),
            config,
        }
    }

    pub async fn start(&mut self) -> NetworkResult<()> {
        tracing::info!("Network service started on {}", self.config.listen_addr);
        Ok(())
    }

    pub fn peer_manager(&self) -> &PeerManager {
        &self.peer_manager
    }

    pub fn peer_manager_mut(&mut self) -> &mut PeerManager {
        &mut self.peer_manager
    }

    /// Answers an inbound protocol message, updating peer bookkeeping as a
    /// side effect (best-block tracking for `PostNodeInfo`). Returns `None`
    /// for messages that expect no reply.
    pub async fn handle_message(
        &mut self,
        peer: PeerId,
        message: ProtocolMessage,
        handler: &dyn ConsensusHandler,
    ) -> Option<ProtocolMessage> {
        match self.peer_manager.check_rate_limit(&peer) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(peer = %peer.to_hex(), "peer exceeded rate limit, dropping message");
                self.peer_manager.decrease_reputation(&peer, SYNC_PENALTY_POINTS).ok();
                return None;
            }
            Err(_) => {
                // Unknown peer (e.g. not yet registered via the handshake);
                // let the message through rather than blocking bootstrap.
            }
        }

        match message {
            ProtocolMessage::GetLastBlock => Some(ProtocolMessage::LastBlock(LastBlockMessage {
                block: handler.last_block().await,
            })),
            ProtocolMessage::GetBlocksFromId(req) => {
                let blocks = handler.blocks_from_id(req.block_id, req.max_blocks).await;
                Some(ProtocolMessage::BlocksFromId(BlocksFromIdMessage { blocks }))
            }
            ProtocolMessage::GetHighestCommonBlock(req) => {
                let block_id = handler.highest_common_block(req.block_ids).await;
                Some(ProtocolMessage::HighestCommonBlock(HighestCommonBlockMessage {
                    block_id,
                }))
            }
            ProtocolMessage::PostBlock(req) => {
                if let Err(reason) = handler.receive_block(peer, req.block).await {
                    tracing::warn!(peer = %peer.to_hex(), reason, "rejected block posted by peer");
                    self.peer_manager.decrease_reputation(&peer, SYNC_PENALTY_POINTS).ok();
                }
                None
            }
            ProtocolMessage::PostNodeInfo(info) => {
                self.record_node_info(peer, &info);
                None
            }
            ProtocolMessage::Ping => Some(ProtocolMessage::Pong),
            _ => None,
        }
    }

    fn record_node_info(&mut self, peer: PeerId, info: &PostNodeInfoMessage) {
        if self
            .peer_manager
            .update_node_info(&peer, info.best_block, info.max_height_prevoted)
            .is_err()
        {
            tracing::debug!(peer = %peer.to_hex(), "PostNodeInfo from unknown peer");
        }
    }
}

/// [`PeerClient`] backed by a real [`Transport`], letting
/// [`crate::sync::Synchronizer`] drive synchronization over an actual
/// connection instead of the in-process test doubles.
pub struct NetworkPeerClient<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> NetworkPeerClient<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }
}

#[async_trait::async_trait]
impl<T: Transport> PeerClient for NetworkPeerClient<T> {
    async fn get_last_block(&self, peer: PeerId) -> Result<Block, crate::sync::SyncError> {
        match self.transport.send_request(peer, ProtocolMessage::GetLastBlock).await {
            Ok(ProtocolMessage::LastBlock(msg)) => Ok(msg.block),
            Ok(_) => Err(crate::sync::SyncError::Restart(
                "unexpected reply to GetLastBlock".into(),
            )),
            Err(e) => Err(crate::sync::SyncError::Restart(e.to_string())),
        }
    }

    async fn get_blocks_from_id(
        &self,
        peer: PeerId,
        block_id: Hash,
        max_blocks: usize,
    ) -> Result<Vec<Block>, crate::sync::SyncError> {
        let request = ProtocolMessage::GetBlocksFromId(crate::protocol::GetBlocksFromIdMessage {
            block_id,
            max_blocks,
        });
        match self.transport.send_request(peer, request).await {
            Ok(ProtocolMessage::BlocksFromId(msg)) => Ok(msg.blocks),
            Ok(_) => Err(crate::sync::SyncError::Restart(
                "unexpected reply to GetBlocksFromId".into(),
            )),
            Err(e) => Err(crate::sync::SyncError::Restart(e.to_string())),
        }
    }

    async fn get_highest_common_block(
        &self,
        peer: PeerId,
        block_ids: Vec<Hash>,
    ) -> Result<Option<Hash>, crate::sync::SyncError> {
        let request = ProtocolMessage::GetHighestCommonBlock(
            crate::protocol::GetHighestCommonBlockMessage { block_ids },
        );
        match self.transport.send_request(peer, request).await {
            Ok(ProtocolMessage::HighestCommonBlock(msg)) => Ok(msg.block_id),
            Ok(_) => Err(crate::sync::SyncError::Restart(
                "unexpected reply to GetHighestCommonBlock".into(),
            )),
            Err(e) => Err(crate::sync::SyncError::Restart(e.to_string())),
        }
    }
}

impl From<NetworkError> for crate::sync::SyncError {
    fn from(err: NetworkError) -> Self {
        crate::sync::SyncError::Restart(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{PeerInfo, PeerStatus};
    use crate::protocol::GetBlocksFromIdMessage;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    fn test_config() -> NetworkConfig {
        NetworkConfig {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 30303),
            max_peers: 10,
            max_inbound: 5,
            max_outbound: 5,
            bootstrap_peers: vec![],
        }
    }

    struct StubHandler {
        tip: Block,
    }

    #[async_trait::async_trait]
    impl ConsensusHandler for StubHandler {
        async fn last_block(&self) -> Block {
            self.tip.clone()
        }
        async fn blocks_from_id(&self, _block_id: Hash, _max_blocks: usize) -> Vec<Block> {
            vec![]
        }
        async fn highest_common_block(&self, _block_ids: Vec<Hash>) -> Option<Hash> {
            Some(self.tip.hash())
        }
        async fn receive_block(&self, _peer: PeerId, _block: Block) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn handle_message_answers_get_last_block() {
        let tip = Block::genesis(Hash::zero());
        let mut service = NetworkService::new(test_config());
        let handler = StubHandler { tip: tip.clone() };

        let reply = service
            .handle_message(PeerId::random(), ProtocolMessage::GetLastBlock, &handler)
            .await;

        match reply {
            Some(ProtocolMessage::LastBlock(msg)) => assert_eq!(msg.block.hash(), tip.hash()),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn handle_message_ping_replies_pong() {
        let mut service = NetworkService::new(test_config());
        let handler = StubHandler {
            tip: Block::genesis(Hash::zero()),
        };
        let reply = service
            .handle_message(PeerId::random(), ProtocolMessage::Ping, &handler)
            .await;
        assert!(matches!(reply, Some(ProtocolMessage::Pong)));
    }

    #[tokio::test]
    async fn handle_message_drops_after_rate_limit_exceeded() {
        let mut service = NetworkService::new(test_config());
        let handler = StubHandler {
            tip: Block::genesis(Hash::zero()),
        };

        let peer_id = PeerId::random();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 40404);
        let mut info = PeerInfo::new(peer_id, addr, 1, "test-client/1.0".into(), false);
        info.status = PeerStatus::Connected;
        service.peer_manager_mut().add_peer(info).unwrap();

        for _ in 0..crate::peer::RATE_LIMIT_MAX_REQUESTS {
            let reply = service.handle_message(peer_id, ProtocolMessage::Ping, &handler).await;
            assert!(matches!(reply, Some(ProtocolMessage::Pong)));
        }

        let reply = service.handle_message(peer_id, ProtocolMessage::Ping, &handler).await;
        assert!(reply.is_none());
    }

    struct ScriptedTransport {
        response: Mutex<Option<ProtocolMessage>>,
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn send_request(
            &self,
            _peer: PeerId,
            _message: ProtocolMessage,
        ) -> NetworkResult<ProtocolMessage> {
            self.response
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| NetworkError::Timeout)
        }
    }

    #[tokio::test]
    async fn network_peer_client_unwraps_blocks_from_id_reply() {
        let transport = Arc::new(ScriptedTransport {
            response: Mutex::new(Some(ProtocolMessage::BlocksFromId(
                crate::protocol::BlocksFromIdMessage { blocks: vec![] },
            ))),
        });
        let client = NetworkPeerClient::new(transport);
        let result = client
            .get_blocks_from_id(PeerId::random(), Hash::zero(), 10)
            .await;
        assert!(result.unwrap().is_empty());
        let _ = GetBlocksFromIdMessage { block_id: Hash::zero(), max_blocks: 1 };
    }
}
