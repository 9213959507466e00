use async_trait::async_trait;
use blockchain_core::{Block, Transaction};
use blockchain_crypto::Hash;
use networking::p2p::{ConsensusHandler, NetworkConfig, NetworkService};
use networking::peer::{PeerId, PeerInfo, PeerStatus};
use networking::protocol::{
    GetBlocksFromIdMessage, GetHighestCommonBlockMessage, PostBlockMessage, PostNodeInfoMessage,
    ProtocolMessage,
};
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::runtime::Runtime;

/// A fixed-chain double standing in for the coordinator during these tests:
/// it always answers with a canned tip and accepts or rejects posted blocks
/// based on a configurable switch, without touching a real block processor.
struct FakeHandler {
    tip: Block,
    chain: Vec<Block>,
    received: Mutex<Vec<Hash>>,
}

impl FakeHandler {
    fn new(tip: Block, chain: Vec<Block>) -> Self {
        Self { tip, chain, received: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl ConsensusHandler for FakeHandler {
    async fn last_block(&self) -> Block {
        self.tip.clone()
    }

    async fn blocks_from_id(&self, block_id: Hash, max_blocks: usize) -> Vec<Block> {
        match self.chain.iter().position(|b| b.hash() == block_id) {
            Some(idx) => self.chain[idx + 1..].iter().take(max_blocks).cloned().collect(),
            None => Vec::new(),
        }
    }

    async fn highest_common_block(&self, block_ids: Vec<Hash>) -> Option<Hash> {
        block_ids.into_iter().find(|id| self.chain.iter().any(|b| b.hash() == *id))
    }

    async fn receive_block(&self, _peer: PeerId, block: Block) -> Result<(), String> {
        self.received.lock().unwrap().push(block.hash());
        Ok(())
    }
}

fn test_config(port: u16) -> NetworkConfig {
    NetworkConfig {
        listen_addr: format!("127.0.0.1:{port}").parse::<SocketAddr>().unwrap(),
        max_peers: 10,
        max_inbound: 5,
        max_outbound: 5,
        bootstrap_peers: vec![],
    }
}

#[test]
fn get_last_block_returns_handler_tip() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let genesis = Block::genesis(Hash::zero());
        let handler = FakeHandler::new(genesis.clone(), vec![genesis.clone()]);
        let mut svc = NetworkService::new(test_config(19000));
        svc.start().await.unwrap();

        let peer = PeerId::random();
        let reply = svc.handle_message(peer, ProtocolMessage::GetLastBlock, &handler).await;

        match reply {
            Some(ProtocolMessage::LastBlock(msg)) => assert_eq!(msg.block.hash(), genesis.hash()),
            other => panic!("unexpected reply: {other:?}"),
        }
    });
}

#[test]
fn get_blocks_from_id_returns_suffix_after_common_ancestor() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let genesis = Block::genesis(Hash::zero());
        let next = Block::new(
            1,
            genesis.hash(),
            genesis.header.state_root,
            blockchain_crypto::Address::zero(),
            Vec::<Transaction>::new(),
            8_000_000,
        )
        .unwrap();
        let chain = vec![genesis.clone(), next.clone()];
        let handler = FakeHandler::new(next.clone(), chain);
        let mut svc = NetworkService::new(test_config(19001));

        let peer = PeerId::random();
        let req = ProtocolMessage::GetBlocksFromId(GetBlocksFromIdMessage {
            block_id: genesis.hash(),
            max_blocks: 10,
        });
        let reply = svc.handle_message(peer, req, &handler).await;

        match reply {
            Some(ProtocolMessage::BlocksFromId(msg)) => {
                assert_eq!(msg.blocks.len(), 1);
                assert_eq!(msg.blocks[0].hash(), next.hash());
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    });
}

#[test]
fn get_highest_common_block_finds_shared_ancestor() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let genesis = Block::genesis(Hash::zero());
        let handler = FakeHandler::new(genesis.clone(), vec![genesis.clone()]);
        let mut svc = NetworkService::new(test_config(19002));

        let peer = PeerId::random();
        let unknown = Hash::zero();
        let req = ProtocolMessage::GetHighestCommonBlock(GetHighestCommonBlockMessage {
            block_ids: vec![unknown, genesis.hash()],
        });
        let reply = svc.handle_message(peer, req, &handler).await;

        match reply {
            Some(ProtocolMessage::HighestCommonBlock(msg)) => {
                assert_eq!(msg.block_id, Some(genesis.hash()));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    });
}

#[test]
fn post_block_forwards_to_handler_and_expects_no_reply() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let genesis = Block::genesis(Hash::zero());
        let handler = FakeHandler::new(genesis.clone(), vec![genesis.clone()]);
        let mut svc = NetworkService::new(test_config(19003));

        let peer = PeerId::random();
        let req = ProtocolMessage::PostBlock(PostBlockMessage { block: genesis.clone() });
        let reply = svc.handle_message(peer, req, &handler).await;

        assert!(reply.is_none());
        assert_eq!(handler.received.lock().unwrap().as_slice(), &[genesis.hash()]);
    });
}

#[test]
fn post_node_info_updates_peer_best_block() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let genesis = Block::genesis(Hash::zero());
        let handler = FakeHandler::new(genesis.clone(), vec![genesis.clone()]);
        let mut svc = NetworkService::new(test_config(19004));

        let peer_id = PeerId::random();
        let addr: SocketAddr = "127.0.0.1:19100".parse().unwrap();
        let mut info = PeerInfo::new(peer_id, addr, 1, "test/1.0".into(), true);
        info.status = PeerStatus::Connected;
        svc.peer_manager_mut().add_peer(info).unwrap();

        let req = ProtocolMessage::PostNodeInfo(PostNodeInfoMessage {
            best_block: 42,
            best_block_hash: genesis.hash(),
            finalized_height: 40,
            max_height_prevoted: 41,
            block_version: blockchain_core::BLOCK_HEADER_VERSION,
        });
        let reply = svc.handle_message(peer_id, req, &handler).await;

        assert!(reply.is_none());
        let peer = svc.peer_manager().get_peer(&peer_id).unwrap();
        assert_eq!(peer.best_block, 42);
    });
}

#[test]
fn ping_is_answered_with_pong() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let genesis = Block::genesis(Hash::zero());
        let handler = FakeHandler::new(genesis.clone(), vec![genesis]);
        let mut svc = NetworkService::new(test_config(19005));

        let peer = PeerId::random();
        let reply = svc.handle_message(peer, ProtocolMessage::Ping, &handler).await;
        assert!(matches!(reply, Some(ProtocolMessage::Pong)));
    });
}
