// rpc/src/methods.rs
use crate::{RpcError, RpcResult};
use blockchain_core::{BlockProcessor, Transaction, TransactionPool};
use blockchain_crypto::{Address, Hash};
use storage::Database;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Read-only (plus transaction submission) JSON-RPC surface over the
/// consensus core. Holds the same processor mutex the coordinator uses for
/// writes; reads are always brief (a single `chain()` snapshot access), so
/// they do not meaningfully contend with block application.
pub struct RpcMethods {
    processor: Arc<Mutex<BlockProcessor>>,
    database: Arc<Database>,
    mempool: Arc<RwLock<TransactionPool>>,
}

impl RpcMethods {
    pub fn new(
        processor: Arc<Mutex<BlockProcessor>>,
        database: Arc<Database>,
        mempool: Arc<RwLock<TransactionPool>>,
    ) -> Self {
        Self { processor, database, mempool }
    }

    pub async fn handle(&self, method: &str, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        match method {
            "blockNumber" => self.block_number().await,
            "getBalance" => self.get_balance(params).await,
            "getNonce" => self.get_nonce(params).await,
            "getBlockByNumber" => self.get_block_by_number(params).await,
            "getBlockByHash" => self.get_block_by_hash(params).await,
            "getTransactionByHash" => self.get_transaction_by_hash(params).await,
            "getTransactionReceipt" => self.get_transaction_receipt(params).await,
            "getFinalizedHeight" => self.get_finalized_height().await,
            "sendTransaction" => self.send_transaction(params).await,
            "pendingTransactionCount" => self.pending_transaction_count().await,

            _ => Err(RpcError::MethodNotFound(method.to_string())),
        }
    }

    // ==================== CHAIN READS ====================

    async fn block_number(&self) -> RpcResult<serde_json::Value> {
        let number = self.processor.lock().await.height();
        Ok(serde_json::json!(number))
    }

    async fn get_finalized_height(&self) -> RpcResult<serde_json::Value> {
        let height = self.processor.lock().await.finalized_height();
        Ok(serde_json::json!(height))
    }

    async fn get_balance(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let address = self.parse_address_param(params)?;
        let processor = self.processor.lock().await;
        let balance = processor.chain().state().get_balance(&address);
        Ok(serde_json::json!(balance.to_string()))
    }

    async fn get_nonce(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let address = self.parse_address_param(params)?;
        let processor = self.processor.lock().await;
        let nonce = processor.chain().state().get_nonce(&address);
        Ok(serde_json::json!(nonce))
    }

    async fn get_block_by_number(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params: Vec<serde_json::Value> = serde_json::from_value(params)
            .map_err(|_| RpcError::InvalidParams("expected an array".into()))?;
        if params.is_empty() {
            return Err(RpcError::InvalidParams("expected a block number or \"latest\"".into()));
        }

        let number = match params[0].as_str() {
            Some("latest") => self.processor.lock().await.height(),
            Some(other) => other
                .parse()
                .map_err(|_| RpcError::InvalidParams("invalid block number".into()))?,
            None => params[0]
                .as_u64()
                .ok_or_else(|| RpcError::InvalidParams("invalid block number".into()))?,
        };

        match self
            .database
            .get_block_by_number(number)
            .map_err(|e| RpcError::InternalError(e.to_string()))?
        {
            Some(block) => Ok(serde_json::to_value(block).unwrap()),
            None => Ok(serde_json::Value::Null),
        }
    }

    async fn get_block_by_hash(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params: Vec<String> = serde_json::from_value(params)
            .map_err(|_| RpcError::InvalidParams("expected an array of strings".into()))?;
        if params.is_empty() {
            return Err(RpcError::InvalidParams("expected a block hash".into()));
        }

        let hash = Hash::from_hex(&params[0])
            .map_err(|_| RpcError::InvalidParams("invalid block hash".into()))?;

        match self.database.get_block(&hash).map_err(|e| RpcError::InternalError(e.to_string()))? {
            Some(block) => Ok(serde_json::to_value(block).unwrap()),
            None => Ok(serde_json::Value::Null),
        }
    }

    async fn get_transaction_by_hash(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params: Vec<String> = serde_json::from_value(params)
            .map_err(|_| RpcError::InvalidParams("expected an array of strings".into()))?;
        if params.is_empty() {
            return Err(RpcError::InvalidParams("expected a transaction hash".into()));
        }

        let hash = Hash::from_hex(&params[0])
            .map_err(|_| RpcError::InvalidParams("invalid transaction hash".into()))?;

        match self.database.get_transaction(&hash).map_err(|e| RpcError::InternalError(e.to_string()))? {
            Some(tx) => Ok(serde_json::to_value(tx).unwrap()),
            None => Ok(serde_json::Value::Null),
        }
    }

    async fn get_transaction_receipt(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params: Vec<String> = serde_json::from_value(params)
            .map_err(|_| RpcError::InvalidParams("expected an array of strings".into()))?;
        if params.is_empty() {
            return Err(RpcError::InvalidParams("expected a transaction hash".into()));
        }

        let hash = Hash::from_hex(&params[0])
            .map_err(|_| RpcError::InvalidParams("invalid transaction hash".into()))?;

        match self.database.get_receipt(&hash).map_err(|e| RpcError::InternalError(e.to_string()))? {
            Some(receipt) => Ok(serde_json::to_value(receipt).unwrap()),
            None => Ok(serde_json::Value::Null),
        }
    }

    // ==================== MEMPOOL ====================

    /// Validates and pools a signed transaction the same way the local
    /// coordinator does for self-produced submissions, without the gossip
    /// broadcast step (the RPC surface has no handle on the network layer).
    async fn send_transaction(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params: Vec<serde_json::Value> = serde_json::from_value(params)
            .map_err(|_| RpcError::InvalidParams("expected an array".into()))?;
        if params.is_empty() {
            return Err(RpcError::InvalidParams("expected a signed transaction".into()));
        }

        let tx: Transaction = serde_json::from_value(params[0].clone())
            .map_err(|e| RpcError::InvalidParams(format!("invalid transaction: {e}")))?;

        tx.validate_basic().map_err(|e| RpcError::InvalidParams(e.to_string()))?;

        let sender_nonce = self.processor.lock().await.chain().state().get_nonce(&tx.from);
        if tx.nonce != sender_nonce {
            return Err(RpcError::InvalidParams(format!(
                "invalid nonce: expected {sender_nonce}, got {}",
                tx.nonce
            )));
        }

        let hash = tx.hash();
        self.mempool
            .write()
            .await
            .add(tx, sender_nonce)
            .map_err(|e| RpcError::PoolFull(e.to_string()))?;

        Ok(serde_json::json!(hash.to_hex()))
    }

    async fn pending_transaction_count(&self) -> RpcResult<serde_json::Value> {
        let count = self.mempool.read().await.metrics().pending_count;
        Ok(serde_json::json!(count))
    }

    fn parse_address_param(&self, params: serde_json::Value) -> RpcResult<Address> {
        let params: Vec<String> = serde_json::from_value(params)
            .map_err(|_| RpcError::InvalidParams("expected an array of strings".into()))?;
        let address_str = params
            .first()
            .ok_or_else(|| RpcError::InvalidParams("expected an address".into()))?;
        Address::from_hex(address_str).map_err(|_| RpcError::InvalidParams("invalid address".into()))
    }
}
