//! The HTTP facade: the node's own routes, and the response shapes that
//! double as the client-side types the sync and fork-check loops parse
//! when talking to peers (those loops live in `sync.rs` / `fork.rs`).

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::block::Block;
use crate::error::NodeError;
use crate::node::Node;
use crate::peer_db::PeerNode;
use crate::primitives::{Address, Hash};
use crate::transaction::SignedTransaction;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BalancesResponse {
    #[serde(rename = "block_hash")]
    pub hash: Hash,
    pub balances: HashMap<Address, u64>,
}

#[derive(Debug, Deserialize)]
pub struct AddTxRequest {
    pub from: Address,
    pub from_pwd: String,
    pub to: Address,
    pub value: u64,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct AddTxResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "block_hash")]
    pub hash: Hash,
    #[serde(rename = "block_number")]
    pub number: u64,
    #[serde(rename = "peers_known")]
    pub known_peers: HashMap<String, PeerNode>,
    pub pending_txs: HashMap<String, SignedTransaction>,
    pub account: Address,
}

#[derive(Debug, Serialize)]
pub struct NodeInfoResponse {
    #[serde(rename = "nodes")]
    pub peers: Vec<PeerNode>,
    pub blocks: Vec<Block>,
    pub pending_txs: Vec<SignedTransaction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    #[serde(rename = "fromBlock", default)]
    pub from_block: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPeerQuery {
    pub ip: String,
    pub port: u64,
    pub miner: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddPeerResponse {
    pub success: bool,
    pub error: Option<String>,
}

pub fn routes(
    node: Arc<Node>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_node = warp::any().map(move || node.clone());

    let balances_list = warp::path!("balances" / "list")
        .and(warp::get())
        .and(with_node.clone())
        .and_then(handle_balances_list);

    let tx_add = warp::path!("tx" / "add")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_node.clone())
        .and_then(handle_tx_add);

    let node_info = warp::path!("node" / "info")
        .and(warp::get())
        .and(with_node.clone())
        .and_then(handle_node_info);

    let blocks_list = warp::path!("blocks" / "list")
        .and(warp::get())
        .and(with_node.clone())
        .and_then(handle_blocks_list);

    let node_status = warp::path!("node" / "status")
        .and(warp::get())
        .and(with_node.clone())
        .and_then(handle_node_status);

    let node_sync = warp::path!("node" / "sync")
        .and(warp::get())
        .and(warp::query::<SyncQuery>())
        .and(with_node.clone())
        .and_then(handle_node_sync);

    let node_peer = warp::path!("node" / "peer")
        .and(warp::get())
        .and(warp::query::<AddPeerQuery>())
        .and(with_node.clone())
        .and_then(handle_node_peer);

    let block_by = warp::path!("block" / String)
        .and(warp::get())
        .and(with_node.clone())
        .and_then(handle_block_by);

    let mempool_list = warp::path!("mempool")
        .and(warp::get())
        .and(with_node.clone())
        .and_then(handle_mempool_list);

    balances_list
        .or(tx_add)
        .or(node_info)
        .or(blocks_list)
        .or(node_status)
        .or(node_sync)
        .or(node_peer)
        .or(block_by)
        .or(mempool_list)
        .recover(handle_rejection)
}

async fn handle_balances_list(node: Arc<Node>) -> Result<impl Reply, Rejection> {
    let core = node.core.read_async().await;
    let response = BalancesResponse {
        hash: core.state.latest_hash(),
        balances: core.state.balances().clone(),
    };
    Ok(warp::reply::json(&response))
}

async fn handle_tx_add(request: AddTxRequest, node: Arc<Node>) -> Result<impl Reply, Rejection> {
    match node
        .submit_new_transaction(request.from, &request.from_pwd, request.to, request.value, request.data)
        .await
    {
        Ok(success) => Ok(warp::reply::json(&AddTxResponse { success })),
        Err(e) => Err(warp::reject::custom(ApiError(e))),
    }
}

async fn handle_node_info(node: Arc<Node>) -> Result<impl Reply, Rejection> {
    let mut core = node.core.write_async().await;
    let blocks = match core.state.all_blocks() {
        Ok(blocks) => blocks,
        Err(e) => return Err(warp::reject::custom(ApiError(e))),
    };
    let response = NodeInfoResponse {
        peers: core.peers.all(),
        blocks,
        pending_txs: core.mempool.as_map().into_values().collect(),
    };
    Ok(warp::reply::json(&response))
}

async fn handle_blocks_list(node: Arc<Node>) -> Result<impl Reply, Rejection> {
    let mut core = node.core.write_async().await;
    match core.state.all_blocks() {
        Ok(blocks) => Ok(warp::reply::json(&blocks)),
        Err(e) => Err(warp::reject::custom(ApiError(e))),
    }
}

async fn handle_node_status(node: Arc<Node>) -> Result<impl Reply, Rejection> {
    let core = node.core.read_async().await;
    let response = StatusResponse {
        hash: core.state.latest_hash(),
        number: core.state.latest_number(),
        known_peers: core.peers.as_map(),
        pending_txs: core.mempool.as_map(),
        account: node.self_info.account,
    };
    Ok(warp::reply::json(&response))
}

async fn handle_node_sync(query: SyncQuery, node: Arc<Node>) -> Result<impl Reply, Rejection> {
    let from_hash = if query.from_block.is_empty() {
        Hash::zero()
    } else {
        match Hash::from_hex(&query.from_block) {
            Ok(h) => h,
            Err(e) => return Err(warp::reject::custom(ApiError(e))),
        }
    };
    let mut core = node.core.write_async().await;
    match core.state.blocks_after(&from_hash) {
        Ok(blocks) => Ok(warp::reply::json(&SyncResponse { blocks })),
        Err(e) => Err(warp::reject::custom(ApiError(e))),
    }
}

async fn handle_node_peer(query: AddPeerQuery, node: Arc<Node>) -> Result<impl Reply, Rejection> {
    let account = match Address::from_hex(&query.miner) {
        Ok(a) => a,
        Err(e) => {
            return Ok(warp::reply::json(&AddPeerResponse { success: false, error: Some(e.to_string()) }));
        }
    };
    let peer = PeerNode::new(query.ip, query.port, false, account, true);
    if !node.is_self(&peer) {
        let mut core = node.core.write_async().await;
        if !core.peers.contains(&peer) {
            core.peers.add(peer);
        } else {
            core.peers.set_connected(&peer.tcp_address(), true);
        }
    }
    Ok(warp::reply::json(&AddPeerResponse { success: true, error: None }))
}

async fn handle_block_by(selector: String, node: Arc<Node>) -> Result<impl Reply, Rejection> {
    let mut core = node.core.write_async().await;
    let record = if let Ok(height) = selector.parse::<u64>() {
        core.state.block_record_at_height(height)
    } else {
        Hash::from_hex(&selector).and_then(|hash| core.state.block_record_by_hash(&hash))
    };
    match record {
        Ok(record) => Ok(warp::reply::json(&record)),
        Err(e) => Err(warp::reject::custom(ApiError(e))),
    }
}

async fn handle_mempool_list(node: Arc<Node>) -> Result<impl Reply, Rejection> {
    let core = node.core.read_async().await;
    Ok(warp::reply::json(&core.mempool.as_map()))
}

#[derive(Debug)]
struct ApiError(NodeError);

impl warp::reject::Reject for ApiError {}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "route not found".to_string())
    } else if let Some(ApiError(e)) = err.find() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "malformed request body".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(warp::reply::with_status(warp::reply::json(&ErrorResponse { error: message }), code))
}
