//! Two nodes, one seeded as the other's bootstrap peer: confirm the
//! sync loop pulls a block mined on node A onto node B without any
//! direct call between the two `Node` instances.

use std::sync::Arc;
use std::time::Duration;

use numi_core::chain_store::Genesis;
use numi_core::config::NodeConfig;
use numi_core::node::{InMemorySigner, Node};
use numi_core::primitives::Address;

fn funded_genesis(address: Address, amount: u64) -> Genesis {
    let mut balances = serde_json::Map::new();
    balances.insert(address.hex(), serde_json::json!(amount));
    Genesis {
        genesis_time: "2024-01-01T00:00:00Z".to_string(),
        chain_id: "test-chain".to_string(),
        symbol: "NUMI".to_string(),
        balances,
    }
}

async fn spawn_node(port: u16, bootstrap: Vec<String>, funded: Address, amount: u64, signer: InMemorySigner) -> Arc<Node> {
    let dir = tempfile::tempdir().unwrap();
    let mut config = NodeConfig::development();
    config.data_dir = dir.into_path();
    config.listen_port = port;
    config.difficulty = 0;
    config.bootstrap_peers = bootstrap;
    config.sync_interval_secs = 1;

    let node = Node::bootstrap(
        config,
        "127.0.0.1".to_string(),
        Address::zero(),
        Arc::new(signer),
        funded_genesis(funded, amount),
    )
    .unwrap();

    let spawned = node.clone();
    tokio::spawn(async move { spawned.run().await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    node
}

#[tokio::test]
async fn a_block_mined_on_one_node_reaches_a_peer_via_sync() {
    let secp = secp256k1::Secp256k1::new();
    let (sk, pk) = secp.generate_keypair(&mut rand::thread_rng());
    let addr = Address::from_public_key(&pk);
    let mut signer_a = InMemorySigner::new();
    signer_a.add_account("", sk);

    let node_a = spawn_node(18_281, vec![], addr, 5_000, signer_a).await;
    let node_b = spawn_node(18_282, vec!["127.0.0.1:18281".to_string()], addr, 5_000, InMemorySigner::new()).await;

    // node A's mining loop only fires once the mempool is non-empty, so
    // seed one pending transaction before waiting for it to be mined.
    let client = reqwest::Client::new();
    let add: serde_json::Value = client
        .post("http://127.0.0.1:18281/tx/add")
        .json(&serde_json::json!({
            "from": addr.hex(),
            "from_pwd": "",
            "to": Address::zero().hex(),
            "value": 10,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(add["success"], true);

    tokio::time::sleep(Duration::from_secs(4)).await;

    let status_a: serde_json::Value = reqwest::get("http://127.0.0.1:18281/node/status")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let status_b: serde_json::Value = reqwest::get("http://127.0.0.1:18282/node/status")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(status_a["block_hash"], status_b["block_hash"]);
    assert_eq!(status_b["block_number"], status_a["block_number"]);

    node_a.cancellation_token().cancel();
    node_b.cancellation_token().cancel();
}
