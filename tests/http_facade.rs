//! End-to-end smoke test of the HTTP facade: boot a node against a fresh
//! temp data directory, submit a signed transaction over the wire, and
//! confirm it shows up in the mempool and eventually (once mined) in
//! the balances.

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

async fn spawn_test_node(port: u16, funded: Address, amount: u64, signer: InMemorySigner) -> Arc<Node> {
    let dir = tempfile::tempdir().unwrap();
    let mut config = NodeConfig::development();
    config.data_dir = dir.into_path();
    config.listen_port = port;
    config.difficulty = 0;

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
async fn status_reports_genesis_state_on_a_fresh_node() {
    let secp = secp256k1::Secp256k1::new();
    let (_sk, pk) = secp.generate_keypair(&mut rand::thread_rng());
    let addr = Address::from_public_key(&pk);

    let node = spawn_test_node(18_181, addr, 1_000, InMemorySigner::new()).await;
    let base = format!("http://127.0.0.1:{}", node.config.listen_port);

    let status: serde_json::Value = reqwest::get(format!("{base}/node/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["block_number"], 0);

    let balances: serde_json::Value = reqwest::get(format!("{base}/balances/list"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(balances["balances"][addr.hex()], 1_000);

    node.cancellation_token().cancel();
}

#[tokio::test]
async fn submitted_transaction_appears_in_mempool_then_gets_mined() {
    let secp = secp256k1::Secp256k1::new();
    let (sk, pk) = secp.generate_keypair(&mut rand::thread_rng());
    let from = Address::from_public_key(&pk);
    let mut signer = InMemorySigner::new();
    signer.add_account("hunter2", sk);

    let node = spawn_test_node(18_182, from, 10_000, signer).await;
    let base = format!("http://127.0.0.1:{}", node.config.listen_port);

    let client = reqwest::Client::new();
    let add_response: serde_json::Value = client
        .post(format!("{base}/tx/add"))
        .json(&serde_json::json!({
            "from": from.hex(),
            "from_pwd": "hunter2",
            "to": Address::zero().hex(),
            "value": 100,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(add_response["success"], true);

    let mempool: serde_json::Value = reqwest::get(format!("{base}/mempool")).await.unwrap().json().await.unwrap();
    assert_eq!(mempool.as_object().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;

    let balances: serde_json::Value = reqwest::get(format!("{base}/balances/list"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(balances["balances"][Address::zero().hex()], 100);

    node.cancellation_token().cancel();
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let secp = secp256k1::Secp256k1::new();
    let (sk, pk) = secp.generate_keypair(&mut rand::thread_rng());
    let from = Address::from_public_key(&pk);
    let mut signer = InMemorySigner::new();
    signer.add_account("correct-horse", sk);

    let node = spawn_test_node(18_183, from, 10_000, signer).await;
    let base = format!("http://127.0.0.1:{}", node.config.listen_port);

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/tx/add"))
        .json(&serde_json::json!({
            "from": from.hex(),
            "from_pwd": "wrong",
            "to": Address::zero().hex(),
            "value": 100,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    node.cancellation_token().cancel();
}
