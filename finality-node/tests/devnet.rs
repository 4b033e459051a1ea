use std::time::Duration;

use finality_consensus::{ConsensusConfig, FetchPolicy, RoundStatus};
use finality_node::{Config, Devnet, NodeError};

fn fast_config(bp_count: usize, rounds: u64) -> Config {
    Config {
        bp_count,
        rounds,
        block_interval_ms: 30,
        consensus: ConsensusConfig {
            fetch: FetchPolicy { poll_interval_ms: 5, timeout_ms: 2_000 },
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_four_bps_finalize_the_same_chain() {
    // 1. Launch the committee
    let config = fast_config(4, 3);
    let devnet = Devnet::launch(&config).await.unwrap();
    assert_eq!(devnet.nodes().len(), 4);
    assert_eq!(devnet.bp_set().len(), 4);

    // 2. Produce and finalize
    let chain = devnet.run().await.unwrap();

    // 3. Every BP committed the same linked chain
    assert_eq!(chain.len(), 3);
    for (i, block) in chain.iter().enumerate() {
        assert_eq!(block.seq_no, i as u64 + 1);
        if i > 0 {
            assert_eq!(block.parent_hash, chain[i - 1].hash());
        }
    }
    for node in devnet.nodes() {
        assert!(node.pool.committed_count() >= 3, "{} is behind", node.name);
        assert!(node.engine.seq_no().await >= 4);
    }

    devnet.shutdown().await;
}

#[tokio::test]
async fn test_single_bp_finalizes_alone() {
    let config = fast_config(1, 2);
    let devnet = Devnet::launch(&config).await.unwrap();

    let chain = devnet.run().await.unwrap();
    assert_eq!(chain.len(), 2);
    devnet.shutdown().await;
}

#[tokio::test]
async fn test_stalls_without_quorum() {
    // 4 BPs need 3 votes; with two cut off no block can finalize
    let mut config = fast_config(4, 1);
    config.consensus.fetch.timeout_ms = 200;
    let devnet = Devnet::launch(&config).await.unwrap();
    for node in &devnet.nodes()[2..] {
        devnet.network().disconnect(node.peer_id).await;
    }

    let err = devnet.run().await.unwrap_err();
    assert!(matches!(err, NodeError::Stalled { committed: 0, expected: 1 }));
    assert_eq!(devnet.nodes()[0].engine.status().await, RoundStatus::CollectingPreCommit);

    devnet.shutdown().await;
}

#[tokio::test]
async fn test_late_block_fails_its_round_and_the_chain_moves_on() {
    // block 1 shows up well after every BP gave up waiting for it
    let mut config = fast_config(4, 3);
    config.consensus.fetch.timeout_ms = 500;
    let devnet = Devnet::launch(&config).await.unwrap();
    let producer = devnet.producer().delay_block(1, Duration::from_millis(750));

    let chain = devnet.run_with(producer).await.unwrap();

    let finalized: Vec<u64> = chain.iter().map(|b| b.seq_no).collect();
    assert_eq!(finalized, vec![2, 3]);
    for node in devnet.nodes() {
        assert!(node.pool.committed(1).is_none(), "{} finalized the late block", node.name);
        assert!(node.engine.seq_no().await >= 4);
    }

    devnet.shutdown().await;
}

#[tokio::test]
async fn test_launch_rejects_invalid_config() {
    let config = Config { bp_count: 0, ..Default::default() };
    assert!(matches!(Devnet::launch(&config).await, Err(NodeError::Config(_))));
}
