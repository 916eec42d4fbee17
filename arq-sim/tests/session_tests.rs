//! Integration tests for the async session runtime.
//!
//! Time is paused: tokio advances the clock whenever every task is idle, so
//! link latency and retransmission timeouts cost no wall-clock time.

use std::time::Duration;

use arq_sim::session::{LinkConfig, Session, SessionStats};
use arq_sim::{Message, ProtocolConfig};

/// Submit `count` messages, waiting out a full window, and return them.
async fn submit_all(session: &Session, count: usize) -> Vec<Message> {
    let mut submitted = Vec::with_capacity(count);
    for i in 0..count {
        let message = Message::filled(b'a' + (i % 26) as u8);
        while !session.submit(message).await.expect("submit") {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        submitted.push(message);
    }
    submitted
}

async fn run_to_close(config: ProtocolConfig, link: LinkConfig, count: usize) -> (Vec<Message>, SessionStats) {
    let session = Session::spawn(&config, link).expect("spawn");
    let submitted = submit_all(&session, count).await;
    let stats = session.close().await.expect("close");
    (submitted, stats)
}

fn lossy(seed: u64) -> LinkConfig {
    LinkConfig {
        loss_prob: 0.2,
        corrupt_prob: 0.1,
        latency: Duration::from_millis(3),
        seed,
    }
}

// ---------------------------------------------------------------------------
// Test 1: lossless link, both policies
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_session_lossless_selective_repeat() {
    let (submitted, stats) =
        run_to_close(ProtocolConfig::selective_repeat(), LinkConfig::default(), 40).await;

    assert_eq!(stats.unread, submitted);
    assert_eq!(stats.sender.messages_accepted, 40);
    assert_eq!(stats.receiver.messages_delivered, 40);
    assert_eq!(stats.forward.lost, 0);
    assert_eq!(stats.reverse.corrupted, 0);
}

#[tokio::test(start_paused = true)]
async fn test_session_lossless_go_back_n() {
    let (submitted, stats) =
        run_to_close(ProtocolConfig::go_back_n(), LinkConfig::default(), 40).await;

    assert_eq!(stats.unread, submitted);
    assert_eq!(stats.sender.packets_resent, 0, "10 ms RTT is below the 16 ms timeout");
}

// ---------------------------------------------------------------------------
// Test 2: lossy, corrupting link
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_session_lossy_selective_repeat() {
    for seed in [1, 2, 3] {
        let (submitted, stats) =
            run_to_close(ProtocolConfig::selective_repeat(), lossy(seed), 60).await;
        assert_eq!(stats.unread, submitted, "seed {seed}");
        assert!(stats.sender.packets_resent > 0);
        assert!(stats.forward.lost + stats.reverse.lost > 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_lossy_go_back_n() {
    for seed in [1, 2, 3] {
        let (submitted, stats) = run_to_close(ProtocolConfig::go_back_n(), lossy(seed), 60).await;
        assert_eq!(stats.unread, submitted, "seed {seed}");
        // The receiver drains A→B completely; ACKs still queued on B→A when
        // the sender finishes are never read.
        assert_eq!(stats.forward.corrupted, stats.receiver.corrupted_packets);
        assert!(stats.reverse.corrupted >= stats.sender.corrupted_acks);
    }
}

// ---------------------------------------------------------------------------
// Test 3: reading deliveries while the session runs
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_session_recv_while_running() {
    let mut session = Session::spawn(&ProtocolConfig::default(), lossy(9)).expect("spawn");
    let submitted = submit_all(&session, 10).await;

    let mut received = Vec::new();
    while received.len() < submitted.len() {
        received.push(session.recv().await.expect("delivery"));
    }
    assert_eq!(received, submitted);

    let stats = session.close().await.expect("close");
    assert!(stats.unread.is_empty());
    assert_eq!(stats.receiver.messages_delivered, 10);
}

// ---------------------------------------------------------------------------
// Test 4: full window refuses submissions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_session_window_full_refuses() {
    let session = Session::spawn(&ProtocolConfig::go_back_n(), LinkConfig::default()).expect("spawn");

    // No time passes between submissions, so nothing is acknowledged yet.
    for byte in [b'a', b'b', b'c'] {
        assert!(session.submit(Message::filled(byte)).await.unwrap());
    }
    assert!(!session.submit(Message::filled(b'd')).await.unwrap());

    let stats = session.close().await.expect("close");
    assert_eq!(stats.sender.window_full, 1);
    assert_eq!(stats.unread.len(), 3);
}

// ---------------------------------------------------------------------------
// Test 5: configuration errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_session_rejects_bad_config() {
    let bad = ProtocolConfig {
        window_size: 0,
        ..ProtocolConfig::default()
    };
    assert!(Session::spawn(&bad, LinkConfig::default()).is_err());

    let dead_link = LinkConfig {
        loss_prob: 1.0,
        ..LinkConfig::default()
    };
    assert!(Session::spawn(&ProtocolConfig::default(), dead_link).is_err());

    let garbled_link = LinkConfig {
        corrupt_prob: 1.0,
        ..LinkConfig::default()
    };
    assert!(Session::spawn(&ProtocolConfig::default(), garbled_link).is_err());

    let huge_window = ProtocolConfig {
        window_size: usize::MAX,
        ..ProtocolConfig::go_back_n()
    };
    assert!(Session::spawn(&huge_window, LinkConfig::default()).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_session_close_without_traffic() {
    let session = Session::spawn(&ProtocolConfig::default(), LinkConfig::default()).expect("spawn");
    let stats = session.close().await.expect("close");

    assert_eq!(stats.sender.packets_sent, 0);
    assert_eq!(stats.forward.to_network, 0);
    assert!(stats.unread.is_empty());
}
