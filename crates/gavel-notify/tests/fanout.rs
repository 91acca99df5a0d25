//! Bids flowing from the engine through the hub to channel-backed
//! subscribers.

use std::sync::{Arc, Barrier};

use chrono::{DateTime, TimeDelta, Utc};
use gavel_auction::{AuctionStore, BiddingEngine};
use gavel_notify::{ChannelConnection, Connection, EventQueue, NotificationHub, spawn_dispatcher};
use gavel_types::{AuctionId, BiddingConfig, EndReason};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn drain(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(serde_json::from_slice(&frame).unwrap());
    }
    out
}

fn auction(store: &AuctionStore) -> AuctionId {
    store
        .create("Lot", "", Decimal::new(100, 0), t0() + TimeDelta::hours(1), t0())
        .unwrap()
}

#[test]
fn concurrent_bids_reach_every_subscriber_in_acceptance_order() {
    let store = Arc::new(AuctionStore::default());
    let hub = Arc::new(NotificationHub::new());
    let engine = BiddingEngine::new(store.clone(), hub.clone(), BiddingConfig::default());
    let id = auction(&store);

    let mut receivers: Vec<_> = (0..4)
        .map(|_| {
            let (conn, rx) = ChannelConnection::new(1024);
            hub.subscribe(id, Arc::new(conn)).unwrap();
            rx
        })
        .collect();

    let barrier = Barrier::new(8);
    std::thread::scope(|s| {
        for t in 0..8_i64 {
            let engine = &engine;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for step in 0..25_i64 {
                    let amount = Decimal::new(110 + step * 80 + t * 10, 0);
                    let _ = engine.place_bid(id, &format!("t{t}"), amount, t0());
                }
            });
        }
    });

    let accepted: Vec<u64> = store
        .auction(id)
        .unwrap()
        .bids()
        .iter()
        .map(|b| b.id.0)
        .collect();
    assert!(!accepted.is_empty());

    for rx in &mut receivers {
        let frames = drain(rx);
        assert_eq!(frames[0]["type"], "connected");
        let seen: Vec<u64> = frames[1..]
            .iter()
            .map(|f| f["data"]["bidId"].as_u64().unwrap())
            .collect();
        assert_eq!(seen, accepted);
    }
}

#[test]
fn dead_subscriber_never_blocks_the_bid() {
    let store = Arc::new(AuctionStore::default());
    let hub = Arc::new(NotificationHub::new());
    let engine = BiddingEngine::new(store.clone(), hub.clone(), BiddingConfig::default());
    let id = auction(&store);

    let (alive, mut alive_rx) = ChannelConnection::new(16);
    let (dead, dead_rx) = ChannelConnection::new(16);
    hub.subscribe(id, Arc::new(alive)).unwrap();
    hub.subscribe(id, Arc::new(dead)).unwrap();
    drop(dead_rx);

    engine
        .place_bid(id, "alice", Decimal::new(110, 0), t0())
        .unwrap();
    assert_eq!(hub.subscriber_count(id), 1);
    let frames = drain(&mut alive_rx);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1]["type"], "bidUpdate");
    assert_eq!(frames[1]["data"]["bidderId"], "alice");
}

#[test]
fn slow_subscriber_misses_frames_but_stays() {
    let store = Arc::new(AuctionStore::default());
    let hub = Arc::new(NotificationHub::new());
    let engine = BiddingEngine::new(store.clone(), hub.clone(), BiddingConfig::default());
    let id = auction(&store);

    // Room for the greeting and one update.
    let (slow, mut slow_rx) = ChannelConnection::new(2);
    assert!(slow.is_open());
    hub.subscribe(id, Arc::new(slow)).unwrap();

    for step in 1..=5_i64 {
        engine
            .place_bid(id, "bob", Decimal::new(100 + step * 10, 0), t0())
            .unwrap();
    }
    assert_eq!(hub.subscriber_count(id), 1);
    let frames = drain(&mut slow_rx);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1]["data"]["bidId"], 1);
}

#[tokio::test]
async fn queued_events_include_close() {
    let store = Arc::new(AuctionStore::default());
    let hub = Arc::new(NotificationHub::new());
    let (queue, events) = EventQueue::new();
    let dispatcher = spawn_dispatcher(hub.clone(), events);
    let engine = BiddingEngine::new(store.clone(), Arc::new(queue), BiddingConfig::default());
    let id = auction(&store);

    let (conn, mut rx) = ChannelConnection::new(16);
    hub.subscribe(id, Arc::new(conn)).unwrap();

    engine
        .place_bid(id, "alice", Decimal::new(110, 0), t0())
        .unwrap();
    engine
        .close_auction(id, EndReason::ManualClose, t0())
        .unwrap();
    drop(engine);
    dispatcher.await.unwrap();

    let frames = drain(&mut rx);
    let types: Vec<&str> = frames.iter().map(|f| f["type"].as_str().unwrap()).collect();
    assert_eq!(types, ["connected", "bidUpdate", "auctionClosed"]);
    assert_eq!(frames[2]["data"]["winner"], "alice");
    assert_eq!(frames[2]["data"]["reason"], "MANUAL_CLOSE");
    assert_eq!(frames[2]["data"]["winningBid"], "110");
}
