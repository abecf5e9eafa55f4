//! End-to-end sink loop test against the simulated radio.
//!
//! Runs the real sync state machine and decode pipeline with the simulated
//! broadcaster, and drives the output scheduler by hand in place of the
//! hardware callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use auracast_common::{RadioEvent, SinkConfig};
use auracast_sink::audio::{
    BlockRing, CodecRecovery, DecodePipeline, OutputScheduler, PcmDecoder, StreamParams, Tick,
};
use auracast_sink::radio::sim::SimulatedRadio;
use auracast_sink::state::StreamingFlag;
use auracast_sink::status::LogIndicator;
use auracast_sink::sync::{SyncState, SyncStateMachine};
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct CountingRecovery {
    resets: Arc<AtomicU64>,
}

impl CodecRecovery for CountingRecovery {
    fn recover(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}

fn test_config() -> SinkConfig {
    SinkConfig {
        // One frame is enough priming for the test to observe activity
        startup_primer_frames: 1,
        ..SinkConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn simulated_broadcast_reaches_streaming_and_plays_tone() {
    let config = test_config();
    let params = StreamParams::from_config(&config).unwrap();
    let (producer, consumer) =
        BlockRing::with_capacity(config.ring_capacity_blocks, params.stereo_samples_per_block())
            .split();

    let streaming = StreamingFlag::new();
    let pipeline = Arc::new(Mutex::new(DecodePipeline::new(
        Box::new(PcmDecoder::new()),
        producer,
        streaming.clone(),
        &config,
    )));

    let recovery = CountingRecovery::default();
    let mut scheduler = OutputScheduler::new(consumer, streaming.clone(), recovery.clone());

    // Before anything is synced every tick asks for codec recovery
    assert!(matches!(scheduler.on_period_tick(), Tick::Recovered));
    assert_eq!(recovery.resets.load(Ordering::Relaxed), 1);

    let (event_tx, event_rx) = mpsc::channel(64);
    let radio = SimulatedRadio::new(
        event_tx.clone(),
        pipeline.clone(),
        config.sample_rate_hz,
        config.frame_duration_us,
    );

    let machine = SyncStateMachine::new(
        radio,
        pipeline,
        streaming.clone(),
        Arc::new(LogIndicator),
        &config,
    );
    let mut state_rx = machine.watch();
    let sync_task = tokio::spawn(machine.run(event_rx));

    // The simulated handshake walks every stage to Streaming
    tokio::time::timeout(
        Duration::from_secs(5),
        state_rx.wait_for(|s| *s == SyncState::Streaming),
    )
    .await
    .expect("handshake timed out")
    .unwrap();

    // Give the payload task time to deliver the primer frame and a few more
    tokio::time::timeout(Duration::from_secs(5), async {
        while !streaming.is_active() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("output never armed");

    tokio::time::sleep(Duration::from_millis(50)).await;

    // Streaming ticks hand out tone blocks: decoded samples on even slots,
    // zero padding on odd ones, and not all silence
    let mut saw_signal = false;
    for _ in 0..params.blocks_per_frame() {
        match scheduler.on_period_tick() {
            Tick::Block(block) => {
                for pair in block.chunks_exact(2) {
                    assert_eq!(pair[1], 0);
                    if pair[0] != 0 {
                        saw_signal = true;
                    }
                }
            }
            Tick::Recovered => panic!("expected a block while streaming"),
        }
    }
    assert!(saw_signal, "tone blocks were all silence");
    assert_eq!(recovery.resets.load(Ordering::Relaxed), 1);

    // Sync loss tears the session down and the machine starts scanning again
    event_tx.send(RadioEvent::SyncLost).await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        state_rx.wait_for(|s| *s == SyncState::Scanning),
    )
    .await
    .expect("restart timed out")
    .unwrap();

    // Idle again: ticks go back to recovery until the next session arms
    assert!(matches!(scheduler.on_period_tick(), Tick::Recovered));
    assert!(recovery.resets.load(Ordering::Relaxed) >= 2);

    sync_task.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn encrypted_broadcast_is_rejected_and_rescanned() {
    let config = test_config();
    let params = StreamParams::from_config(&config).unwrap();
    let (producer, _consumer) =
        BlockRing::with_capacity(config.ring_capacity_blocks, params.stereo_samples_per_block())
            .split();

    let streaming = StreamingFlag::new();
    let pipeline = Arc::new(Mutex::new(DecodePipeline::new(
        Box::new(PcmDecoder::new()),
        producer,
        streaming.clone(),
        &config,
    )));

    let (event_tx, event_rx) = mpsc::channel(64);
    let radio = SimulatedRadio::new(
        event_tx.clone(),
        pipeline.clone(),
        config.sample_rate_hz,
        config.frame_duration_us,
    );

    let machine = SyncStateMachine::new(
        radio,
        pipeline,
        streaming.clone(),
        Arc::new(LogIndicator),
        &config,
    );
    let mut state_rx = machine.watch();
    let sync_task = tokio::spawn(machine.run(event_rx));

    tokio::time::timeout(
        Duration::from_secs(5),
        state_rx.wait_for(|s| *s == SyncState::AwaitingSyncable),
    )
    .await
    .expect("handshake timed out")
    .unwrap();

    // An encrypted syncable report beats the simulator's own; the machine
    // must reject it and restart from scanning
    event_tx
        .send(RadioEvent::Syncable { encrypted: true })
        .await
        .unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        state_rx.wait_for(|s| *s == SyncState::Scanning),
    )
    .await
    .expect("restart timed out")
    .unwrap();
    assert!(!streaming.is_streaming());

    sync_task.abort();
}
