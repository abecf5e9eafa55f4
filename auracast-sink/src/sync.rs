//! Broadcast synchronization state machine
//!
//! Drives the multi-stage handshake: scan, periodic-advertising sync, BASE
//! receipt, syncable, stream join, streaming. Every non-terminal stage has
//! the same timeout; a timeout or sync loss tears the session down and
//! restarts from scanning, unconditionally and forever. The streaming
//! state itself waits without a timeout, since no higher-level supervisor
//! exists to declare it stuck.
//!
//! Transitions run on the control context only: radio callbacks arrive as
//! `RadioEvent` messages on a single-consumer queue drained by `run`, so
//! the machine is effectively single-threaded even though the radio and
//! output contexts are concurrent.

use crate::audio::decode::SharedPipeline;
use crate::radio::BroadcastRadio;
use crate::state::StreamingFlag;
use crate::status::{Status, StatusIndicator};
use auracast_common::{BaseDescriptor, RadioEvent, Result, SinkConfig, SinkHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Handshake states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Scanning,
    AwaitingPaSync,
    AwaitingDescription,
    AwaitingSyncable,
    JoiningStreams,
    Streaming,
    LostSync,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Scanning => "scanning",
            SyncState::AwaitingPaSync => "awaiting PA sync",
            SyncState::AwaitingDescription => "awaiting BASE",
            SyncState::AwaitingSyncable => "awaiting syncable",
            SyncState::JoiningStreams => "joining streams",
            SyncState::Streaming => "streaming",
            SyncState::LostSync => "sync lost",
        };
        write!(f, "{}", name)
    }
}

/// One attempt to join a broadcast source.
///
/// Invariant: `source` is non-null iff the state is past Scanning; exactly
/// one session is active at a time (the machine owns it exclusively).
#[derive(Debug)]
pub struct SyncSession {
    pub state: SyncState,
    pub source: Option<SinkHandle>,

    /// Sub-stream indices to join, empty until the BASE is received
    pub bis_mask: u32,

    /// Joined streams that have reported started
    pub started_mask: u32,

    /// First BASE for this attempt was processed; later deliveries are
    /// ignored
    pub base_seen: bool,

    /// Timeout instant for the current state; `None` only while streaming
    /// or idle
    pub deadline: Option<Instant>,
}

impl SyncSession {
    fn new() -> Self {
        Self {
            state: SyncState::Idle,
            source: None,
            bis_mask: 0,
            started_mask: 0,
            base_seen: false,
            deadline: None,
        }
    }
}

/// The synchronization state machine
pub struct SyncStateMachine<R: BroadcastRadio> {
    radio: R,
    session: SyncSession,
    streaming: StreamingFlag,
    pipeline: SharedPipeline,
    status: Arc<dyn StatusIndicator>,
    stage_timeout: Duration,
    max_streams: u8,
    state_tx: watch::Sender<SyncState>,
}

impl<R: BroadcastRadio> SyncStateMachine<R> {
    pub fn new(
        radio: R,
        pipeline: SharedPipeline,
        streaming: StreamingFlag,
        status: Arc<dyn StatusIndicator>,
        config: &SinkConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        Self {
            radio,
            session: SyncSession::new(),
            streaming,
            pipeline,
            status,
            stage_timeout: config.stage_timeout(),
            max_streams: config.max_streams,
            state_tx,
        }
    }

    /// Observe state transitions (used by tests and diagnostics)
    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.session.state
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    fn set_state(&mut self, state: SyncState, with_deadline: bool) {
        self.session.state = state;
        self.session.deadline = with_deadline.then(|| Instant::now() + self.stage_timeout);
        self.state_tx.send_replace(state);
    }

    /// Reset all per-attempt state and restart discovery.
    ///
    /// The prior session, if any, is deleted through the radio first; the
    /// delete is expected to be idempotent. Only a scan-start failure is
    /// fatal: it means the radio subsystem itself is gone.
    pub fn start(&mut self) -> Result<()> {
        self.streaming.set_streaming(false);
        self.session.bis_mask = 0;
        self.session.started_mask = 0;
        self.session.base_seen = false;

        if let Some(handle) = self.session.source.take() {
            if let Err(e) = self.radio.delete_sink(handle) {
                warn!("Deleting broadcast sink failed: {}", e);
            }
        }

        self.pipeline.lock().unwrap().reset();

        info!("Scanning for broadcast sources");
        self.radio.start_scan()?;
        self.set_state(SyncState::Scanning, true);
        self.status.status_changed(Status::Scanning);
        Ok(())
    }

    /// A broadcast source was found during scanning
    pub fn on_discovery(&mut self, broadcast_id: u32) {
        if self.session.state != SyncState::Scanning {
            warn!(
                "Discovery of {:#06x} while {}, ignoring",
                broadcast_id, self.session.state
            );
            return;
        }
        if self.session.source.is_some() {
            warn!("More than one sync session active, ignoring discovery");
            return;
        }

        info!(
            "Broadcast source {:#06x} found, waiting for PA sync",
            broadcast_id
        );
        self.session.source = Some(SinkHandle(u64::from(broadcast_id)));
        self.set_state(SyncState::AwaitingPaSync, true);
    }

    /// Periodic advertising sync established
    pub fn on_pa_synced(&mut self, sink: SinkHandle) {
        if self.session.state != SyncState::AwaitingPaSync {
            warn!("Unexpected PA sync while {}, ignoring", self.session.state);
            return;
        }
        if self.session.source != Some(sink) {
            // Stray late callback from a previous attempt, not fatal
            warn!("PA sync for unknown sink {:?}, ignoring", sink);
            return;
        }

        info!("Broadcast source PA synced, waiting for BASE");
        self.set_state(SyncState::AwaitingDescription, true);
        self.status.status_changed(Status::Synced);
    }

    /// BASE descriptor received; only the first delivery per attempt counts
    pub fn on_base_received(&mut self, base: &BaseDescriptor) {
        if self.session.base_seen {
            debug!("Duplicate BASE delivery, ignoring");
            return;
        }
        if self.session.state != SyncState::AwaitingDescription {
            warn!("BASE received while {}, ignoring", self.session.state);
            return;
        }
        self.session.base_seen = true;

        let mask = base.bis_mask(self.max_streams);
        info!(
            "Received BASE with {} subgroups, BIS mask {:#x}",
            base.subgroup_count(),
            mask
        );

        if mask == 0 {
            // Nothing joinable; stay here and let the stage timeout reset
            warn!("BASE contains no BIS in the supported range");
            return;
        }

        self.session.bis_mask = mask;
        let params = base.codec_params().unwrap_or_default();
        self.pipeline.lock().unwrap().configure(&params);

        self.set_state(SyncState::AwaitingSyncable, true);
    }

    /// The broadcast's ISO data is about to begin
    pub fn on_syncable(&mut self, encrypted: bool) -> Result<()> {
        if self.session.state != SyncState::AwaitingSyncable {
            warn!("Syncable while {}, ignoring", self.session.state);
            return Ok(());
        }

        if encrypted {
            // No decryption support: reject the source and start over
            warn!("Cannot sync to encrypted broadcast source, resetting");
            return self.start();
        }

        let Some(handle) = self.session.source else {
            warn!("Syncable without a source handle, ignoring");
            return Ok(());
        };

        info!("Syncing to broadcast, BIS mask {:#x}", self.session.bis_mask);
        if let Err(e) = self.radio.sync_bis(handle, self.session.bis_mask) {
            warn!("Unable to sync to broadcast source: {}, resetting", e);
            return self.start();
        }

        self.set_state(SyncState::JoiningStreams, true);
        Ok(())
    }

    /// One joined stream reported started
    pub fn on_stream_started(&mut self, index: u8) {
        if u32::from(index) >= u32::BITS {
            warn!("Stream index {} out of range, ignoring", index);
            return;
        }
        debug!("Stream {} started", index);
        self.session.started_mask |= 1 << index;

        if self.session.state == SyncState::JoiningStreams
            && self.session.started_mask & self.session.bis_mask == self.session.bis_mask
        {
            info!("All joined streams started, streaming");
            self.streaming.set_streaming(true);
            // No deadline: waits for sync loss indefinitely
            self.set_state(SyncState::Streaming, false);
            self.status.status_changed(Status::Streaming);
        }
    }

    /// One joined stream stopped
    pub fn on_stream_stopped(&mut self, index: u8) {
        if u32::from(index) >= u32::BITS {
            return;
        }
        debug!("Stream {} stopped", index);
        self.session.started_mask &= !(1 << index);
        self.streaming.set_streaming(false);
    }

    /// The radio layer lost the underlying session
    pub fn on_sync_lost(&mut self) -> Result<()> {
        if self.session.source.is_none() {
            warn!("Unexpected sync loss with no active session, ignoring");
            return Ok(());
        }

        info!("Broadcast sink disconnected");
        self.streaming.set_streaming(false);
        self.set_state(SyncState::LostSync, false);
        self.status.status_changed(Status::Idle);
        self.start()
    }

    /// Check the current stage's deadline; a timeout restarts the whole
    /// attempt. This is the sole retry policy: no backoff, no attempt
    /// ceiling.
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        if let Some(deadline) = self.session.deadline {
            if now >= deadline {
                warn!("Timed out while {}, resetting", self.session.state);
                return self.start();
            }
        }
        Ok(())
    }

    /// Dispatch one radio event
    pub fn handle_event(&mut self, event: RadioEvent) -> Result<()> {
        match event {
            RadioEvent::Discovered { broadcast_id } => self.on_discovery(broadcast_id),
            RadioEvent::PaSynced { sink } => self.on_pa_synced(sink),
            RadioEvent::BaseReceived(base) => self.on_base_received(&base),
            RadioEvent::Syncable { encrypted } => return self.on_syncable(encrypted),
            RadioEvent::StreamStarted { index } => self.on_stream_started(index),
            RadioEvent::StreamStopped { index } => self.on_stream_stopped(index),
            RadioEvent::SyncLost => return self.on_sync_lost(),
            RadioEvent::ChannelMap(map) => {
                if map[0] != 0xFF {
                    self.status.status_changed(Status::ChannelMapDegraded);
                }
            }
        }
        Ok(())
    }

    /// Drive the machine from the radio event queue.
    ///
    /// Returns only on a fatal radio failure or when the event queue
    /// closes; everything else is handled by restarting the handshake.
    pub async fn run(mut self, mut events: mpsc::Receiver<RadioEvent>) -> Result<()> {
        self.start()?;

        loop {
            let deadline = self.session.deadline;

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event)?,
                    None => {
                        info!("Radio event queue closed, stopping");
                        return Ok(());
                    }
                },
                _ = sleep_until_opt(deadline), if deadline.is_some() => {
                    self.tick(Instant::now())?;
                }
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::{DecodePipeline, PcmDecoder};
    use crate::audio::ring_buffer::BlockRing;
    use crate::status::LogIndicator;
    use auracast_common::base::{BisEntry, Subgroup};
    use auracast_common::CodecParams;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Cmd {
        StartScan,
        StopScan,
        DeleteSink(SinkHandle),
        SyncBis(SinkHandle, u32),
    }

    #[derive(Clone, Default)]
    struct MockRadio {
        cmds: Arc<Mutex<Vec<Cmd>>>,
    }

    impl MockRadio {
        fn cmds(&self) -> Vec<Cmd> {
            self.cmds.lock().unwrap().clone()
        }

        fn count(&self, probe: fn(&Cmd) -> bool) -> usize {
            self.cmds.lock().unwrap().iter().filter(|c| probe(c)).count()
        }
    }

    impl BroadcastRadio for MockRadio {
        fn start_scan(&self) -> Result<()> {
            self.cmds.lock().unwrap().push(Cmd::StartScan);
            Ok(())
        }
        fn stop_scan(&self) -> Result<()> {
            self.cmds.lock().unwrap().push(Cmd::StopScan);
            Ok(())
        }
        fn delete_sink(&self, sink: SinkHandle) -> Result<()> {
            self.cmds.lock().unwrap().push(Cmd::DeleteSink(sink));
            Ok(())
        }
        fn sync_bis(&self, sink: SinkHandle, bis_mask: u32) -> Result<()> {
            self.cmds.lock().unwrap().push(Cmd::SyncBis(sink, bis_mask));
            Ok(())
        }
    }

    fn machine(radio: MockRadio) -> (SyncStateMachine<MockRadio>, StreamingFlag) {
        let config = SinkConfig::default();
        let (prod, _cons) = BlockRing::with_capacity(8, 32).split();
        let flag = StreamingFlag::new();
        let pipeline = Arc::new(Mutex::new(DecodePipeline::new(
            Box::new(PcmDecoder::new()),
            prod,
            flag.clone(),
            &config,
        )));
        let sm = SyncStateMachine::new(
            radio,
            pipeline,
            flag.clone(),
            Arc::new(LogIndicator),
            &config,
        );
        (sm, flag)
    }

    fn base_with_indices(indices: &[u8]) -> BaseDescriptor {
        let params = CodecParams {
            sample_rate_hz: Some(16_000),
            frame_duration_us: Some(10_000),
        };
        BaseDescriptor {
            subgroups: vec![Subgroup {
                bis: indices.iter().map(|&index| BisEntry { index, params }).collect(),
            }],
        }
    }

    fn advance_to_syncable(sm: &mut SyncStateMachine<MockRadio>) {
        sm.start().unwrap();
        sm.on_discovery(0x1234);
        sm.on_pa_synced(SinkHandle(0x1234));
        sm.on_base_received(&base_with_indices(&[1, 2]));
        assert_eq!(sm.state(), SyncState::AwaitingSyncable);
    }

    #[test]
    fn happy_path_reaches_streaming() {
        let radio = MockRadio::default();
        let (mut sm, flag) = machine(radio.clone());

        advance_to_syncable(&mut sm);
        sm.on_syncable(false).unwrap();
        assert_eq!(sm.state(), SyncState::JoiningStreams);
        assert!(radio
            .cmds()
            .contains(&Cmd::SyncBis(SinkHandle(0x1234), 0b110)));

        sm.on_stream_started(1);
        assert_eq!(sm.state(), SyncState::JoiningStreams);
        assert!(!flag.is_streaming());

        sm.on_stream_started(2);
        assert_eq!(sm.state(), SyncState::Streaming);
        assert!(flag.is_streaming());
        // The streaming wait has no deadline
        assert!(sm.session().deadline.is_none());
    }

    #[test]
    fn out_of_order_events_do_not_advance() {
        let radio = MockRadio::default();
        let (mut sm, _flag) = machine(radio);
        sm.start().unwrap();

        // BASE and syncable before discovery: all ignored
        sm.on_base_received(&base_with_indices(&[1]));
        sm.on_syncable(false).unwrap();
        sm.on_pa_synced(SinkHandle(7));
        assert_eq!(sm.state(), SyncState::Scanning);

        sm.on_discovery(0x1234);
        assert_eq!(sm.state(), SyncState::AwaitingPaSync);

        // Duplicate discovery is ignored
        sm.on_discovery(0x9999);
        assert_eq!(sm.session().source, Some(SinkHandle(0x1234)));
    }

    #[test]
    fn mismatched_pa_handle_is_a_stray_callback() {
        let radio = MockRadio::default();
        let (mut sm, _flag) = machine(radio);
        sm.start().unwrap();
        sm.on_discovery(0x1234);

        sm.on_pa_synced(SinkHandle(0xBEEF));
        assert_eq!(sm.state(), SyncState::AwaitingPaSync);

        sm.on_pa_synced(SinkHandle(0x1234));
        assert_eq!(sm.state(), SyncState::AwaitingDescription);
    }

    #[test]
    fn duplicate_base_is_a_no_op() {
        let radio = MockRadio::default();
        let (mut sm, _flag) = machine(radio);
        advance_to_syncable(&mut sm);
        assert_eq!(sm.session().bis_mask, 0b110);

        // A different second BASE changes nothing
        sm.on_base_received(&base_with_indices(&[3]));
        assert_eq!(sm.session().bis_mask, 0b110);
        assert_eq!(sm.state(), SyncState::AwaitingSyncable);
    }

    #[test]
    fn mask_intersects_supported_range() {
        // BIS indices {2, 5} against supported range [0, 4]: only 2 joins
        let radio = MockRadio::default();
        let (mut sm, _flag) = machine(radio);
        sm.start().unwrap();
        sm.on_discovery(0x1234);
        sm.on_pa_synced(SinkHandle(0x1234));
        sm.on_base_received(&base_with_indices(&[2, 5]));

        assert_eq!(sm.state(), SyncState::AwaitingSyncable);
        assert_eq!(sm.session().bis_mask, 1 << 2);
    }

    #[test]
    fn encrypted_source_restarts_without_joining() {
        let radio = MockRadio::default();
        let (mut sm, _flag) = machine(radio.clone());
        advance_to_syncable(&mut sm);

        sm.on_syncable(true).unwrap();

        assert_eq!(sm.state(), SyncState::Scanning);
        assert_eq!(sm.session().source, None);
        assert_eq!(sm.count(|c| matches!(c, Cmd::SyncBis(..))), 0);
        // The stale session was deleted on restart
        assert_eq!(
            sm.count(|c| matches!(c, Cmd::DeleteSink(_))),
            1
        );
    }

    #[test]
    fn timeout_resets_to_scanning_with_one_delete() {
        let radio = MockRadio::default();
        let (mut sm, _flag) = machine(radio.clone());
        sm.start().unwrap();
        sm.on_discovery(0x1234);

        // Before the deadline nothing happens
        sm.tick(Instant::now()).unwrap();
        assert_eq!(sm.state(), SyncState::AwaitingPaSync);

        let late = Instant::now() + Duration::from_secs(11);
        sm.tick(late).unwrap();

        assert_eq!(sm.state(), SyncState::Scanning);
        assert_eq!(sm.session().source, None);
        assert_eq!(radio.count(|c| matches!(c, Cmd::DeleteSink(_))), 1);
        assert_eq!(radio.count(|c| matches!(c, Cmd::StartScan)), 2);
    }

    #[test]
    fn sync_loss_while_streaming_restarts() {
        let radio = MockRadio::default();
        let (mut sm, flag) = machine(radio.clone());
        advance_to_syncable(&mut sm);
        sm.on_syncable(false).unwrap();
        sm.on_stream_started(1);
        sm.on_stream_started(2);
        assert!(flag.is_streaming());

        sm.on_sync_lost().unwrap();

        assert_eq!(sm.state(), SyncState::Scanning);
        assert!(!flag.is_streaming());
        assert_eq!(radio.count(|c| matches!(c, Cmd::DeleteSink(_))), 1);
    }

    #[test]
    fn stream_stop_clears_streaming_flag() {
        let radio = MockRadio::default();
        let (mut sm, flag) = machine(radio);
        advance_to_syncable(&mut sm);
        sm.on_syncable(false).unwrap();
        sm.on_stream_started(1);
        sm.on_stream_started(2);
        assert!(flag.is_streaming());

        sm.on_stream_stopped(2);
        assert!(!flag.is_streaming());
    }

    #[test]
    fn empty_mask_waits_for_timeout() {
        let radio = MockRadio::default();
        let (mut sm, _flag) = machine(radio);
        sm.start().unwrap();
        sm.on_discovery(0x1234);
        sm.on_pa_synced(SinkHandle(0x1234));

        // All indices out of range: not an error, but nothing to join
        sm.on_base_received(&base_with_indices(&[6, 7]));
        assert_eq!(sm.state(), SyncState::AwaitingDescription);
        assert_eq!(sm.session().bis_mask, 0);
    }

    impl SyncStateMachine<MockRadio> {
        fn count(&self, probe: fn(&Cmd) -> bool) -> usize {
            self.radio.count(probe)
        }
    }
}
