//! Simulated broadcast radio
//!
//! Stands in for the vendor radio stack so the binary runs end to end on a
//! development host and the integration tests have a driver. Emits the
//! discovery handshake sequence in response to `start_scan`, and after
//! `sync_bis` delivers sine-tone payloads to the decode pipeline at the
//! codec frame cadence.

use crate::audio::decode::SharedPipeline;
use crate::radio::BroadcastRadio;
use auracast_common::{
    BaseDescriptor, CodecParams, RadioEvent, Result, SinkHandle,
};
use auracast_common::base::{BisEntry, Subgroup};
use std::f32::consts::TAU;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Delay between simulated handshake stages
const STAGE_DELAY: Duration = Duration::from_millis(20);

/// Simulated broadcaster state
pub struct SimulatedRadio {
    events: mpsc::Sender<RadioEvent>,
    pipeline: SharedPipeline,

    broadcast_id: u32,
    sample_rate_hz: u32,
    frame_duration_us: u32,
    tone_hz: f32,

    discovery_task: Mutex<Option<JoinHandle<()>>>,
    payload_task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedRadio {
    pub fn new(
        events: mpsc::Sender<RadioEvent>,
        pipeline: SharedPipeline,
        sample_rate_hz: u32,
        frame_duration_us: u32,
    ) -> Self {
        Self {
            events,
            pipeline,
            broadcast_id: 0x123456,
            sample_rate_hz,
            frame_duration_us,
            tone_hz: 440.0,
            discovery_task: Mutex::new(None),
            payload_task: Mutex::new(None),
        }
    }

    fn base(&self) -> BaseDescriptor {
        let params = CodecParams {
            sample_rate_hz: Some(self.sample_rate_hz),
            frame_duration_us: Some(self.frame_duration_us),
        };
        BaseDescriptor {
            subgroups: vec![Subgroup {
                bis: vec![
                    BisEntry { index: 1, params },
                    BisEntry { index: 2, params },
                ],
            }],
        }
    }

    fn abort_task(slot: &Mutex<Option<JoinHandle<()>>>) {
        if let Some(task) = slot.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl BroadcastRadio for SimulatedRadio {
    fn start_scan(&self) -> Result<()> {
        Self::abort_task(&self.discovery_task);

        let events = self.events.clone();
        let broadcast_id = self.broadcast_id;
        let base = self.base();

        let task = tokio::spawn(async move {
            let stages = [
                RadioEvent::Discovered { broadcast_id },
                RadioEvent::PaSynced {
                    sink: SinkHandle(u64::from(broadcast_id)),
                },
                RadioEvent::BaseReceived(base),
                RadioEvent::Syncable { encrypted: false },
            ];

            for event in stages {
                tokio::time::sleep(STAGE_DELAY).await;
                if events.send(event).await.is_err() {
                    return;
                }
            }
        });

        *self.discovery_task.lock().unwrap() = Some(task);
        debug!("Simulated scan started");
        Ok(())
    }

    fn stop_scan(&self) -> Result<()> {
        Self::abort_task(&self.discovery_task);
        Ok(())
    }

    fn delete_sink(&self, sink: SinkHandle) -> Result<()> {
        Self::abort_task(&self.discovery_task);
        Self::abort_task(&self.payload_task);
        debug!("Simulated sink {:?} deleted", sink);
        Ok(())
    }

    fn sync_bis(&self, _sink: SinkHandle, bis_mask: u32) -> Result<()> {
        let events = self.events.clone();
        let pipeline = self.pipeline.clone();

        let frame_duration = Duration::from_micros(u64::from(self.frame_duration_us));
        let samples_per_frame = (u64::from(self.sample_rate_hz)
            * u64::from(self.frame_duration_us)
            / 1_000_000) as usize;
        let step = self.tone_hz * TAU / self.sample_rate_hz as f32;

        let task = tokio::spawn(async move {
            for index in 0..u32::BITS as u8 {
                if bis_mask & (1 << index) != 0
                    && events.send(RadioEvent::StreamStarted { index }).await.is_err()
                {
                    return;
                }
            }

            let mut interval = tokio::time::interval(frame_duration);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut phase = 0.0f32;
            let mut payload = vec![0u8; samples_per_frame * 2];

            loop {
                interval.tick().await;

                for chunk in payload.chunks_exact_mut(2) {
                    let sample = (phase.sin() * 8192.0) as i16;
                    chunk.copy_from_slice(&sample.to_le_bytes());
                    phase = (phase + step) % TAU;
                }

                pipeline.lock().unwrap().on_payload(&payload, true);
            }
        });

        *self.payload_task.lock().unwrap() = Some(task);
        debug!("Simulated BIS sync, mask {:#x}", bis_mask);
        Ok(())
    }
}

impl Drop for SimulatedRadio {
    fn drop(&mut self) {
        Self::abort_task(&self.discovery_task);
        Self::abort_task(&self.payload_task);
    }
}
