//! Hardware audio codec driver (CS47L63)
//!
//! Simple request/response register access behind the `RegisterBus` seam:
//! table-driven bulk configuration, volume control, and the soft reset used
//! as the output scheduler's recovery action. No concurrency of its own;
//! volume state is the only guarded field.

pub mod registers;

use crate::audio::output::CodecRecovery;
use auracast_common::{Error, Result};
use registers::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Volume step for the up/down shell commands, in dB
const VOLUME_ADJUST_STEP_DB: i8 = 3;

/// Log every Nth failed recovery attempt from the output callback
const RECOVERY_LOG_INTERVAL: u64 = 1000;

/// Register-level transport to the codec (SPI in hardware)
pub trait RegisterBus: Send + Sync {
    fn read(&self, addr: u32) -> Result<u32>;
    fn write(&self, addr: u32, value: u32) -> Result<()>;
}

/// In-memory register shadow.
///
/// Stands in for the SPI bus when no codec hardware is attached; reads
/// return the last written value (or zero). Also the test double.
#[derive(Debug, Default)]
pub struct ShadowBus {
    regs: Mutex<HashMap<u32, u32>>,
}

impl ShadowBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegisterBus for ShadowBus {
    fn read(&self, addr: u32) -> Result<u32> {
        let regs = self.regs.lock().unwrap();
        Ok(regs.get(&addr).copied().unwrap_or(0))
    }

    fn write(&self, addr: u32, value: u32) -> Result<()> {
        let mut regs = self.regs.lock().unwrap();
        regs.insert(addr, value);
        Ok(())
    }
}

/// CS47L63 driver over a register bus
pub struct HwCodec<B: RegisterBus> {
    bus: B,

    /// Last volume register value written unmuted, restored by
    /// `volume_adjust(0)`
    prev_volume: Mutex<u32>,

    /// Failed recovery attempts (rate-limited logging from the callback)
    recovery_failures: AtomicU64,
}

impl<B: RegisterBus> HwCodec<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            prev_volume: Mutex::new(OUT_VOLUME_DEFAULT),
            recovery_failures: AtomicU64::new(0),
        }
    }

    /// Write a configuration table, honoring the busy-wait sentinel
    fn reg_conf_write(&self, table: &[(u32, u32)]) -> Result<()> {
        for &(reg, value) in table {
            if reg == BUSY_WAIT {
                busy_wait_us(u64::from(value));
            } else {
                self.bus.write(reg, value)?;
            }
        }
        Ok(())
    }

    /// Reset the part to register defaults; run once at boot
    pub fn init(&self) -> Result<()> {
        self.reg_conf_write(SOFT_RESET)?;
        debug!("Hardware codec reset to defaults");
        Ok(())
    }

    /// Bring up clocks, GPIO routing, the serial port, and the output path
    pub fn default_conf_enable(&self) -> Result<()> {
        self.reg_conf_write(CLOCK_CONFIGURATION)?;
        self.reg_conf_write(GPIO_CONFIGURATION)?;
        self.reg_conf_write(ASP1_ENABLE)?;
        self.reg_conf_write(OUTPUT_ENABLE)?;

        // Unmute at the stored volume
        self.volume_adjust(0)?;

        // Toggle the FLL to start the part up
        self.reg_conf_write(FLL_TOGGLE)?;

        info!("Hardware codec configured");
        Ok(())
    }

    /// Disable the output path and soft-reset the part
    pub fn soft_reset(&self) -> Result<()> {
        self.reg_conf_write(OUTPUT_DISABLE)?;
        self.reg_conf_write(SOFT_RESET)?;
        Ok(())
    }

    /// Set the raw volume register value, clamped to the 0 dB ceiling
    pub fn volume_set(&self, value: u8) -> Result<()> {
        let mut reg_val = u32::from(value);
        if reg_val == 0 {
            info!("Volume at MIN (-{} dB)", MAX_VOLUME_DB);
        } else if reg_val >= MAX_VOLUME_REG_VAL {
            info!("Volume at MAX (0 dB)");
            reg_val = MAX_VOLUME_REG_VAL;
        }

        self.bus.write(OUT1L_VOLUME_1, reg_val | OUT_VU)?;
        *self.prev_volume.lock().unwrap() = reg_val;
        Ok(())
    }

    /// Adjust volume by a signed dB amount; 0 restores the stored level
    /// unmuted. One register bit equals 0.5 dB.
    pub fn volume_adjust(&self, adjustment_db: i8) -> Result<()> {
        if adjustment_db == 0 {
            let prev = *self.prev_volume.lock().unwrap();
            return self
                .bus
                .write(OUT1L_VOLUME_1, (prev | OUT_VU) & !OUT1L_MUTE);
        }

        let current = self.bus.read(OUT1L_VOLUME_1)? & OUT1L_VOL_MASK;
        let mut new_val = current as i32 + i32::from(adjustment_db) * 2;

        if new_val < 0 {
            info!("Volume at MIN (-{} dB)", MAX_VOLUME_DB);
            new_val = 0;
        } else if new_val > MAX_VOLUME_REG_VAL as i32 {
            info!("Volume at MAX (0 dB)");
            new_val = MAX_VOLUME_REG_VAL as i32;
        }

        self.bus
            .write(OUT1L_VOLUME_1, (new_val as u32 | OUT_VU) & !OUT1L_MUTE)?;
        *self.prev_volume.lock().unwrap() = new_val as u32;

        // Rounded down to the nearest integer
        info!("Volume: {} dB", (new_val / 2) - MAX_VOLUME_DB);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn bus_for_tests(&self) -> &B {
        &self.bus
    }

    pub fn volume_increase(&self) -> Result<()> {
        self.volume_adjust(VOLUME_ADJUST_STEP_DB)
    }

    pub fn volume_decrease(&self) -> Result<()> {
        self.volume_adjust(-VOLUME_ADJUST_STEP_DB)
    }

    pub fn volume_mute(&self) -> Result<()> {
        let value = self.bus.read(OUT1L_VOLUME_1)?;
        self.bus.write(OUT1L_VOLUME_1, value | OUT1L_MUTE | OUT_VU)
    }

    pub fn volume_unmute(&self) -> Result<()> {
        let value = self.bus.read(OUT1L_VOLUME_1)?;
        self.bus
            .write(OUT1L_VOLUME_1, (value & !OUT1L_MUTE) | OUT_VU)
    }
}

impl<B: RegisterBus> CodecRecovery for Arc<HwCodec<B>> {
    /// Recovery action issued from the output callback; errors cannot
    /// propagate from that context so they are counted and rate-limited.
    fn recover(&self) {
        if let Err(e) = self.soft_reset() {
            let count = self.recovery_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if count % RECOVERY_LOG_INTERVAL == 1 {
                warn!("Codec recovery failed (total: {}): {}", count, e);
            }
        }
    }
}

/// Spin for the given number of microseconds (table sentinel semantics)
fn busy_wait_us(us: u64) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_micros(us);
    while std::time::Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_wait_sentinel_is_not_written() {
        let codec = HwCodec::new(ShadowBus::new());
        codec.reg_conf_write(SOFT_RESET).unwrap();

        // The reset write landed, the sentinel did not
        assert_eq!(codec.bus.read(SFT_RESET).unwrap(), SFT_RESET_MAGIC);
        assert_eq!(codec.bus.read(BUSY_WAIT).unwrap(), 0);
    }

    #[test]
    fn volume_set_clamps_to_ceiling() {
        let codec = HwCodec::new(ShadowBus::new());

        codec.volume_set(0xFF).unwrap();
        let value = codec.bus.read(OUT1L_VOLUME_1).unwrap();
        assert_eq!(value & OUT1L_VOL_MASK, MAX_VOLUME_REG_VAL);
        assert_ne!(value & OUT_VU, 0);
    }

    #[test]
    fn volume_adjust_moves_in_half_db_steps() {
        let codec = HwCodec::new(ShadowBus::new());
        codec.volume_set(0x40).unwrap();

        codec.volume_adjust(3).unwrap();
        assert_eq!(
            codec.bus.read(OUT1L_VOLUME_1).unwrap() & OUT1L_VOL_MASK,
            0x40 + 6
        );

        codec.volume_adjust(-10).unwrap();
        assert_eq!(
            codec.bus.read(OUT1L_VOLUME_1).unwrap() & OUT1L_VOL_MASK,
            0x40 + 6 - 20
        );
    }

    #[test]
    fn volume_adjust_clamps_at_floor() {
        let codec = HwCodec::new(ShadowBus::new());
        codec.volume_set(2).unwrap();

        codec.volume_adjust(-20).unwrap();
        assert_eq!(codec.bus.read(OUT1L_VOLUME_1).unwrap() & OUT1L_VOL_MASK, 0);
    }

    #[test]
    fn mute_round_trip_preserves_level() {
        let codec = HwCodec::new(ShadowBus::new());
        codec.volume_set(0x30).unwrap();

        codec.volume_mute().unwrap();
        let muted = codec.bus.read(OUT1L_VOLUME_1).unwrap();
        assert_ne!(muted & OUT1L_MUTE, 0);
        assert_eq!(muted & OUT1L_VOL_MASK, 0x30);

        codec.volume_unmute().unwrap();
        let unmuted = codec.bus.read(OUT1L_VOLUME_1).unwrap();
        assert_eq!(unmuted & OUT1L_MUTE, 0);
        assert_eq!(unmuted & OUT1L_VOL_MASK, 0x30);
    }

    #[test]
    fn recovery_swallows_errors() {
        struct FailingBus;
        impl RegisterBus for FailingBus {
            fn read(&self, _addr: u32) -> Result<u32> {
                Err(Error::CodecIo("bus down".into()))
            }
            fn write(&self, _addr: u32, _value: u32) -> Result<()> {
                Err(Error::CodecIo("bus down".into()))
            }
        }

        let codec = Arc::new(HwCodec::new(FailingBus));
        codec.recover();
        assert_eq!(codec.recovery_failures.load(Ordering::Relaxed), 1);
    }
}
