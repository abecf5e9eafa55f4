//! CS47L63 register map excerpts and configuration tables
//!
//! Each table is an ordered list of (register, value) writes. The reserved
//! address `BUSY_WAIT` is a sentinel: instead of a register write, the bus
//! busy-waits for the number of microseconds given in the value field.

/// Sentinel address: busy-wait for `value` microseconds instead of writing
pub const BUSY_WAIT: u32 = 0xFFFF_FFFF;

// Output volume register and fields
pub const OUT1L_VOLUME_1: u32 = 0x4010;
/// Volume update latch; writes take effect when this bit is set
pub const OUT_VU: u32 = 0x0200;
pub const OUT1L_MUTE: u32 = 0x0100;
pub const OUT1L_VOL_MASK: u32 = 0x00FF;

/// Register value for 0 dB; 1 bit equals 0.5 dB below it
pub const MAX_VOLUME_REG_VAL: u32 = 0x80;
/// Attenuation span in dB from minimum to maximum
pub const MAX_VOLUME_DB: i32 = 64;
/// Power-on default: -15 dB
pub const OUT_VOLUME_DEFAULT: u32 = 0x62;

// Control registers used by the configuration tables
pub const SFT_RESET: u32 = 0x0000;
pub const SFT_RESET_MAGIC: u32 = 0x5A00_0000;
pub const SYSCLK_1: u32 = 0x0101;
pub const SAMPLE_RATE_1: u32 = 0x0102;
pub const FLL1_CONTROL_1: u32 = 0x0171;
pub const GPIO1_CTRL_1: u32 = 0x0C08;
pub const GPIO2_CTRL_1: u32 = 0x0C0C;
pub const ASP1_CONTROL_1: u32 = 0x0500;
pub const ASP1_ENABLES_1: u32 = 0x0508;
pub const OUT1L_ENABLE_1: u32 = 0x4000;

/// System clock and sample rate setup
pub static CLOCK_CONFIGURATION: &[(u32, u32)] = &[
    (SYSCLK_1, 0x0404),      // 49.152 MHz from FLL1, enabled
    (SAMPLE_RATE_1, 0x0012), // 16 kHz
    (BUSY_WAIT, 200),
];

/// GPIO routing for the audio serial port
pub static GPIO_CONFIGURATION: &[(u32, u32)] = &[
    (GPIO1_CTRL_1, 0x2280),
    (GPIO2_CTRL_1, 0x2281),
];

/// Audio serial port 1: 16-bit I2S slave, RX enabled
pub static ASP1_ENABLE: &[(u32, u32)] = &[
    (ASP1_CONTROL_1, 0x0010),
    (ASP1_ENABLES_1, 0x0003),
];

/// Output path enable
pub static OUTPUT_ENABLE: &[(u32, u32)] = &[
    (OUT1L_ENABLE_1, 0x0001),
    (BUSY_WAIT, 1000),
];

/// Output path disable, run before a soft reset
pub static OUTPUT_DISABLE: &[(u32, u32)] = &[
    (OUT1L_ENABLE_1, 0x0000),
    (BUSY_WAIT, 1000),
];

/// FLL1 off/on toggle required to clock the part up
pub static FLL_TOGGLE: &[(u32, u32)] = &[
    (FLL1_CONTROL_1, 0x0000),
    (BUSY_WAIT, 200),
    (FLL1_CONTROL_1, 0x0001),
    (BUSY_WAIT, 200),
];

/// Soft reset; the part needs ~3 ms before accepting traffic again
pub static SOFT_RESET: &[(u32, u32)] = &[
    (SFT_RESET, SFT_RESET_MAGIC),
    (BUSY_WAIT, 3000),
];
