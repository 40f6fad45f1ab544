//! Bridge between the legacy 0-200 e-stim control API and BLE pulse units
//! speaking the 0x35-framed binary protocol.
//!
//! The unit has no strength-only or mode-only command: every channel write
//! re-specifies enable, strength, mode and the custom-wave parameters
//! together. The bridge therefore keeps a per-channel cache of the last
//! commanded state and composes full frames from deltas, translating
//! between the legacy 0-200 strength scale and the device's 1-276 scale on
//! the way. Queued legacy waveform frames are replayed through the device's
//! custom mode at 10 Hz by a per-channel player.
//!
//! Hosts with their own event loop use [Supervisor], which runs all BLE
//! I/O on a dedicated worker thread; everything else can drive a [Bridge]
//! directly on a tokio runtime.

pub mod bridge;
pub mod config;
pub mod error;
pub mod map;
mod player;
pub mod protocol;
pub mod scanner;
pub mod state;
pub mod supervisor;
pub mod transport;

pub use bridge::{connect, Bridge, StreamUpdate};
pub use config::BridgeConfig;
pub use error::Error;
pub use map::{FreqPolicy, PulseOp};
pub use state::{Channel, StrengthData, StrengthOp};
pub use supervisor::Supervisor;
