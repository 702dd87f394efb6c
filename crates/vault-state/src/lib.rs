//! # vault-state
//!
//! State management and the actuator side-channel for npuvault.
//!
//! This crate provides:
//! - `StateStore`, the single authoritative record of the current `SystemState`
//! - `FileActuatorChannel`, which publishes desired actuator values as plain text files
//! - Fail-safe readers and a polling `PeripheralWatcher` for the peripheral side
//!
//! ## Example
//!
//! ```rust
//! use vault_core::{FanSpeed, SystemState};
//! use vault_state::StateStore;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = StateStore::new(SystemState::default());
//! let current = store.snapshot().await;
//! let mut next = current;
//! next.fan_speed_percent = FanSpeed::clamped(140);
//! assert!(store.compare_and_set(&current, next).await);
//!
//! assert_eq!(store.snapshot().await.fan_speed_percent, FanSpeed::FULL);
//! # }
//! ```

pub mod actuator;
pub mod store;
pub mod watcher;

// Re-export commonly used types
pub use actuator::{parse_diode_state, parse_fan_speed, read_diode_state, read_fan_speed, FileActuatorChannel};
pub use store::{StateStore, StoreStats};
pub use watcher::{Peripheral, PeripheralReading, PeripheralWatcher};
