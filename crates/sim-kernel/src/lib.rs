//! A kernel that runs on the host.
//!
//! [`SimKernel`] implements every capability of `driver-interface` in memory
//! and exposes the knobs a test needs: driving GPIO lines, raising
//! interrupts, transmitting frames, injecting failures, and counting what is
//! still held. [`Bus`] discovers devices and drives bind and unbind, and
//! [`Board`] builds both from a TOML board description.

mod board;
mod bus;
pub mod config;
pub mod hexdump;
mod kernel;
pub mod logger;

pub use board::Board;
pub use bus::{Bus, ProbeReport};
pub use config::{BoardConfig, ConfigError};
pub use kernel::{FaultPoint, SimKernel, GPIO_IRQ_BASE, MSIX_IRQ_BASE};
pub use logger::SimLogger;
