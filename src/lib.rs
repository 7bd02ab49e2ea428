//! Field-updatable bootloader for boards on a shared bus.
//!
//! A host finds boards in the initial address range, hands out unique
//! addresses, then streams application images into flash over a small
//! CRC-protected request/reply protocol. Targets plug in through
//! [`hal::FlashDevice`], [`protocol::transport::BusTransport`] and
//! [`hal::ChildSelect`].
#![cfg_attr(not(test), no_std)]
#![cfg_attr(
    all(feature = "attiny841", target_arch = "avr"),
    feature(asm_experimental_arch)
)]

pub mod bootloader;
pub mod config;
pub mod drivers;
pub mod hal;
pub mod logger;
pub mod protocol;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bootloader::{Bootloader, SessionExit};
pub use config::BoardConfig;
