pub mod flash;
pub mod gpio;

#[cfg(all(feature = "attiny841", target_arch = "avr"))]
pub mod spm;
#[cfg(all(feature = "attiny841", target_arch = "avr", feature = "debug"))]
pub mod uart;
#[cfg(all(feature = "attiny841", target_arch = "avr"))]
pub mod watchdog;

pub use flash::{FlashDevice, FlashError};
pub use gpio::{ChildSelect, NoChildren, PinChildSelect, SelectError};
