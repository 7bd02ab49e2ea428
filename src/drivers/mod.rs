pub mod board_info;
pub mod self_program;
#[cfg(all(feature = "attiny841", target_arch = "avr", feature = "debug"))]
pub mod serial_console;
pub mod trampoline;
pub mod write_buffer;

pub use board_info::BoardInfo;
pub use self_program::{FlashLayout, SelfProgram};
#[cfg(all(feature = "attiny841", target_arch = "avr", feature = "debug"))]
pub use serial_console::SerialConsole;
pub use trampoline::Trampoline;
pub use write_buffer::WriteBuffer;
