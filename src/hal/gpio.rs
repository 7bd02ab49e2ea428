//! Child select lines
//!
//! Boards that sit in a chain can gate the next board's bus access through
//! one select line per child.

use embedded_hal::digital::v2::OutputPin;
use ufmt::derive::uDebug;

#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
pub enum SelectError {
    NoSuchChild,
    Pin,
}

pub trait ChildSelect {
    /// Number of child boards, zero when the board has none.
    fn count(&self) -> u8;

    fn select(&mut self, index: u8, selected: bool) -> Result<(), SelectError>;
}

/// Boards without downstream children.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChildren;

impl ChildSelect for NoChildren {
    fn count(&self) -> u8 {
        0
    }

    fn select(&mut self, _index: u8, _selected: bool) -> Result<(), SelectError> {
        Err(SelectError::NoSuchChild)
    }
}

/// One active-high output pin per child.
pub struct PinChildSelect<P, const N: usize> {
    pins: [P; N],
}

impl<P: OutputPin, const N: usize> PinChildSelect<P, N> {
    /// Drives every line low so no child starts out selected.
    pub fn new(mut pins: [P; N]) -> Result<Self, SelectError> {
        for pin in pins.iter_mut() {
            pin.set_low().map_err(|_| SelectError::Pin)?;
        }
        Ok(Self { pins })
    }

    pub fn release(self) -> [P; N] {
        self.pins
    }
}

impl<P: OutputPin, const N: usize> ChildSelect for PinChildSelect<P, N> {
    fn count(&self) -> u8 {
        N as u8
    }

    fn select(&mut self, index: u8, selected: bool) -> Result<(), SelectError> {
        let pin = self
            .pins
            .get_mut(usize::from(index))
            .ok_or(SelectError::NoSuchChild)?;
        let result = if selected { pin.set_high() } else { pin.set_low() };
        result.map_err(|_| SelectError::Pin)
    }
}
