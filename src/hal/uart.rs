use avr_device::attiny841::USART0;

use crate::config::{CPU_FREQ_HZ, DEBUG_BAUD};

const UBRR: u16 = (CPU_FREQ_HZ / (16 * DEBUG_BAUD) - 1) as u16;

const UDRE: u8 = 1 << 5;
const TXEN: u8 = 1 << 3;
// 8N1
const UCSZ: u8 = 0b11 << 1;

/// Transmit-only USART0, busy-waiting on the data register.
pub struct Uart {
    _private: (),
}

impl Uart {
    pub fn new() -> Self {
        unsafe {
            let p = USART0::ptr();
            (*p).ubrr0.write(|w| w.bits(UBRR));
            (*p).ucsr0c.write(|w| w.bits(UCSZ));
            (*p).ucsr0b.write(|w| w.bits(TXEN));
        }
        Self { _private: () }
    }

    pub fn write_byte(&mut self, byte: u8) {
        unsafe {
            let p = USART0::ptr();
            while (*p).ucsr0a.read().bits() & UDRE == 0 {}
            (*p).udr0.write(|w| w.bits(byte));
        }
    }
}

impl Default for Uart {
    fn default() -> Self {
        Self::new()
    }
}
