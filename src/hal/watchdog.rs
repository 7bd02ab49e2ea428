use avr_device::attiny841::{CPU, WDT};

// configuration change protection signature for WDTCSR
const CCP_IOREG: u8 = 0xd8;
const WDE: u8 = 1 << 3;
const WDRF: u8 = 1 << 3;

/// Turns off a watchdog left running by a previous reset. Must run early,
/// the watchdog stays enabled after a watchdog reset.
pub fn disable() {
    avr_device::interrupt::free(|_| unsafe {
        (*CPU::ptr()).mcusr.modify(|r, w| w.bits(r.bits() & !WDRF));
        (*CPU::ptr()).ccp.write(|w| w.bits(CCP_IOREG));
        (*WDT::ptr()).wdtcsr.write(|w| w.bits(0x00));
    });
}

/// Resets the MCU through the shortest watchdog timeout.
pub fn reset() -> ! {
    avr_device::interrupt::disable();
    unsafe {
        (*CPU::ptr()).ccp.write(|w| w.bits(CCP_IOREG));
        (*WDT::ptr()).wdtcsr.write(|w| w.bits(WDE));
    }
    loop {}
}
