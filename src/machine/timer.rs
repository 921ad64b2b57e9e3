use serde::{Serialize, Deserialize};

use crate::{
    primitives::{Byte, Word},
    machine::interrupt::{InterruptController, Interrupt},
};


/// Manages the four timer registers (DIV, TIMA, TMA, TAC) and is responsible
/// for triggering the timer interrupt.
///
/// Internally there's no separate "divider" and "counter" clock: both DIV and
/// TIMA are driven by a single free-running 16-bit system counter. DIV is
/// just its top 8 bits; TIMA increments on the falling edge of one particular
/// bit of that counter (selected by TAC), ANDed with the TAC enable bit. This
/// is what makes writing to DIV able to cause a "spurious" TIMA increment:
/// resetting the counter to 0 can itself cause the selected bit to fall from
/// 1 to 0.
#[derive(Serialize, Deserialize)]
pub(crate) struct Timer {
    /// The free-running 16-bit system counter. `DIV` is `system_counter >> 8`.
    system_counter: u16,

    /// FF05 TIMA.
    counter: Byte,

    /// FF06 TMA: when `counter` overflows, it is (after a 4 t-cycle delay)
    /// replaced with this value.
    modulo: Byte,

    /// FF07: control register.
    ///
    /// - Bit 2: timer enable
    /// - Bits 1 & 0: selects which system-counter bit increments TIMA
    control: Byte,

    /// Set for 4 t-cycles after `counter` overflows 0xFF -> 0x00. While this
    /// is active, `counter` reads as `0x00`; once it elapses, `counter` is
    /// reloaded from `modulo` and the timer interrupt is requested. A write
    /// to `TIMA` during this window cancels the reload; a write to `TMA`
    /// during this window changes what gets reloaded.
    overflow_delay: Option<u8>,
}

impl Timer {
    /// Bit of the 16-bit system counter that is monitored for each TAC
    /// selector value, in order: 00, 01, 10, 11.
    const TAP_BITS: [u8; 4] = [9, 3, 5, 7];

    pub(crate) fn new() -> Self {
        Timer {
            system_counter: 0xABCC,
            counter: Byte::zero(),
            modulo: Byte::zero(),
            control: Byte::zero(),
            overflow_delay: None,
        }
    }

    fn tap_bit(&self) -> u8 {
        Self::TAP_BITS[(self.control.get() & 0b11) as usize]
    }

    fn selected_bit_set(&self) -> bool {
        (self.system_counter >> self.tap_bit()) & 1 != 0
    }

    pub(crate) fn is_enabled(&self) -> bool {
        (self.control.get() & 0b100) != 0
    }

    /// Loads one of the timer registers. `addr` has to be between 0xFF04 and
    /// 0xFF07 (inclusive).
    pub(crate) fn load_byte(&self, addr: Word) -> Byte {
        match addr.get() {
            0xFF04 => Byte::new((self.system_counter >> 8) as u8),
            0xFF05 => if self.overflow_delay.is_some() { Byte::zero() } else { self.counter },
            0xFF06 => self.modulo,
            0xFF07 => self.control.map(|b| b | 0b1111_1000),
            _ => panic!("called `Timer::load_byte` with invalid address"),
        }
    }

    /// Writes the given value to one of the timer registers. `addr` has to be
    /// between 0xFF04 and 0xFF07 (inclusive).
    pub(crate) fn store_byte(&mut self, addr: Word, byte: Byte) {
        match addr.get() {
            0xFF04 => {
                let was_set = self.is_enabled() && self.selected_bit_set();
                self.system_counter = 0;
                // Resetting the counter can itself cause the selected bit to
                // fall from 1 to 0, which increments TIMA exactly like a
                // normal falling edge would.
                if was_set {
                    self.increment_tima();
                }
            }
            0xFF05 => {
                // A write during the overflow-delay window cancels the
                // pending TMA reload/interrupt outright.
                self.overflow_delay = None;
                self.counter = byte;
            }
            0xFF06 => {
                self.modulo = byte;
            }
            0xFF07 => {
                let was_set = self.is_enabled() && self.selected_bit_set();
                self.control = byte;
                let is_set = self.is_enabled() && self.selected_bit_set();
                // Changing TAC can also produce a spurious falling edge if
                // the newly selected bit (or the enable bit) causes the
                // monitored condition to go from true to false.
                if was_set && !is_set {
                    self.increment_tima();
                }
            }
            _ => panic!("called `Timer::store_byte` with invalid address"),
        }
    }

    fn increment_tima(&mut self) {
        let (new, overflowed) = self.counter.get().overflowing_add(1);
        self.counter = Byte::new(new);
        if overflowed {
            self.overflow_delay = Some(4);
        }
    }

    /// Advances the timer by one t-cycle (1/4194304 second).
    pub(crate) fn step(&mut self, interrupt_controller: &mut InterruptController) {
        if let Some(delay) = self.overflow_delay {
            if delay <= 1 {
                self.counter = self.modulo;
                interrupt_controller.request_interrupt(Interrupt::Timer);
                self.overflow_delay = None;
            } else {
                self.overflow_delay = Some(delay - 1);
            }
        }

        let was_set = self.is_enabled() && self.selected_bit_set();
        self.system_counter = self.system_counter.wrapping_add(1);
        let is_set = self.is_enabled() && self.selected_bit_set();

        if was_set && !is_set {
            self.increment_tima();
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    fn step_n(timer: &mut Timer, ic: &mut InterruptController, n: u32) {
        for _ in 0..n {
            timer.step(ic);
        }
    }

    #[test]
    fn divider_increments_at_top_byte() {
        let mut timer = Timer::new();
        timer.system_counter = 0;
        let mut ic = InterruptController::new();

        step_n(&mut timer, &mut ic, 255);
        assert_eq!(timer.load_byte(Word::new(0xFF04)).get(), 0);
        timer.step(&mut ic);
        assert_eq!(timer.load_byte(Word::new(0xFF04)).get(), 1);
    }

    #[test]
    fn tima_overflow_reloads_after_delay_and_requests_interrupt() {
        let mut timer = Timer::new();
        timer.system_counter = 0;
        timer.store_byte(Word::new(0xFF06), Byte::new(0x42));
        timer.store_byte(Word::new(0xFF07), Byte::new(0b101)); // enabled, tap bit 3
        timer.counter = Byte::new(0xFF);
        let mut ic = InterruptController::new();

        // Tick the system counter until bit 3 falls from 1 to 0.
        timer.system_counter = 0b1000; // bit 3 set
        timer.step(&mut ic); // counter -> 0b1001, bit 3 still set, no edge
        assert_eq!(timer.counter.get(), 0xFF);

        timer.system_counter = 0b1111;
        timer.step(&mut ic); // wraps to 0b1_0000, bit 3 falls 1->0
        assert_eq!(timer.counter.get(), 0x00);
        assert!(ic.pending_interrupt().is_none());

        step_n(&mut timer, &mut ic, 3);
        assert_eq!(timer.counter.get(), 0x00);
        assert!(ic.pending_interrupt().is_none());

        step_n(&mut timer, &mut ic, 1);
        assert_eq!(timer.counter.get(), 0x42);
        assert!(ic.pending_interrupt().is_some());
    }

    #[test]
    fn writing_div_can_cause_spurious_tima_increment() {
        let mut timer = Timer::new();
        timer.store_byte(Word::new(0xFF07), Byte::new(0b101)); // enabled, tap bit 3
        timer.system_counter = 0b1000; // bit 3 set
        timer.counter = Byte::new(5);
        let mut ic = InterruptController::new();

        timer.store_byte(Word::new(0xFF04), Byte::new(0));
        assert_eq!(timer.counter.get(), 6);
        assert_eq!(timer.system_counter, 0);
    }
}
