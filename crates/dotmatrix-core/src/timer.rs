use crate::interrupts::{Interrupt, InterruptController};
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

pub const DIV: u16 = 0xFF04;
pub const TIMA: u16 = 0xFF05;
pub const TMA: u16 = 0xFF06;
pub const TAC: u16 = 0xFF07;

/// Divider value the DMG boot ROM leaves behind at PC=0x0100.
const POST_BOOT_COUNTER: u16 = 0xABCC;

/// TIMA overflow handling. After an overflow TIMA reads 0 for one M-cycle
/// (`Pending`), then is loaded from TMA while the interrupt fires (`Reload`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadState {
    #[default]
    None,
    Pending,
    Reload,
}

#[derive(Debug, Clone, Default)]
pub struct Timer {
    /// 16-bit internal counter. DIV is the upper 8 bits.
    counter: u16,
    pub tima: u8,
    pub tma: u8,
    tac: u8,
    reload: ReloadState,
    last_signal: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_boot() -> Self {
        let mut t = Self::new();
        t.counter = POST_BOOT_COUNTER;
        t
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }

    pub fn div(&self) -> u8 {
        (self.counter >> 8) as u8
    }

    pub fn reload_state(&self) -> ReloadState {
        self.reload
    }

    /// Counter bit watched by TIMA, picked by TAC bits 0-1.
    pub fn selected_bit(&self) -> u8 {
        match self.tac & 0x03 {
            0x00 => 9,
            0x01 => 3,
            0x02 => 5,
            _ => 7,
        }
    }

    /// Advance one M-cycle.
    pub fn tick(&mut self, ic: &mut InterruptController) {
        match self.reload {
            ReloadState::Pending => {
                self.tima = self.tma;
                ic.request(Interrupt::Timer);
                self.reload = ReloadState::Reload;
            }
            ReloadState::Reload => self.reload = ReloadState::None,
            ReloadState::None => self.counter = self.counter.wrapping_add(4),
        }
        self.check_edge();
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            DIV => self.div(),
            TIMA => self.tima,
            TMA => self.tma,
            TAC => self.tac | 0xF8,
            _ => unreachable!("timer read from {addr:#06X}"),
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            DIV => {
                self.counter = 0;
                self.check_edge();
            }
            TIMA => match self.reload {
                ReloadState::Reload => {}
                ReloadState::Pending => {
                    self.tima = val;
                    self.reload = ReloadState::None;
                }
                ReloadState::None => self.tima = val,
            },
            TMA => {
                self.tma = val;
                if self.reload == ReloadState::Reload {
                    self.tima = val;
                }
            }
            TAC => {
                self.tac = val & 0x07;
                self.check_edge();
            }
            _ => unreachable!("timer write to {addr:#06X}"),
        }
    }

    fn signal(&self) -> bool {
        self.tac & 0x04 != 0 && (self.counter >> self.selected_bit()) & 1 != 0
    }

    fn check_edge(&mut self) {
        let signal = self.signal();
        if self.last_signal && !signal {
            self.increment();
        }
        self.last_signal = signal;
    }

    fn increment(&mut self) {
        if self.tima == 0xFF {
            self.tima = 0;
            self.reload = ReloadState::Pending;
        } else {
            self.tima += 1;
        }
    }
}

impl Snapshot for Timer {
    fn save(&self, w: &mut StateWriter) {
        w.u16(self.counter);
        w.u8(self.tima);
        w.u8(self.tma);
        w.u8(self.tac);
        w.u8(match self.reload {
            ReloadState::None => 0,
            ReloadState::Pending => 1,
            ReloadState::Reload => 2,
        });
        w.bool(self.last_signal);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.counter = r.u16()?;
        self.tima = r.u8()?;
        self.tma = r.u8()?;
        self.tac = r.u8()? & 0x07;
        self.reload = match r.u8()? {
            0 => ReloadState::None,
            1 => ReloadState::Pending,
            2 => ReloadState::Reload,
            _ => return Err(StateError::Mismatch("timer reload state")),
        };
        self.last_signal = r.bool()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(t: &mut Timer, ic: &mut InterruptController, n: usize) {
        for _ in 0..n {
            t.tick(ic);
        }
    }

    #[test]
    fn selected_bits() {
        let mut t = Timer::new();
        for (tac, bit) in [(0b100, 9), (0b101, 3), (0b110, 5), (0b111, 7)] {
            t.write(TAC, tac);
            assert_eq!(t.selected_bit(), bit);
        }
    }

    #[test]
    fn disabled_timer_does_not_count() {
        let mut t = Timer::new();
        let mut ic = InterruptController::new();
        t.write(TAC, 0b001);
        ticks(&mut t, &mut ic, 64);
        assert_eq!(t.tima, 0);
        assert_eq!(t.div(), 1);
    }

    #[test]
    fn reload_holds_zero_for_one_cycle() {
        let mut t = Timer::new();
        let mut ic = InterruptController::new();
        t.write(TAC, 0b101);
        t.tima = 0xFF;
        t.tma = 0x42;
        ticks(&mut t, &mut ic, 4);
        assert_eq!(t.tima, 0);
        assert_eq!(t.reload_state(), ReloadState::Pending);
        assert_eq!(ic.request_reg() & 0x04, 0);

        t.tick(&mut ic);
        assert_eq!(t.tima, 0x42);
        assert_eq!(t.reload_state(), ReloadState::Reload);
        assert_ne!(ic.request_reg() & 0x04, 0);

        t.tick(&mut ic);
        assert_eq!(t.reload_state(), ReloadState::None);
    }

    #[test]
    fn tima_write_during_pending_cancels_reload() {
        let mut t = Timer::new();
        let mut ic = InterruptController::new();
        t.write(TAC, 0b101);
        t.tima = 0xFF;
        t.tma = 0x42;
        ticks(&mut t, &mut ic, 4);
        t.write(TIMA, 0x10);
        t.tick(&mut ic);
        assert_eq!(t.tima, 0x10);
        assert_eq!(ic.request_reg() & 0x04, 0);
    }

    #[test]
    fn tima_write_during_reload_is_ignored() {
        let mut t = Timer::new();
        let mut ic = InterruptController::new();
        t.write(TAC, 0b101);
        t.tima = 0xFF;
        t.tma = 0x42;
        ticks(&mut t, &mut ic, 5);
        t.write(TIMA, 0x10);
        assert_eq!(t.tima, 0x42);
    }

    #[test]
    fn tma_write_during_reload_updates_tima() {
        let mut t = Timer::new();
        let mut ic = InterruptController::new();
        t.write(TAC, 0b101);
        t.tima = 0xFF;
        t.tma = 0x42;
        ticks(&mut t, &mut ic, 5);
        t.write(TMA, 0x99);
        assert_eq!(t.tima, 0x99);
        assert_eq!(t.tma, 0x99);
    }

    #[test]
    fn tac_change_can_trigger_increment() {
        let mut t = Timer::new();
        let mut ic = InterruptController::new();
        t.write(TAC, 0b101);
        ticks(&mut t, &mut ic, 2);
        // bit 3 is set; switching to bit 9 drops the signal
        t.write(TAC, 0b100);
        assert_eq!(t.tima, 1);
    }

    #[test]
    fn tac_101_counts_every_16_t_cycles() {
        let mut t = Timer::new();
        let mut ic = InterruptController::new();
        t.write(TAC, 0b101);
        ticks(&mut t, &mut ic, 16);
        // 64 T-cycles of a 16 T-cycle period
        assert_eq!(t.tima, 4);
        assert_eq!(ic.request_reg() & 0x04, 0);
    }

    #[test]
    fn overflow_reloads_then_keeps_counting() {
        let mut t = Timer::new();
        let mut ic = InterruptController::new();
        t.write(TAC, 0b101);
        t.write(TIMA, 0xFF);
        t.write(TMA, 0xAA);
        ticks(&mut t, &mut ic, 16);
        // reload on tick 5, then two more edges at counter 32 and 48
        assert_eq!(t.tima, 0xAC);
        assert_eq!(t.counter(), 56);
        assert_ne!(ic.request_reg() & 0x04, 0);
        assert_eq!(t.reload_state(), ReloadState::None);
    }

    #[test]
    fn div_write_clears_whole_counter() {
        let mut t = Timer::new();
        let mut ic = InterruptController::new();
        ticks(&mut t, &mut ic, 127);
        assert_eq!(t.counter(), 0x01FC);
        assert_eq!(t.div(), 0x01);
        t.write(DIV, 0x5A);
        assert_eq!(t.counter(), 0);
        assert_eq!(t.read(DIV), 0);

        // bit 3 high when the counter drops to zero: a falling edge
        t.write(TAC, 0b101);
        ticks(&mut t, &mut ic, 2);
        assert_eq!(t.counter(), 8);
        assert_eq!(t.tima, 0);
        t.write(DIV, 0);
        assert_eq!(t.counter(), 0);
        assert_eq!(t.tima, 1);
    }
}
