//! MBC3 real-time clock. Time advances from wall-clock deltas between
//! accesses, not from emulated cycles.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::debug;

use crate::state::{Snapshot, StateError, StateReader, StateWriter};

const RTC_FILE_MAGIC: &[u8; 4] = b"RTC1";
const RTC_FILE_VERSION: u8 = 1;
const RTC_FILE_LEN: usize = 23;

const NANOS_PER_SECOND: u32 = 1_000_000_000;

pub const RTC_SECONDS: u8 = 0x08;
pub const RTC_MINUTES: u8 = 0x09;
pub const RTC_HOURS: u8 = 0x0A;
pub const RTC_DAY_LOW: u8 = 0x0B;
pub const RTC_CONTROL: u8 = 0x0C;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtcRegisters {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    /// 9-bit day counter.
    pub days: u16,
    pub halt: bool,
    pub carry: bool,
}

impl RtcRegisters {
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }

    fn read(&self, reg: u8) -> u8 {
        match reg {
            RTC_SECONDS => self.seconds & 0x3F,
            RTC_MINUTES => self.minutes & 0x3F,
            RTC_HOURS => self.hours & 0x1F,
            RTC_DAY_LOW => self.days as u8,
            RTC_CONTROL => self.control_byte() | 0x3E,
            _ => 0xFF,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rtc {
    live: RtcRegisters,
    latched: RtcRegisters,
    last_update: SystemTime,
    /// Elapsed time not yet worth a whole second.
    subsecond_nanos: u32,
}

impl Rtc {
    pub fn new(now: SystemTime) -> Self {
        Self {
            live: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            last_update: now,
            subsecond_nanos: 0,
        }
    }

    pub fn live(&self) -> RtcRegisters {
        self.live
    }

    pub fn latched(&self) -> RtcRegisters {
        self.latched
    }

    /// Bring the live registers up to `now`.
    pub fn sync(&mut self, now: SystemTime) {
        let elapsed = now.duration_since(self.last_update).unwrap_or_default();
        self.last_update = now;
        if !self.live.halt {
            self.advance(elapsed);
        }
    }

    pub fn latch(&mut self, now: SystemTime) {
        self.sync(now);
        self.latched = self.live;
        debug!("RTC latched: {:?}", self.latched);
    }

    pub fn read(&self, reg: u8) -> u8 {
        self.latched.read(reg)
    }

    pub fn write(&mut self, reg: u8, value: u8, now: SystemTime) {
        self.sync(now);
        match reg {
            RTC_SECONDS => {
                self.live.seconds = value & 0x3F;
                self.subsecond_nanos = 0;
            }
            RTC_MINUTES => self.live.minutes = value & 0x3F,
            RTC_HOURS => self.live.hours = value & 0x1F,
            RTC_DAY_LOW => self.live.days = (self.live.days & 0x0100) | value as u16,
            RTC_CONTROL => {
                self.live.days = (self.live.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.live.halt = value & 0x40 != 0;
                self.live.carry = value & 0x80 != 0;
            }
            _ => {}
        }
    }

    fn advance(&mut self, elapsed: Duration) {
        let nanos = self.subsecond_nanos + elapsed.subsec_nanos();
        let carry = (nanos / NANOS_PER_SECOND) as u64;
        self.subsecond_nanos = nanos % NANOS_PER_SECOND;
        let seconds = elapsed.as_secs() + carry;
        if seconds > 0 {
            self.advance_seconds(seconds);
        }
    }

    fn advance_seconds(&mut self, mut seconds: u64) {
        // Whole days first so long absences don't walk every minute.
        if self.live.seconds < 60 && self.live.minutes < 60 && self.live.hours < 24 {
            let days = self.live.days as u64 + seconds / 86_400;
            if days > 0x01FF {
                self.live.carry = true;
            }
            self.live.days = (days & 0x01FF) as u16;
            seconds %= 86_400;
        }
        while seconds > 0 {
            let until_minute_tick = self.seconds_until_minute_tick();
            if seconds < until_minute_tick {
                self.live.seconds = ((self.live.seconds as u64 + seconds) & 0x3F) as u8;
                return;
            }
            seconds -= until_minute_tick;
            self.live.seconds = 0;
            self.minute_tick();
        }
    }

    /// Out-of-range values count up to 63 and wrap to 0 without carrying.
    fn seconds_until_minute_tick(&self) -> u64 {
        let sec = self.live.seconds as u64;
        if sec <= 59 { 60 - sec } else { (64 - sec) + 60 }
    }

    fn minute_tick(&mut self) {
        if self.live.minutes == 59 {
            self.live.minutes = 0;
            self.hour_tick();
        } else {
            self.live.minutes = (self.live.minutes + 1) & 0x3F;
        }
    }

    fn hour_tick(&mut self) {
        if self.live.hours == 23 {
            self.live.hours = 0;
            self.day_tick();
        } else {
            self.live.hours = (self.live.hours + 1) & 0x1F;
        }
    }

    fn day_tick(&mut self) {
        if self.live.days >= 0x01FF {
            self.live.days = 0;
            self.live.carry = true;
        } else {
            self.live.days += 1;
        }
    }

    /// Persistent form stored next to battery RAM.
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(RTC_FILE_LEN);
        data.extend_from_slice(RTC_FILE_MAGIC);
        data.push(RTC_FILE_VERSION);
        let saved = self
            .last_update
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        data.extend_from_slice(&saved.to_le_bytes());
        data.extend_from_slice(&self.subsecond_nanos.to_le_bytes());
        data.push(self.live.seconds & 0x3F);
        data.push(self.live.minutes & 0x3F);
        data.push(self.live.hours & 0x1F);
        data.extend_from_slice(&(self.live.days & 0x01FF).to_le_bytes());
        data.push(self.live.halt as u8 | (self.live.carry as u8) << 1);
        data
    }

    /// Restore from [`Rtc::serialize`] output. The next access catches up
    /// with the wall-clock time that passed since it was written.
    pub fn deserialize(&mut self, data: &[u8]) -> bool {
        if data.len() < RTC_FILE_LEN
            || &data[..4] != RTC_FILE_MAGIC
            || data[4] != RTC_FILE_VERSION
        {
            return false;
        }
        let mut r = StateReader::new(&data[5..]);
        let (Ok(secs), Ok(nanos)) = (r.u64(), r.u32()) else {
            return false;
        };
        self.last_update = UNIX_EPOCH + Duration::from_secs(secs);
        self.subsecond_nanos = nanos.min(NANOS_PER_SECOND - 1);
        self.live.seconds = data[17] & 0x3F;
        self.live.minutes = data[18] & 0x3F;
        self.live.hours = data[19] & 0x1F;
        self.live.days = u16::from_le_bytes([data[20], data[21]]) & 0x01FF;
        self.live.halt = data[22] & 0x01 != 0;
        self.live.carry = data[22] & 0x02 != 0;
        self.latched = self.live;
        true
    }
}

impl Snapshot for RtcRegisters {
    fn save(&self, w: &mut StateWriter) {
        w.u8(self.seconds);
        w.u8(self.minutes);
        w.u8(self.hours);
        w.u16(self.days);
        w.bool(self.halt);
        w.bool(self.carry);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.seconds = r.u8()? & 0x3F;
        self.minutes = r.u8()? & 0x3F;
        self.hours = r.u8()? & 0x1F;
        self.days = r.u16()? & 0x01FF;
        self.halt = r.bool()?;
        self.carry = r.bool()?;
        Ok(())
    }
}

impl Snapshot for Rtc {
    fn save(&self, w: &mut StateWriter) {
        self.live.save(w);
        self.latched.save(w);
        w.u32(self.subsecond_nanos);
    }

    /// The wall-clock anchor is left alone so time spent between saving
    /// and loading still counts.
    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.live.load(r)?;
        self.latched.load(r)?;
        self.subsecond_nanos = r.u32()?.min(NANOS_PER_SECOND - 1);
        Ok(())
    }
}
