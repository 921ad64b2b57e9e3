use serde::{Serialize, Deserialize};

use crate::{
    cartridge::{CartridgeType, MbcKind, RamSize, RomSize},
    error::LoadError,
    primitives::{Byte, Word},
};
pub(crate) use self::{
    no_mbc::NoMbc,
    mbc1::Mbc1,
    mbc2::Mbc2,
    mbc3::Mbc3,
    mbc5::Mbc5,
};

mod no_mbc;
mod mbc1;
mod mbc2;
mod mbc3;
mod mbc5;


/// A memory bank controller.
///
/// This part of the cartridge controls all writes and reads to and from ROM
/// and RAM. Usually, some kind of banking strategy is used to store more than
/// `0x8000` bytes on the cartridge.
pub(crate) trait Mbc {
    /// Loads one byte from the cartridge ROM. The `addr` has to be between `0`
    /// and `0x8000`.
    fn load_rom_byte(&self, addr: Word) -> Byte;

    /// Stores one byte to the cartridge ROM. The `addr` has to be between `0`
    /// and `0x8000`. This usually does nothing except potentially writing into
    /// MBC registers.
    fn store_rom_byte(&mut self, addr: Word, byte: Byte);

    /// Loads one byte from the external RAM. The `addr` is relative and has to
    /// be between `0` and `0x2000`.
    fn load_ram_byte(&self, addr: Word) -> Byte;

    /// Stores one byte to the external RAM. The `addr` is relative and has to
    /// be between `0` and `0x2000`.
    fn store_ram_byte(&mut self, addr: Word, byte: Byte);

    /// Serializes the battery-backed state (RAM, and RTC registers if any)
    /// into a flat byte buffer.
    fn save_persistent(&self) -> Vec<u8>;

    /// Restores battery-backed state previously produced by
    /// [`Mbc::save_persistent`]. Silently ignores malformed/short buffers
    /// (the emulator just keeps whatever default state it already has).
    fn load_persistent(&mut self, data: &[u8]);

    /// Advances any real-time clock by `seconds` seconds of wall-clock time.
    /// A no-op for every MBC kind except MBC3.
    fn tick_rtc(&mut self, _seconds: u64) {}

    /// Captures the bank-switching registers (current ROM/RAM bank, the
    /// RAM-enable latch, mode bits, RTC latch byte) for a save-state. This is
    /// disjoint from [`Mbc::save_persistent`]: that one covers the RAM/RTC
    /// contents a host would keep across process restarts, this one covers
    /// the small amount of state that only matters for mid-session
    /// save-states (spec's "cartridge mutable state" section).
    fn bank_state(&self) -> BankState;

    /// Restores bank-switching registers previously produced by
    /// [`Mbc::bank_state`]. Mismatched variants are ignored (the save-state
    /// codec already validates the MBC kind before calling this).
    fn restore_bank_state(&mut self, state: &BankState);
}

/// The bank-switching registers of one memory bank controller, as captured
/// in a save-state. See [`Mbc::bank_state`].
#[derive(Clone, Serialize, Deserialize)]
pub(crate) enum BankState {
    None,
    Mbc1 { current_bank: u8, ram_mode: bool, ram_enabled: bool },
    Mbc2 { rom_bank: u8, ram_enabled: bool },
    Mbc3 { rom_bank: u8, ram_bank: u8, ram_enabled: bool, latch_rtc: u8 },
    Mbc5 { rom_bank: u16, ram_bank: u8, ram_enabled: bool },
}

/// Dispatches to one of the five supported memory bank controllers.
///
/// An enum (rather than `Box<dyn Mbc>`) is used so cloning/serializing the
/// whole cartridge state for save-states doesn't need trait-object support.
pub(crate) enum MbcChip {
    None(NoMbc),
    Mbc1(Mbc1),
    Mbc2(Mbc2),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

impl MbcChip {
    pub(crate) fn new(
        ty: CartridgeType,
        rom: &[u8],
        rom_size: RomSize,
        ram_size: RamSize,
    ) -> Result<Self, LoadError> {
        Ok(match ty.mbc {
            MbcKind::None => MbcChip::None(NoMbc::new(rom, rom_size, ram_size)),
            MbcKind::Mbc1 => MbcChip::Mbc1(Mbc1::new(rom, rom_size, ram_size)),
            MbcKind::Mbc2 => MbcChip::Mbc2(Mbc2::new(rom, rom_size)),
            MbcKind::Mbc3 => MbcChip::Mbc3(Mbc3::new(rom, rom_size, ram_size)),
            MbcKind::Mbc5 => MbcChip::Mbc5(Mbc5::new(rom, rom_size, ram_size)),
        })
    }

    fn inner(&self) -> &dyn Mbc {
        match self {
            MbcChip::None(m) => m,
            MbcChip::Mbc1(m) => m,
            MbcChip::Mbc2(m) => m,
            MbcChip::Mbc3(m) => m,
            MbcChip::Mbc5(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Mbc {
        match self {
            MbcChip::None(m) => m,
            MbcChip::Mbc1(m) => m,
            MbcChip::Mbc2(m) => m,
            MbcChip::Mbc3(m) => m,
            MbcChip::Mbc5(m) => m,
        }
    }

    pub(crate) fn load_rom_byte(&self, addr: Word) -> Byte {
        self.inner().load_rom_byte(addr)
    }

    pub(crate) fn store_rom_byte(&mut self, addr: Word, byte: Byte) {
        self.inner_mut().store_rom_byte(addr, byte)
    }

    pub(crate) fn load_ram_byte(&self, addr: Word) -> Byte {
        self.inner().load_ram_byte(addr)
    }

    pub(crate) fn store_ram_byte(&mut self, addr: Word, byte: Byte) {
        self.inner_mut().store_ram_byte(addr, byte)
    }

    pub(crate) fn save_persistent(&self) -> Vec<u8> {
        self.inner().save_persistent()
    }

    pub(crate) fn load_persistent(&mut self, data: &[u8]) {
        self.inner_mut().load_persistent(data)
    }

    /// Advances the real-time clock (MBC3 only) by the given number of whole
    /// seconds of host wall-clock time that passed since the last call.
    pub(crate) fn tick_rtc(&mut self, seconds: u64) {
        self.inner_mut().tick_rtc(seconds)
    }

    pub(crate) fn bank_state(&self) -> BankState {
        self.inner().bank_state()
    }

    pub(crate) fn restore_bank_state(&mut self, state: &BankState) {
        self.inner_mut().restore_bank_state(state)
    }
}
