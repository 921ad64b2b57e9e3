use std::cmp::max;

use crate::{
    cartridge::RomSize,
    primitives::{Byte, Word},
};
use super::{Mbc, BankState};

/// MBC2.
///
/// Similar to MBC1 but much simpler: only 4 bits of ROM bank (up to 256KiB of
/// ROM) and a tiny, built-in 512x4-bit RAM chip (no external RAM banking at
/// all). The RAM-enable and ROM-bank registers are not mapped by two
/// different address ranges like on MBC1/3/5; instead they alias the same
/// `0x0000..0x4000` window, distinguished by bit 8 of the address.
pub(crate) struct Mbc2 {
    rom: Box<[Byte]>,

    /// 512 entries, but only the low nibble of each byte is meaningful.
    ram: Box<[Byte]>,

    rom_bank: u8,
    ram_enabled: bool,
}

impl Mbc2 {
    pub(crate) fn new(data: &[u8], rom_size: RomSize) -> Self {
        assert!(rom_size <= RomSize::Banks16, "More than 16 banks, but only MBC2!");
        assert!(
            rom_size.len() == data.len(),
            "Length of cartridge doesn't match length specified in ROM size header",
        );

        let rom: Vec<_> = data.iter().cloned().map(Byte::new).collect();

        Self {
            rom: rom.into_boxed_slice(),
            ram: vec![Byte::zero(); 512].into_boxed_slice(),
            rom_bank: 1,
            ram_enabled: false,
        }
    }
}

impl Mbc for Mbc2 {
    fn load_rom_byte(&self, addr: Word) -> Byte {
        match addr.get() {
            0x0000..0x4000 => self.rom[addr.get() as usize],

            0x4000..0x8000 => {
                let bank_offset = self.rom_bank as usize * 0x4000;
                let relative_addr = addr.get() as usize - 0x4000;
                self.rom.get(bank_offset + relative_addr)
                    .cloned()
                    .unwrap_or(Byte::new(0xFF))
            }

            _ => unreachable!(),
        }
    }

    fn store_rom_byte(&mut self, addr: Word, byte: Byte) {
        // Bit 8 of the address distinguishes the RAM-enable register from the
        // ROM-bank register; both live in `0x0000..0x4000`.
        if addr.get() & 0x0100 == 0 {
            self.ram_enabled = byte.get() & 0x0F == 0x0A;
        } else {
            self.rom_bank = max(byte.get() & 0x0F, 1);
        }
    }

    fn load_ram_byte(&self, addr: Word) -> Byte {
        if !self.ram_enabled {
            return Byte::new(0xFF);
        }

        // Only 512 entries exist; the address is effectively mirrored every
        // 512 bytes across the whole `0xA000..0xC000` window.
        let idx = addr.get() as usize % 512;
        // Only the low nibble is wired up; the upper nibble always reads 1s.
        self.ram[idx].map(|b| b | 0xF0)
    }

    fn store_ram_byte(&mut self, addr: Word, byte: Byte) {
        if !self.ram_enabled {
            return;
        }

        let idx = addr.get() as usize % 512;
        self.ram[idx] = byte.map(|b| b & 0x0F);
    }

    fn save_persistent(&self) -> Vec<u8> {
        self.ram.iter().map(Byte::get).collect()
    }

    fn load_persistent(&mut self, data: &[u8]) {
        for (dst, &src) in self.ram.iter_mut().zip(data) {
            *dst = Byte::new(src & 0x0F);
        }
    }

    fn bank_state(&self) -> BankState {
        BankState::Mbc2 { rom_bank: self.rom_bank, ram_enabled: self.ram_enabled }
    }

    fn restore_bank_state(&mut self, state: &BankState) {
        if let BankState::Mbc2 { rom_bank, ram_enabled } = *state {
            self.rom_bank = rom_bank;
            self.ram_enabled = ram_enabled;
        }
    }
}
