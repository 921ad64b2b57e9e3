//! Everything related to the cartridge and its header.

use std::fmt;

use crate::{
    error::LoadError,
    mbc::{Mbc, MbcChip},
    primitives::{Byte, Word},
};


/// Specifies how this ROM works with the CGB. Stored at `0x0143`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgbMode {
    /// Only CGB is supported. Value `0xC0`.
    CgbOnly,

    /// DMG and CGB are supported. Value `0x80`.
    BothSupported,

    /// CGB features are not supported. Value: bit 7 is not set.
    NonCgb,
}

impl CgbMode {
    /// Parses the CGB mode from the given byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0xC0 => CgbMode::CgbOnly,
            0x80 => CgbMode::BothSupported,
            _ => CgbMode::NonCgb,
        }
    }
}

/// The memory bank controller family a cartridge declares in its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// The type of a cartridge, as declared at `0x0147`. This defines whether a
/// cartridge has a memory bank controller, a battery, external RAM, or a real
/// time clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartridgeType {
    pub mbc: MbcKind,
    pub has_ram: bool,
    pub has_battery: bool,
    pub has_rtc: bool,
}

impl CartridgeType {
    /// Parses the cartridge type from the given byte.
    pub fn from_byte(byte: u8) -> Result<Self, LoadError> {
        use MbcKind::*;

        let (mbc, has_ram, has_battery, has_rtc) = match byte {
            0x00 => (None, false, false, false),
            0x08 => (None, true, false, false),
            0x09 => (None, true, true, false),
            0x01 => (Mbc1, false, false, false),
            0x02 => (Mbc1, true, false, false),
            0x03 => (Mbc1, true, true, false),
            0x05 => (Mbc2, false, false, false),
            0x06 => (Mbc2, false, true, false),
            0x0F => (Mbc3, false, true, true),
            0x10 => (Mbc3, true, true, true),
            0x11 => (Mbc3, false, false, false),
            0x12 => (Mbc3, true, false, false),
            0x13 => (Mbc3, true, true, false),
            0x19 => (Mbc5, false, false, false),
            0x1A => (Mbc5, true, false, false),
            0x1B => (Mbc5, true, true, false),
            0x1C => (Mbc5, false, false, false),
            0x1D => (Mbc5, true, false, false),
            0x1E => (Mbc5, true, true, false),
            _ => return Err(LoadError::UnknownMbc(byte)),
        };

        Ok(Self { mbc, has_ram, has_battery, has_rtc })
    }
}

/// Size of cartridge's ROM. Defined by the number of banks (each 16 KiB).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RomSize {
    NoBanking,
    Banks4,
    Banks8,
    Banks16,
    Banks32,
    Banks64,
    Banks128,
    Banks256,
    Banks512,
    Banks72,
    Banks80,
    Banks96,
}

impl RomSize {
    /// Parses the ROM size from the given byte.
    pub fn from_byte(byte: u8) -> Result<Self, LoadError> {
        Ok(match byte {
            0x00 => RomSize::NoBanking,
            0x01 => RomSize::Banks4,
            0x02 => RomSize::Banks8,
            0x03 => RomSize::Banks16,
            0x04 => RomSize::Banks32,
            0x05 => RomSize::Banks64,
            0x06 => RomSize::Banks128,
            0x07 => RomSize::Banks256,
            0x08 => RomSize::Banks512,
            0x52 => RomSize::Banks72,
            0x53 => RomSize::Banks80,
            0x54 => RomSize::Banks96,
            _ => return Err(LoadError::InvalidRomSize { expected: 0, actual: byte as usize }),
        })
    }

    /// Returns the size of the ROM in bytes.
    pub fn len(&self) -> usize {
        match self {
            RomSize::NoBanking => 2 * 0x4000,
            RomSize::Banks4 => 4 * 0x4000,
            RomSize::Banks8 => 8 * 0x4000,
            RomSize::Banks16 => 16 * 0x4000,
            RomSize::Banks32 => 32 * 0x4000,
            RomSize::Banks64 => 64 * 0x4000,
            RomSize::Banks128 => 128 * 0x4000,
            RomSize::Banks256 => 256 * 0x4000,
            RomSize::Banks512 => 512 * 0x4000,
            RomSize::Banks72 => 72 * 0x4000,
            RomSize::Banks80 => 80 * 0x4000,
            RomSize::Banks96 => 96 * 0x4000,
        }
    }
}

/// Size of a cartridge's external RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RamSize {
    None,
    Kb2,
    Kb8,
    Kb32,
    Kb64,
    Kb128,
}

impl RamSize {
    /// Parses the RAM size from the given byte.
    pub fn from_byte(byte: u8) -> Result<Self, LoadError> {
        Ok(match byte {
            0x00 => RamSize::None,
            0x01 => RamSize::Kb2,
            0x02 => RamSize::Kb8,
            0x03 => RamSize::Kb32,
            0x04 => RamSize::Kb128,
            0x05 => RamSize::Kb64,
            _ => return Err(LoadError::InvalidRamSize(byte)),
        })
    }

    /// Returns the size of the RAM in bytes.
    pub fn len(&self) -> usize {
        match self {
            RamSize::None => 0,
            RamSize::Kb2 => 0x800,
            RamSize::Kb8 => 0x2000,
            RamSize::Kb32 => 4 * 0x2000,
            RamSize::Kb64 => 8 * 0x2000,
            RamSize::Kb128 => 16 * 0x2000,
        }
    }
}

/// A loaded cartridge.
///
/// This contains the memory bank controller (which owns the ROM and RAM data)
/// and a number of fields extracted from the header for introspection.
pub struct Cartridge {
    pub(crate) mbc: MbcChip,
    title: String,
    cgb_mode: CgbMode,
    cartridge_type: CartridgeType,
    rom_size: RomSize,
    ram_size: RamSize,
}

impl Cartridge {
    /// Parses the header of `bytes`, validates it, and constructs the
    /// appropriate memory bank controller around the data.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() < 0x150 {
            return Err(LoadError::InvalidRomSize { expected: 0x150, actual: bytes.len() });
        }

        // Detect the name length by testing if the last 4 bytes contain a 0.
        let man_code = &bytes[0x013F..=0x0142];
        let max_title_len = if man_code.iter().any(|b| *b == 0x00) { 15 } else { 11 };

        let title_len = bytes[0x0134..0x0134 + max_title_len]
            .iter()
            .position(|b| *b == 0x00)
            .unwrap_or(max_title_len);
        let title = String::from_utf8_lossy(&bytes[0x0134..0x0134 + title_len]).into_owned();

        let cgb_mode = CgbMode::from_byte(bytes[0x0143]);
        let cartridge_type = CartridgeType::from_byte(bytes[0x0147])?;
        let rom_size = RomSize::from_byte(bytes[0x0148])?;
        let ram_size = RamSize::from_byte(bytes[0x0149])?;

        if rom_size.len() != bytes.len() {
            return Err(LoadError::InvalidRomSize { expected: rom_size.len(), actual: bytes.len() });
        }

        // Header checksum: the sum (with the usual 8-bit wraparound and an
        // extra `- 1` per byte) of bytes 0x0134..=0x014C has to equal the
        // byte stored at 0x014D.
        let mut checksum: u8 = 0;
        for &b in &bytes[0x0134..=0x014C] {
            checksum = checksum.wrapping_sub(b).wrapping_sub(1);
        }
        let expected = bytes[0x014D];
        if checksum != expected {
            return Err(LoadError::HeaderChecksum { expected, actual: checksum });
        }

        let mbc = MbcChip::new(cartridge_type, bytes, rom_size, ram_size)?;

        Ok(Self {
            mbc,
            title,
            cgb_mode,
            cartridge_type,
            rom_size,
            ram_size,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn cgb_mode(&self) -> CgbMode {
        self.cgb_mode
    }

    pub fn cartridge_type(&self) -> CartridgeType {
        self.cartridge_type
    }

    pub fn rom_size(&self) -> RomSize {
        self.rom_size
    }

    pub fn ram_size(&self) -> RamSize {
        self.ram_size
    }

    /// Returns the battery-backed save data (RAM contents plus, for MBC3
    /// cartridges, the RTC state) so the host can persist it between runs.
    pub fn persistent_memory(&self) -> Option<Vec<u8>> {
        if !self.cartridge_type.has_battery {
            return None;
        }
        Some(self.mbc.save_persistent())
    }

    /// Restores battery-backed save data previously returned by
    /// [`Cartridge::persistent_memory`].
    pub fn load_persistent_memory(&mut self, data: &[u8]) {
        self.mbc.load_persistent(data);
    }

    /// Load a [`Byte`] from the cartridge ROM area (`0x0000..0x8000`).
    pub fn load_byte(&self, addr: Word) -> Byte {
        self.mbc.load_rom_byte(addr)
    }
}

// Manual implementation to omit printing the full memory.
impl fmt::Debug for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Cartridge")
            .field("title", &self.title)
            .field("cgb_mode", &self.cgb_mode)
            .field("cartridge_type", &self.cartridge_type)
            .field("rom_size", &self.rom_size)
            .field("ram_size", &self.ram_size)
            .finish()
    }
}
