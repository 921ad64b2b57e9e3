//! Save-state codec.
//!
//! A save-state is a versioned, little-endian byte image of the whole
//! machine: `b"YAGE"` (4 bytes) + version (`u32`) + body. The body is a
//! concatenation of tagged sections -- each a 2-byte type id, a 4-byte
//! length, then the `bincode`-serialized bytes of that section -- gzipped
//! unless the caller asked for a raw dump. Tagging each section with its own
//! length means a future version can append new sections (or drop one this
//! version still writes) without older code choking on it: unknown tags are
//! simply skipped using the length prefix.
//!
//! Every type stored in a section derives `Serialize`/`Deserialize` already;
//! this module only owns the envelope and the fixed section order, never the
//! internals of what it wraps.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::SaveError,
    machine::{Machine, apu::Apu, cpu::Cpu, input::InputController, interrupt::InterruptController,
        ppu::Ppu, timer::Timer},
    mbc::BankState,
    primitives::Memory,
};

const MAGIC: &[u8; 4] = b"YAGE";
const VERSION: u32 = 1;

#[derive(Serialize, serde::Deserialize)]
struct BusRam {
    wram: Memory,
    io: Memory,
    hram: Memory,
}

/// Borrowing counterpart of [`BusRam`], used only when writing a section so
/// the three RAM regions don't need to be copied first.
#[derive(Serialize)]
struct BusRamRef<'a> {
    wram: &'a Memory,
    io: &'a Memory,
    hram: &'a Memory,
}

#[derive(Serialize, serde::Deserialize)]
struct MiscState {
    enable_interrupts_countdown: u8,
    halt: bool,
    stop: bool,
    halt_bug: bool,
    locked: bool,
    dma_subcycle: u8,
    cycle_counter: u64,
}

/// Tag ids for the fixed section order from the save-state format: CPU, bus
/// RAM regions, cartridge mutable state, external RAM, timer, PPU, APU, then
/// everything else that doesn't have its own named slot in that list.
mod tag {
    pub const CPU: u16 = 1;
    pub const BUS_RAM: u16 = 2;
    pub const INTERRUPTS: u16 = 3;
    pub const CARTRIDGE_BANKS: u16 = 4;
    pub const EXTERNAL_RAM: u16 = 5;
    pub const TIMER: u16 = 6;
    pub const PPU: u16 = 7;
    pub const APU: u16 = 8;
    pub const INPUT: u16 = 9;
    pub const MISC: u16 = 10;
}

fn write_section<T: Serialize>(out: &mut Vec<u8>, tag: u16, value: &T) -> Result<(), SaveError> {
    let bytes = bincode::serialize(value)
        .map_err(|e| SaveError::Truncated(e.to_string()))?;
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&bytes);
    Ok(())
}

/// One pass over the tagged sections of a body, dispatching each to
/// `on_section`. Sections with an unrecognized tag are skipped via their
/// length prefix, which is what makes the format forward-compatible.
fn for_each_section(
    body: &[u8],
    mut on_section: impl FnMut(u16, &[u8]) -> Result<(), SaveError>,
) -> Result<(), SaveError> {
    let mut pos = 0;
    while pos < body.len() {
        if pos + 6 > body.len() {
            return Err(SaveError::Truncated("incomplete section header".into()));
        }
        let tag = u16::from_le_bytes([body[pos], body[pos + 1]]);
        let len = u32::from_le_bytes([body[pos + 2], body[pos + 3], body[pos + 4], body[pos + 5]]) as usize;
        pos += 6;

        if pos + len > body.len() {
            return Err(SaveError::Truncated("section body runs past end of buffer".into()));
        }
        on_section(tag, &body[pos..pos + len])?;
        pos += len;
    }
    Ok(())
}

fn read_section<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SaveError> {
    bincode::deserialize(bytes).map_err(|e| SaveError::Truncated(e.to_string()))
}

/// Serializes the full machine state into a save-state byte image.
///
/// When `raw` is `true`, the body is left uncompressed -- useful for
/// high-frequency rewind/debug snapshots where gzip's CPU cost outweighs the
/// smaller size. Otherwise the body is gzip-compressed.
pub(crate) fn serialize(machine: &Machine, raw: bool) -> Result<Vec<u8>, SaveError> {
    let mut body = Vec::new();

    write_section(&mut body, tag::CPU, &machine.cpu)?;
    write_section(&mut body, tag::BUS_RAM, &BusRamRef {
        wram: &machine.wram,
        io: &machine.io,
        hram: &machine.hram,
    })?;
    write_section(&mut body, tag::INTERRUPTS, &machine.interrupt_controller)?;
    write_section(&mut body, tag::CARTRIDGE_BANKS, &machine.cartridge.mbc.bank_state())?;
    write_section(&mut body, tag::EXTERNAL_RAM, &machine.cartridge.mbc.save_persistent())?;
    write_section(&mut body, tag::TIMER, &machine.timer)?;
    write_section(&mut body, tag::PPU, &machine.ppu)?;
    write_section(&mut body, tag::APU, &machine.apu)?;
    write_section(&mut body, tag::INPUT, &machine.input_controller)?;
    write_section(&mut body, tag::MISC, &MiscState {
        enable_interrupts_countdown: machine.enable_interrupts_countdown,
        halt: machine.halt,
        stop: machine.stop,
        halt_bug: machine.halt_bug,
        locked: machine.locked,
        dma_subcycle: machine.dma_subcycle,
        cycle_counter: machine.cycle_counter,
    })?;

    let body = if raw {
        body
    } else {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body).map_err(|e| SaveError::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| SaveError::Compression(e.to_string()))?
    };

    let mut out = Vec::with_capacity(4 + 4 + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Restores a machine's mutable state from a save-state byte image produced
/// by [`serialize`]. The cartridge's ROM bytes, its battery persistence and
/// bank-switching registers are restored in place rather than replacing the
/// whole `Cartridge`, since the save-state never carries raw ROM data.
pub(crate) fn deserialize(machine: &mut Machine, bytes: &[u8], raw: bool) -> Result<(), SaveError> {
    if bytes.len() < 8 || &bytes[0..4] != MAGIC {
        return Err(SaveError::Magic);
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != VERSION {
        return Err(SaveError::Version { found: version, expected: VERSION });
    }

    let compressed = &bytes[8..];
    let body = if raw {
        compressed.to_vec()
    } else {
        let mut decoder = GzDecoder::new(compressed);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|e| SaveError::Compression(e.to_string()))?;
        out
    };

    let mut cpu: Option<Cpu> = None;
    let mut bus_ram: Option<BusRam> = None;
    let mut interrupts: Option<InterruptController> = None;
    let mut bank_state: Option<BankState> = None;
    let mut external_ram: Option<Vec<u8>> = None;
    let mut timer: Option<Timer> = None;
    let mut ppu: Option<Ppu> = None;
    let mut apu: Option<Apu> = None;
    let mut input_controller: Option<InputController> = None;
    let mut misc: Option<MiscState> = None;

    for_each_section(&body, |section_tag, section_bytes| {
        match section_tag {
            tag::CPU => cpu = Some(read_section(section_bytes)?),
            tag::BUS_RAM => bus_ram = Some(read_section(section_bytes)?),
            tag::INTERRUPTS => interrupts = Some(read_section(section_bytes)?),
            tag::CARTRIDGE_BANKS => bank_state = Some(read_section(section_bytes)?),
            tag::EXTERNAL_RAM => external_ram = Some(read_section(section_bytes)?),
            tag::TIMER => timer = Some(read_section(section_bytes)?),
            tag::PPU => ppu = Some(read_section(section_bytes)?),
            tag::APU => apu = Some(read_section(section_bytes)?),
            tag::INPUT => input_controller = Some(read_section(section_bytes)?),
            tag::MISC => misc = Some(read_section(section_bytes)?),
            // Unrecognized tag: already skipped by `for_each_section` via its
            // length prefix, nothing to do here.
            _ => {}
        }
        Ok(())
    })?;

    if let Some(cpu) = cpu { machine.cpu = cpu; }
    if let Some(bus_ram) = bus_ram {
        machine.wram = bus_ram.wram;
        machine.io = bus_ram.io;
        machine.hram = bus_ram.hram;
    }
    if let Some(interrupts) = interrupts { machine.interrupt_controller = interrupts; }
    if let Some(bank_state) = bank_state { machine.cartridge.mbc.restore_bank_state(&bank_state); }
    if let Some(external_ram) = external_ram { machine.cartridge.mbc.load_persistent(&external_ram); }
    if let Some(timer) = timer { machine.timer = timer; }
    if let Some(ppu) = ppu { machine.ppu = ppu; }
    if let Some(apu) = apu {
        // The audio sink is a host-provided handle (`#[serde(skip)]`), not
        // part of the image; keep whichever one the live machine already had.
        let sink = machine.apu.take_audio_sink();
        machine.apu = apu;
        machine.apu.restore_audio_sink(sink);
    }
    if let Some(input_controller) = input_controller { machine.input_controller = input_controller; }
    if let Some(misc) = misc {
        machine.enable_interrupts_countdown = misc.enable_interrupts_countdown;
        machine.halt = misc.halt;
        machine.stop = misc.stop;
        machine.halt_bug = misc.halt_bug;
        machine.locked = misc.locked;
        machine.dma_subcycle = misc.dma_subcycle;
        machine.cycle_counter = misc.cycle_counter;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cartridge::Cartridge;

    /// A minimal valid 32 KiB, no-MBC, no-RAM ROM with a correct header
    /// checksum, good enough to build a [`Machine`] around.
    fn blank_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0147] = 0x00; // no MBC, no RAM, no battery
        rom[0x0148] = 0x00; // 32 KiB / no banking
        rom[0x0149] = 0x00; // no external RAM

        let mut checksum: u8 = 0;
        for &b in &rom[0x0134..=0x014C] {
            checksum = checksum.wrapping_sub(b).wrapping_sub(1);
        }
        rom[0x014D] = checksum;
        rom
    }

    fn fresh_machine() -> Machine {
        let cartridge = Cartridge::from_bytes(&blank_rom()).unwrap();
        Machine::new(cartridge, None)
    }

    #[test]
    fn round_trip_preserves_cpu_state() {
        let mut machine = fresh_machine();
        machine.cpu.a = crate::primitives::Byte::new(0x42);
        machine.cpu.pc = crate::primitives::Word::new(0x1234);
        machine.cycle_counter = 999_999;

        let bytes = serialize(&machine, false).unwrap();
        assert_eq!(&bytes[0..4], MAGIC);

        let mut restored = fresh_machine();
        deserialize(&mut restored, &bytes, false).unwrap();

        assert_eq!(restored.cpu.a, machine.cpu.a);
        assert_eq!(restored.cpu.pc, machine.cpu.pc);
        assert_eq!(restored.cycle_counter, machine.cycle_counter);
    }

    #[test]
    fn round_trip_raw_skips_compression() {
        let machine = fresh_machine();
        let bytes = serialize(&machine, true).unwrap();
        let mut restored = fresh_machine();
        assert!(deserialize(&mut restored, &bytes, true).is_ok());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut machine = fresh_machine();
        let bytes = vec![0u8; 16];
        assert_eq!(deserialize(&mut machine, &bytes, false), Err(SaveError::Magic));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut machine = fresh_machine();
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&999u32.to_le_bytes());
        assert_eq!(
            deserialize(&mut machine, &bytes, false),
            Err(SaveError::Version { found: 999, expected: VERSION }),
        );
    }
}
