//! A small disassembler for the debugger UI.
//!
//! This never mutates emulator state: it reads bytes the same way the CPU
//! would fetch them (bypassing the DMA read-lockout, since a debugger
//! inspecting memory mid-DMA shouldn't see `0xFF` for everything) and looks
//! up each opcode in the same [`crate::instr::INSTRUCTIONS`] /
//! [`crate::instr::PREFIXED_INSTRUCTIONS`] tables the interpreter itself
//! uses, so the reported instruction size always matches what `step` would
//! actually consume.

use crate::{
    instr::{INSTRUCTIONS, PREFIXED_INSTRUCTIONS},
    machine::Machine,
    primitives::{Byte, Word},
};

/// One disassembled instruction, as returned by [`disassemble`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembled {
    /// Address of the first byte of the instruction.
    pub address: Word,

    /// Human-readable mnemonic, with any immediate operand already
    /// substituted in (e.g. `"LD BC, 0x1234"` rather than `"LD BC, d16"`).
    pub mnemonic: String,

    /// Size of the instruction in bytes (1, 2 or 3; always 2 for the
    /// `0xCB`-prefixed set).
    pub size: u8,
}

/// Disassembles the instruction starting at `address`.
///
/// Unknown opcodes (the ones that lock the CPU when executed, see §4.10) are
/// reported as a one-byte `".db 0xNN"` pseudo-instruction rather than
/// panicking, since a debugger walking memory will run into these whether or
/// not the program ever actually reaches them.
pub fn disassemble(machine: &Machine, address: Word) -> Disassembled {
    let opcode = machine.load_byte_bypass_dma(address);

    if opcode == Byte::new(0xCB) {
        let sub_opcode = machine.load_byte_bypass_dma(address + 1u16);
        let instr = &PREFIXED_INSTRUCTIONS[sub_opcode];
        return Disassembled {
            address,
            mnemonic: instr.mnemonic.to_string(),
            size: instr.len,
        };
    }

    match &INSTRUCTIONS[opcode] {
        None => Disassembled {
            address,
            mnemonic: format!(".db {:#04x}", opcode.get()),
            size: 1,
        },
        Some(instr) => Disassembled {
            address,
            mnemonic: render_operand(machine, address, instr.mnemonic, instr.len),
            size: instr.len,
        },
    }
}

/// Substitutes the one placeholder a mnemonic template can contain (`d8`,
/// `d16`, `a8`, `a16` or `r8`) with the actual operand bytes found right
/// after the opcode.
fn render_operand(machine: &Machine, address: Word, template: &str, len: u8) -> String {
    match len {
        2 => {
            let byte = machine.load_byte_bypass_dma(address + 1u16);
            if template.contains("r8") {
                // `JR`'s offset is relative to the address of the *next*
                // instruction, matching how the CPU interpreter applies it.
                let target = Word::new(address.get().wrapping_add(2)) + (byte.get() as i8);
                template.replace("r8", &format!("{:#06x}", target.get()))
            } else if template.contains("a8") {
                template.replace("a8", &format!("{:#04x}", byte.get()))
            } else {
                template.replace("d8", &format!("{:#04x}", byte.get()))
            }
        }
        3 => {
            let lsb = machine.load_byte_bypass_dma(address + 1u16);
            let msb = machine.load_byte_bypass_dma(address + 2u16);
            let word = Word::from_bytes(lsb, msb).get();
            if template.contains("a16") {
                template.replace("a16", &format!("{:#06x}", word))
            } else {
                template.replace("d16", &format!("{:#06x}", word))
            }
        }
        _ => template.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cartridge::Cartridge;

    fn blank_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0147] = 0x00;
        rom[0x0148] = 0x00;
        rom[0x0149] = 0x00;
        let mut checksum: u8 = 0;
        for &b in &rom[0x0134..=0x014C] {
            checksum = checksum.wrapping_sub(b).wrapping_sub(1);
        }
        rom[0x014D] = checksum;
        rom
    }

    fn machine_with_code(bytes: &[u8]) -> Machine {
        let mut rom = blank_rom();
        rom[0x0100..0x0100 + bytes.len()].copy_from_slice(bytes);
        let cartridge = Cartridge::from_bytes(&rom).unwrap();
        Machine::new(cartridge, None)
    }

    #[test]
    fn disassembles_nop() {
        let machine = machine_with_code(&[0x00]);
        let out = disassemble(&machine, Word::new(0x0100));
        assert_eq!(out.mnemonic, "NOP");
        assert_eq!(out.size, 1);
    }

    #[test]
    fn disassembles_immediate_d16() {
        let machine = machine_with_code(&[0x01, 0x34, 0x12]); // LD BC, 0x1234
        let out = disassemble(&machine, Word::new(0x0100));
        assert_eq!(out.mnemonic, "LD BC, 0x1234");
        assert_eq!(out.size, 3);
    }

    #[test]
    fn disassembles_relative_jump_as_absolute_target() {
        let machine = machine_with_code(&[0x18, 0x05]); // JR +5
        let out = disassemble(&machine, Word::new(0x0100));
        // target = 0x0100 + 2 (instruction length) + 5
        assert_eq!(out.mnemonic, "JR 0x0107");
        assert_eq!(out.size, 2);
    }

    #[test]
    fn disassembles_prefixed_instruction() {
        let machine = machine_with_code(&[0xCB, 0x7C]); // BIT 7, H
        let out = disassemble(&machine, Word::new(0x0100));
        assert_eq!(out.mnemonic, "BIT 7, H");
        assert_eq!(out.size, 2);
    }

    #[test]
    fn reports_unknown_opcode_without_panicking() {
        let machine = machine_with_code(&[0xD3]); // invalid opcode
        let out = disassemble(&machine, Word::new(0x0100));
        assert_eq!(out.mnemonic, ".db 0xd3");
        assert_eq!(out.size, 1);
    }
}
