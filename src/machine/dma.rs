//! Contains code to actually execute instructions.

use super::Machine;
use crate::{
    primitives::{Byte, Word},
    log::*,
};


impl Machine {
    /// Advances the OAM DMA transfer, if any, by one t-cycle. A whole
    /// transfer takes 640 t-cycles (160 bytes, 4 t-cycles per byte); the
    /// real hardware copies the byte on the fourth t-cycle of each group, so
    /// we only actually perform the copy when `dma_subcycle` wraps back to 0.
    pub(crate) fn dma_step(&mut self) {
        if let Some(src_addr) = self.ppu.oam_dma_status {
            self.dma_subcycle = (self.dma_subcycle + 1) % 4;
            if self.dma_subcycle != 0 {
                return;
            }

            let lsb = src_addr.into_bytes().0;
            let dst_addr = Word::new(0xFE00) + lsb;
            let b = self.load_byte_bypass_dma(src_addr);
            self.ppu.store_oam_byte(dst_addr, b);

            // Advance the source address. Once we've copied byte 0x9F (the
            // 160th and last byte), the transfer is done.
            self.ppu.oam_dma_status = if lsb == Byte::new(0x9F) {
                trace!("DMA finished");
                None
            } else {
                Some(src_addr + 1u8)
            }
        } else {
            self.dma_subcycle = 0;
        }
    }
}
