//! Everything related to the pixel processing unit (PPU).

use std::{
    fmt,
    ops::Range,
    collections::VecDeque,
};

use serde::{Serialize, Deserialize};

use crate::{
    SCREEN_HEIGHT, SCREEN_WIDTH,
    log::*,
    primitives::{Byte, Word, Memory, PixelColor},
};
use super::interrupt::{InterruptController, Interrupt};



/// Number of t-cycles per line.
const CYCLES_PER_LINE: u16 = 456;

/// Number of t-cycles spent in OAM search (mode 2), at the start of each
/// visible line.
const OAM_SEARCH_CYCLES: u16 = 80;

/// Number of lines including the "V-Blank lines". After drawing the 144 lines
/// on the LCD, the PPU has a V-Blank phase which lasts exactly
/// `10 * CYCLES_PER_LINE`. These are the counted as lines, too, despite no
/// lines being drawn.
const NUM_LINES: u8 = 154;

/// The number of tiles in a background or window map in each dimension.
/// Meaning: the background map is 32 * 32 tiles large.
const MAP_SIZE: u8 = 32;

/// Approximate cost (in t-cycles) of fetching one sprite's pixel data and
/// merging it into the sprite FIFO overlay. Real hardware varies this
/// between 6 and 11 depending on alignment; we use a fixed cost.
const SPRITE_FETCH_CYCLES: u8 = 6;


/// The (public) registers inside of the PPU.
#[derive(Serialize, Deserialize)]
pub struct PpuRegisters {
    /// `0xFF40`: LCD control. All bits can be written.
    ///
    /// Each bit is used for a different purpose:
    /// - 7: LCD display enable (0=Off, 1=On)
    /// - 6: window tile map select (0=9800-9BFF, 1=9C00-9FFF)
    /// - 5: window display enable (0=Off, 1=On)
    /// - 4: background and window tile data select (0=8800-97FF, 1=8000-8FFF)
    /// - 3: background tile map select (0=9800-9BFF, 1=9C00-9FFF)
    /// - 2: sprite size (0=8x8, 1=8x16)
    /// - 1: sprite display enable (0=Off, 1=On)
    /// - 0: background/window enable (DMG: 0 blanks bg+window to color 0)
    pub lcd_control: Byte,

    /// `0xFF41`: LCD/PPU status. Bits 3, 4, 5 and 6 can be written.
    ///
    /// Purpose of each bit:
    /// - 7: always 1, writes are ignored.
    /// - 6: LYC=LY coincidence interrupt (1=enabled)
    /// - 5: OAM search interrupt (1=enabled)
    /// - 4: V-Blank interrupt (1=enabled)
    /// - 3: H-Blank interrupt (1=enabled)
    /// - 2: coincidence flag (0=LYC!=LY, 1=LYC==LY). Read only.
    /// - 1 & 0: current PPU mode. Modes 0 -- 3, see [`Mode`] for more
    ///   information. Read only.
    pub status: Byte,

    /// `0xFF42`: y scroll position of background.
    pub scroll_bg_y: Byte,

    /// `0xFF43`: x scroll position of background.
    pub scroll_bg_x: Byte,

    /// `0xFF44`: LY. Stores the line we are currently drawing (including
    /// V-blank lines). This value is always between 0 and 154 (exclusive).
    /// Read only.
    pub current_line: Byte,

    /// `0xFF45`: LY compare. Is compared to `current_line` all the time. If
    /// both values are equal, things happen (see `status` register).
    pub lyc: Byte,

    /// `0xFF46`: OAM DMA transfer start address register. This value times
    /// `0x100` is the start address from which OAM data is read during the the
    /// DMA transfer. Writing to this triggers DMA.
    pub oam_dma_start: Byte,

    /// `0xFF47`: background palette data.
    pub background_palette: Byte,

    /// `0xFF48`: sprite palette 0 data.
    pub sprite_palette_0: Byte,

    /// `0xFF49`: sprite palette 1 data.
    pub sprite_palette_1: Byte,

    /// `0xFF4A`: Y window position
    pub scroll_win_y: Byte,

    /// `0xFF4B`: X window position
    pub scroll_win_x: Byte,
}

impl PpuRegisters {
    fn new() -> Self {
        Self {
            lcd_control: Byte::zero(),
            status: Byte::zero(),
            scroll_bg_y: Byte::zero(),
            scroll_bg_x: Byte::zero(),
            current_line: Byte::zero(),
            lyc: Byte::zero(),
            oam_dma_start: Byte::zero(),
            background_palette: Byte::zero(),
            sprite_palette_0: Byte::zero(),
            sprite_palette_1: Byte::zero(),
            scroll_win_y: Byte::zero(),
            scroll_win_x: Byte::zero(),
        }
    }

    /// Returns bit 7 of the LCD control register which determines if the LCD
    /// is enabled.
    pub fn is_lcd_enabled(&self) -> bool {
        self.lcd_control.get() & 0b1000_0000 != 0
    }

    /// Returns bit 0 of the LCD control register. On DMG, when this is
    /// unset, the background and window are blanked to color 0 and the
    /// background-priority bit of sprites is ignored.
    pub fn is_bg_and_window_enabled(&self) -> bool {
        self.lcd_control.get() & 0b0000_0001 != 0
    }

    /// Returns bit 5 of the LCD control register which determines if the
    /// window layer is enabled.
    pub fn is_window_enabled(&self) -> bool {
        self.lcd_control.get() & 0b0010_0000 != 0
    }

    /// Returns bit 1 of the LCD control register which determines if sprite
    /// rendering is enabled.
    pub fn are_sprites_enabled(&self) -> bool {
        self.lcd_control.get() & 0b0000_0010 != 0
    }

    /// Returns the height of all sprites. This can either be 8 or 16,
    /// controlled by bit 3 of the LCD control register.
    pub fn sprite_height(&self) -> u8 {
        if self.lcd_control.get() & 0b0000_0100 == 0 {
            8
        } else {
            16
        }
    }

    /// Returns the memory area of the tile map for the window layer (as
    /// determined by LCD control bit 6).
    pub fn window_tile_map_address(&self) -> TileMapArea {
        if self.lcd_control.get() & 0b0100_0000 == 0 {
            TileMapArea::Low
        } else {
            TileMapArea::High
        }
    }

    /// Returns the memory area of the tile map for the background layer (as
    /// determined by LCD control bit 3).
    pub fn bg_tile_map_address(&self) -> TileMapArea {
        if self.lcd_control.get() & 0b0000_1000 == 0 {
            TileMapArea::Low
        } else {
            TileMapArea::High
        }
    }

    /// Returns the memory area of the tile data for the background and window
    /// layer (as determined by LCD control bit 4).
    pub fn tile_data_address(&self) -> TileDataArea {
        // Yes, 0 means the higher address range.
        if self.lcd_control.get() & 0b0001_0000 == 0 {
            TileDataArea::High
        } else {
            TileDataArea::Low
        }
    }

    /// Returns if large sprites (8x16) are enabled (instead of 8x8 sprites).
    /// This is determined by bit 2 of the LCD control register.
    pub fn large_sprites_enabled(&self) -> bool {
        self.lcd_control.get() & 0b0000_0100 != 0
    }

    /// Returns `true` if the LY=LYC coincidence interrupt is enabled (as
    /// determined by bit 6 of the LCD stat register).
    pub fn coincidence_interrupt(&self) -> bool {
        self.status.get() & 0b0100_0000 != 0
    }

    /// Returns `true` if the OAM search interrupt is enabled (as determined by
    /// bit 5 of the LCD stat register).
    pub fn oam_search_interrupt(&self) -> bool {
        self.status.get() & 0b0010_0000 != 0
    }

    /// Returns `true` if the V-Blank interrupt is enabled (as determined by
    /// bit 4 of the LCD stat register). Note that this interrupt is part of
    /// the 0x48 LCD status interrupt. There is another V-Blank interrupt
    /// (0x40) that is independent from this.
    pub fn vblank_interrupt(&self) -> bool {
        self.status.get() & 0b0001_0000 != 0
    }

    /// Returns `true` if the H-Blank interrupt is enabled (as determined by
    /// bit 3 of the LCD stat register).
    pub fn hblank_interrupt(&self) -> bool {
        self.status.get() & 0b0000_1000 != 0
    }

    /// Returns the mode of the PPU (as determined by bits 1 & 0 from the LCD
    /// stat register). See [`Mode`] for more information.
    pub fn mode(&self) -> Mode {
        match self.status.get() & 0b11 {
            0 => Mode::HBlank,
            1 => Mode::VBlank,
            2 => Mode::OamSearch,
            3 => Mode::PixelTransfer,
            _ => unreachable!(),
        }
    }

    /// Sets the given mode (updates bits 1 & 0 in the LCD stat register).
    fn set_mode(&mut self, mode: Mode) {
        let v = mode as u8;
        self.status = self.status.map(|b| (b & 0b1111_1100) | v);
    }

    fn set_coincidence_flag(&mut self, v: bool) {
        self.status = self.status.map(|b| {
            if v {
                b | 0b0000_0100
            } else {
                b & 0b1111_1011
            }
        });
    }
}

/// The memory area in VRAM where a tile map is stored (the index into the tile
/// data array).
#[derive(Clone, Copy, Serialize, Deserialize)]
pub enum TileMapArea {
    /// Stored in `0x9800` - `0x9BFF`.
    Low,
    /// Stored in `0x9C00` - `0x9FFF`.
    High,
}

impl TileMapArea {
    /// Returns the memory range (absolute addresses).
    pub fn absolute(&self) -> Range<Word> {
        match self {
            TileMapArea::Low  => Word::new(0x9800)..Word::new(0x9C00),
            TileMapArea::High => Word::new(0x9C00)..Word::new(0xA000),
        }
    }

    /// Returns the start of this memory area, relative to the beginning of
    /// VRAM.
    fn start(&self) -> Word {
        match self {
            TileMapArea::Low  => Word::new(0x1800),
            TileMapArea::High => Word::new(0x1C00),
        }
    }
}

impl fmt::Display for TileMapArea {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let range = self.absolute();
        write!(f, "{:04x}-{:04x}", range.start.get(), range.end.get() - 1)
    }
}

/// The memory area in VRAM where tile data is stored (the actual pixel data
/// for the 8x8 tiles).
#[derive(Clone, Copy, Serialize, Deserialize)]
pub enum TileDataArea {
    /// Stored in `0x8000` - `0x8FFF`.
    Low,
    /// Stored in `0x8800` - `0x97FF`.
    High,
}

impl TileDataArea {
    /// Returns the memory range (absolute addresses).
    pub fn absolute(&self) -> Range<Word> {
        match self {
            TileDataArea::Low  => Word::new(0x8000)..Word::new(0x9000),
            TileDataArea::High => Word::new(0x9000)..Word::new(0x9800),
        }
    }

    /// Returns the address (relative to the beginning of VRAM) of the tile
    /// with the given index.
    ///
    /// This implements the difference between the two addressing modes. If
    /// `self` is `High`, the given byte is used as signed offset from `0x9000`
    /// as base pointer.
    fn index(&self, idx: Byte) -> Word {
        match self {
            TileDataArea::Low => {
                // Simple indexing: we start at the very beginning of the VRAM
                // and each tile needs 16 byte.
                Word::new(idx.get() as u16 * 16)
            }
            TileDataArea::High => {
                // In 8800 addressing mode, things are more complicated: we use
                // `0x9000` as base address and the `idx` is now used as signed
                // index.
                let offset = ((idx.get() as i8) as i16) * 16;
                Word::new((0x1000 + offset) as u16)
            }
        }
    }
}

impl fmt::Display for TileDataArea {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let range = self.absolute();
        write!(f, "{:04x}-{:04x}", range.start.get(), range.end.get() - 1)
    }
}

/// Which sub-step of the tile fetcher we're at. Each step takes two t-cycles.
#[derive(Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
enum FetchStep {
    Tile,
    DataLow,
    DataHigh,
    Push,
}

/// The background/window pixel fetcher's state.
#[derive(Serialize, Deserialize)]
struct Fetcher {
    step: FetchStep,
    /// Each `step` takes two t-cycles; this flags the second one.
    second_half: bool,
    /// Tile column, in the 32x32 tile map, of the tile currently fetched.
    tile_x: u8,
    using_window: bool,
    tile_id: Byte,
    data_lo: Byte,
    data_hi: Byte,
}

impl Fetcher {
    fn for_background(start_tile_x: u8) -> Self {
        Self {
            step: FetchStep::Tile,
            second_half: false,
            tile_x: start_tile_x,
            using_window: false,
            tile_id: Byte::zero(),
            data_lo: Byte::zero(),
            data_hi: Byte::zero(),
        }
    }

    fn for_window() -> Self {
        Self { using_window: true, ..Self::for_background(0) }
    }
}

/// A pixel fetched for a sprite, waiting to be mixed with the background.
#[derive(Clone, Copy)]
#[derive(Serialize, Deserialize)]
struct SpritePixel {
    /// Color index, 1..=3 (0 is never stored: transparent pixels don't
    /// overwrite the overlay).
    color: u8,
    uses_palette_1: bool,
    /// OBJ-to-BG priority bit: if set, the sprite is hidden behind any
    /// non-zero background color.
    bg_priority: bool,
}

/// An in-flight sprite fetch; blocks the background fetcher for its duration.
#[derive(Serialize, Deserialize)]
struct SpriteFetch {
    sprite: Sprite,
    cycles_left: u8,
}

/// Pixel processing unit.
#[derive(Serialize, Deserialize)]
pub struct Ppu {
    pub vram: Memory,
    pub oam: Memory,

    /// How many t-cycles did we already spend in this line?
    cycle_in_line: u16,

    sprites_on_line: [Sprite; 10],
    sprite_fetched: [bool; 10],

    /// If an DMA is ongoing, this stores the address of the next source byte.
    pub(crate) oam_dma_status: Option<Word>,

    /// All registers. If you want to read registers, use the `regs()` method
    /// instead. That way, we can avoid accidental mutation of any registers.
    registers: PpuRegisters,

    /// The internal STAT-interrupt line (OR of all four enabled conditions).
    /// IF.STAT is only requested on a 0 -> 1 transition of this line.
    stat_line: bool,

    /// Number of lines the window has actually been drawn on this frame,
    /// used as the window's own Y coordinate (independent of LY/WY once
    /// started).
    window_line_counter: u8,
    window_triggered_this_line: bool,

    fetcher: Fetcher,
    bg_fifo: VecDeque<u8>,
    sprite_fetch: Option<SpriteFetch>,
    sprite_overlay: [Option<SpritePixel>; SCREEN_WIDTH],

    /// Number of background pixels still to discard for SCX-mod-8 fine
    /// scrolling, at the start of the line.
    discard: u8,

    /// Pixel column currently being produced, 0..SCREEN_WIDTH.
    lx: u8,

    /// The most recently completed frame, one row after another.
    framebuffer: Box<[PixelColor]>,

    /// Set for the one t-cycle a new frame's V-Blank starts; consumed by
    /// whoever drives the machine to know when to hand back the framebuffer.
    pub(crate) frame_ready: bool,
}


impl Ppu {
    pub(crate) fn new() -> Self {
        Self {
            vram: Memory::zeroed(Word::new(0x2000)),
            oam: Memory::zeroed(Word::new(0xA0)),

            cycle_in_line: 0,

            sprites_on_line: [Sprite::invisible(); 10],
            sprite_fetched: [false; 10],

            oam_dma_status: None,
            registers: PpuRegisters::new(),

            stat_line: false,
            window_line_counter: 0,
            window_triggered_this_line: false,

            fetcher: Fetcher::for_background(0),
            bg_fifo: VecDeque::with_capacity(16),
            sprite_fetch: None,
            sprite_overlay: [None; SCREEN_WIDTH],

            discard: 0,
            lx: 0,

            framebuffer: vec![PixelColor::blank(); SCREEN_WIDTH * SCREEN_HEIGHT].into_boxed_slice(),
            frame_ready: false,
        }
    }

    /// Returns the framebuffer of the most recently completed frame, one row
    /// of `SCREEN_WIDTH` pixels after another.
    pub fn framebuffer(&self) -> &[PixelColor] {
        &self.framebuffer
    }

    /// Loads a byte from VRAM at the given (absolute!) address.
    ///
    /// The given address has to be in `0x8000..0xA000`, otherwise this
    /// function panics!
    ///
    /// This function behaves like the real VRAM. Meaning: during pixel
    /// transfer, this returns garbage.
    pub(crate) fn load_vram_byte(&self, addr: Word) -> Byte {
        match self.regs().mode() {
            Mode::PixelTransfer if self.regs().is_lcd_enabled() => Byte::new(0xff),
            _ => self.vram[addr - 0x8000],
        }
    }

    /// Stores a byte to VRAM at the given (absolute!) address.
    ///
    /// The given address has to be in `0x8000..0xA000`, otherwise this
    /// function panics!
    ///
    /// This function behaves like the real VRAM. Meaning: during pixel
    /// transfer, this write is lost (does nothing).
    pub(crate) fn store_vram_byte(&mut self, addr: Word, byte: Byte) {
        match self.regs().mode() {
            Mode::PixelTransfer if self.regs().is_lcd_enabled() => {},
            _ => self.vram[addr - 0x8000] = byte,
        }
    }

    /// Loads a byte from OAM at the given (absolute!) address.
    ///
    /// The given address has to be in `0xFE00..0xFEA0`, otherwise this
    /// function panics!
    ///
    /// This function behaves like the real OAM. Meaning: during pixel
    /// transfer and OAM search, this returns garbage.
    pub(crate) fn load_oam_byte(&self, addr: Word) -> Byte {
        match self.regs().mode() {
            Mode::PixelTransfer | Mode::OamSearch
                if self.regs().is_lcd_enabled() => Byte::new(0xff),
            _ => self.oam[addr - 0xFE00],
        }
    }

    /// Stores a byte to OAM at the given (absolute!) address.
    ///
    /// The given address has to be in `0xFE00..0xFEA0`, otherwise this
    /// function panics!
    ///
    /// This function behaves like the real OAM. Meaning: during pixel
    /// transfer and OAM search, this write is lost (does nothing).
    pub(crate) fn store_oam_byte(&mut self, addr: Word, byte: Byte) {
        match self.regs().mode() {
            Mode::PixelTransfer | Mode::OamSearch if self.regs().is_lcd_enabled() => {},
            _ => self.oam[addr - 0xFE00] = byte,
        }
    }

    /// Loads a byte from the IO port range `0xFF40..0xFF4B`.
    ///
    /// The given address has to be in `0xFF40..0xFF4B`, otherwise this
    /// function panics!
    pub(crate) fn load_io_byte(&self, addr: Word) -> Byte {
        match addr.get() {
            0xFF40 => self.regs().lcd_control,
            0xFF41 => self.regs().status.map(|mut b| {
                // Bit 7 always returns 1.
                b |= 0b1000_0000;
                if !self.regs().is_lcd_enabled() {
                    // Bit 0, 1 and 2 return 0 when LCD is off.
                    b &= 0b1111_1000;
                }

                b
            }),
            0xFF42 => self.regs().scroll_bg_y,
            0xFF43 => self.regs().scroll_bg_x,
            0xFF44 => self.regs().current_line,
            0xFF45 => self.regs().lyc,
            0xFF46 => self.regs().oam_dma_start,
            0xFF47 => self.regs().background_palette,
            0xFF48 => self.regs().sprite_palette_0,
            0xFF49 => self.regs().sprite_palette_1,
            0xFF4A => self.regs().scroll_win_y,
            0xFF4B => self.regs().scroll_win_x,
            _ => panic!("called `Ppu::load_io_byte` with invalid address"),
        }
    }

    /// Stores a byte in the IO port range `0xFF40..0xFF4B`.
    ///
    /// The given address has to be in `0xFF40..0xFF4B`, otherwise this
    /// function panics!
    pub(crate) fn store_io_byte(&mut self, addr: Word, byte: Byte) {
        match addr.get() {
            0xFF40 => {
                let was_enabled = self.regs().is_lcd_enabled();
                self.registers.lcd_control = byte;
                match (was_enabled, self.regs().is_lcd_enabled()) {
                    (false, true) => {
                        info!("[ppu] LCD was enabled");
                        self.registers.current_line = Byte::new(0);
                        self.cycle_in_line = 0;
                        self.registers.set_mode(Mode::OamSearch);
                    }
                    (true, false) => {
                        info!("[ppu] LCD was disabled");
                        self.registers.current_line = Byte::new(0);
                        self.cycle_in_line = 0;
                        self.registers.set_mode(Mode::HBlank);
                        self.stat_line = false;
                    }
                    _ => {}
                }
            }
            0xFF41 => {
                // Only bit 3 to 6 are writable
                let v = self.regs().status.get() & 0b0000_0111 | byte.get() & 0b0111_1000;
                self.registers.status = Byte::new(v);
            },
            0xFF42 => self.registers.scroll_bg_y = byte,
            0xFF43 => self.registers.scroll_bg_x = byte,
            0xFF44 => {}, // read only
            0xFF45 => self.registers.lyc = byte,
            0xFF46 => {
                self.registers.oam_dma_start = byte;
                let src_addr = Word::new((byte.get() as u16) * 0x100);
                self.oam_dma_status = Some(src_addr);
            },
            0xFF47 => self.registers.background_palette = byte,
            0xFF48 => self.registers.sprite_palette_0 = byte,
            0xFF49 => self.registers.sprite_palette_1 = byte,
            0xFF4A => self.registers.scroll_win_y = byte,
            0xFF4B => self.registers.scroll_win_x = byte,
            _ => panic!("called `Ppu::store_io_byte` with invalid address"),
        }
    }

    /// Returns an immutable reference to all public registers.
    pub fn regs(&self) -> &PpuRegisters {
        &self.registers
    }

    /// Returns `true` exactly once per frame, the t-cycle V-Blank starts, and
    /// clears the flag. Callers that want to hand the framebuffer back to a
    /// host poll this once per `step`.
    pub fn take_frame_ready(&mut self) -> bool {
        let was_ready = self.frame_ready;
        self.frame_ready = false;
        was_ready
    }

    /// Advances the PPU by exactly one t-cycle.
    pub(crate) fn step(&mut self, interrupt_controller: &mut InterruptController) {
        // If the whole LCD is disabled, the PPU is dormant.
        if !self.regs().is_lcd_enabled() {
            return;
        }

        let line = self.regs().current_line.get();

        match self.cycle_in_line {
            0 if line < SCREEN_HEIGHT as u8 => {
                self.registers.set_mode(Mode::OamSearch);
                self.do_oam_search();
            }
            OAM_SEARCH_CYCLES if line < SCREEN_HEIGHT as u8 => {
                self.registers.set_mode(Mode::PixelTransfer);
                self.start_drawing();
            }
            0 if line == SCREEN_HEIGHT as u8 => {
                self.registers.set_mode(Mode::VBlank);
                interrupt_controller.request_interrupt(Interrupt::Vblank);
                self.frame_ready = true;
                self.window_line_counter = 0;
            }
            _ => {}
        }

        if line < SCREEN_HEIGHT as u8 && self.regs().mode() == Mode::PixelTransfer {
            self.tick_drawing();
            if self.lx as usize == SCREEN_WIDTH {
                self.registers.set_mode(Mode::HBlank);
            }
        }

        // The coincidence flag is continuously updated, not just at line
        // start; the STAT-interrupt line is the OR of every enabled
        // condition and only a 0->1 transition of it requests IF.STAT.
        let coincidence = self.regs().current_line == self.regs().lyc;
        self.registers.set_coincidence_flag(coincidence);

        let stat_line = (coincidence && self.regs().coincidence_interrupt())
            || (self.regs().mode() == Mode::OamSearch && self.regs().oam_search_interrupt())
            || (self.regs().mode() == Mode::HBlank && self.regs().hblank_interrupt())
            || (self.regs().mode() == Mode::VBlank && self.regs().vblank_interrupt());
        if stat_line && !self.stat_line {
            interrupt_controller.request_interrupt(Interrupt::LcdStat);
        }
        self.stat_line = stat_line;

        // Update cycles and line
        self.cycle_in_line += 1;
        if self.cycle_in_line == CYCLES_PER_LINE {
            self.registers.current_line += 1;
            self.cycle_in_line = 0;

            if self.regs().current_line == NUM_LINES {
                self.registers.current_line = Byte::new(0);
            }
        }
    }

    /// Performs the OAM search.
    ///
    /// Looks through all 40 sprites in the OAM and extracts the first (up to)
    /// 10 that are drawn on the current line. These are stored in the
    /// `sprites_on_line` array, sorted by ascending X (ties keep OAM order),
    /// which also gives the correct sprite-priority order for mixing. If
    /// there are fewer than 10 sprites on the current line, the remaining
    /// entries are `Sprite::invisible`.
    fn do_oam_search(&mut self) {
        let mut found = Vec::with_capacity(10);

        for sprite in self.oam.as_slice().chunks(4) {
            let sprite = Sprite {
                y: sprite[0],
                x: sprite[1],
                tile_idx: sprite[2],
                flags: sprite[3],
            };

            let line = self.regs().current_line + 16;
            if sprite.x != 0 && line >= sprite.y && line < sprite.y + self.regs().sprite_height() {
                found.push(sprite);
                if found.len() == 10 {
                    break;
                }
            }
        }

        found.sort_by_key(|s| s.x.get());

        for (idx, slot) in self.sprites_on_line.iter_mut().enumerate() {
            *slot = found.get(idx).copied().unwrap_or_else(Sprite::invisible);
        }
        self.sprite_fetched = [false; 10];
    }

    /// Resets all per-line drawing state; called exactly once, at the start
    /// of pixel-transfer mode.
    fn start_drawing(&mut self) {
        self.lx = 0;
        self.discard = self.regs().scroll_bg_x.get() % 8;
        self.fetcher = Fetcher::for_background(self.regs().scroll_bg_x.get() / 8);
        self.bg_fifo.clear();
        self.sprite_fetch = None;
        self.sprite_overlay = [None; SCREEN_WIDTH];
        self.window_triggered_this_line = false;
    }

    /// Advances the fetcher/FIFO pipeline by one t-cycle, possibly producing
    /// one output pixel.
    fn tick_drawing(&mut self) {
        if let Some(mut fetch) = self.sprite_fetch.take() {
            fetch.cycles_left -= 1;
            if fetch.cycles_left == 0 {
                self.merge_sprite_pixels(fetch.sprite);
            } else {
                self.sprite_fetch = Some(fetch);
            }
            return;
        }

        if self.regs().are_sprites_enabled() {
            if let Some(sprite) = self.next_sprite_to_fetch() {
                self.sprite_fetch = Some(SpriteFetch { sprite, cycles_left: SPRITE_FETCH_CYCLES });
                return;
            }
        }

        if self.should_switch_to_window() {
            self.bg_fifo.clear();
            self.fetcher = Fetcher::for_window();
            self.window_triggered_this_line = true;
        }

        let bg_and_window_enabled = self.regs().is_bg_and_window_enabled();
        if bg_and_window_enabled {
            self.advance_fetcher();
        }

        let bg_color = if bg_and_window_enabled {
            match self.bg_fifo.pop_front() {
                Some(color) => color,
                None => return, // fetcher hasn't produced pixels for this tile yet
            }
        } else {
            0
        };

        if self.discard > 0 {
            self.discard -= 1;
            return;
        }

        let sprite_pixel = self.sprite_overlay[self.lx as usize];
        let color = mix_pixel(bg_color, sprite_pixel, bg_and_window_enabled, self.regs());
        let row = self.regs().current_line.get() as usize;
        self.framebuffer[row * SCREEN_WIDTH + self.lx as usize] = color;
        self.lx += 1;

        if self.window_triggered_this_line && self.lx as usize == SCREEN_WIDTH {
            self.window_line_counter += 1;
        }
    }

    /// Returns the next not-yet-fetched sprite on this line whose left edge
    /// has been reached by the fetcher, if any.
    fn next_sprite_to_fetch(&mut self) -> Option<Sprite> {
        for idx in 0..10 {
            let sprite = self.sprites_on_line[idx];
            let reached = sprite.x.get() <= self.lx.saturating_add(8);
            if !self.sprite_fetched[idx] && sprite.x != Byte::new(0xFF) && reached {
                self.sprite_fetched[idx] = true;
                return Some(sprite);
            }
        }
        None
    }

    /// True exactly once per line: when the background fetcher should switch
    /// to fetching the window instead, because the current pixel crossed the
    /// window's left edge.
    fn should_switch_to_window(&self) -> bool {
        self.regs().is_bg_and_window_enabled()
            && self.regs().is_window_enabled()
            && !self.fetcher.using_window
            && self.regs().current_line >= self.regs().scroll_win_y
            && self.lx as u16 + 7 >= self.regs().scroll_win_x.get() as u16
    }

    /// Runs one two-t-cycle half-step of the background/window fetcher.
    fn advance_fetcher(&mut self) {
        match self.fetcher.step {
            FetchStep::Tile => {
                if !self.fetcher.second_half {
                    self.fetcher.second_half = true;
                    return;
                }

                let map_area = if self.fetcher.using_window {
                    self.regs().window_tile_map_address()
                } else {
                    self.regs().bg_tile_map_address()
                };
                let row = if self.fetcher.using_window {
                    self.window_line_counter / 8
                } else {
                    (self.regs().scroll_bg_y + self.regs().current_line).get() / 8
                };
                let map_offset = map_area.start() + MAP_SIZE as u16 * row as u16;
                let tile_id = self.vram[map_offset + self.fetcher.tile_x as u16];

                self.fetcher.tile_id = tile_id;
                self.fetcher.second_half = false;
                self.fetcher.step = FetchStep::DataLow;
            }
            FetchStep::DataLow => {
                if !self.fetcher.second_half {
                    self.fetcher.second_half = true;
                    return;
                }
                let lo = self.fetch_tile_plane(0);
                self.fetcher.data_lo = lo;
                self.fetcher.second_half = false;
                self.fetcher.step = FetchStep::DataHigh;
            }
            FetchStep::DataHigh => {
                if !self.fetcher.second_half {
                    self.fetcher.second_half = true;
                    return;
                }
                let hi = self.fetch_tile_plane(1);
                self.fetcher.data_hi = hi;
                self.fetcher.second_half = false;
                self.fetcher.step = FetchStep::Push;
            }
            FetchStep::Push => {
                // Only pushes once the FIFO has drained; otherwise it keeps
                // retrying on every subsequent cycle.
                if self.bg_fifo.is_empty() {
                    let lo = self.fetcher.data_lo.get();
                    let hi = self.fetcher.data_hi.get();
                    for col in 0..8u8 {
                        let bit = 7 - col;
                        let pattern = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                        self.bg_fifo.push_back(pattern);
                    }
                    self.fetcher.tile_x = (self.fetcher.tile_x + 1) % MAP_SIZE;
                    self.fetcher.step = FetchStep::Tile;
                }
            }
        }
    }

    /// Loads one of the two bitplane bytes (`plane` 0 = low, 1 = high) for
    /// the tile row the fetcher is currently working on.
    fn fetch_tile_plane(&self, plane: u16) -> Byte {
        let row = if self.fetcher.using_window {
            self.window_line_counter % 8
        } else {
            (self.regs().scroll_bg_y + self.regs().current_line).get() % 8
        };
        let tile_start = self.regs().tile_data_address().index(self.fetcher.tile_id);
        self.vram[tile_start + row as u16 * 2 + plane]
    }

    /// Fetches `sprite`'s pixel data for the current line and writes
    /// non-transparent pixels into the sprite overlay. Pixels already
    /// present are never overwritten, which gives earlier-fetched (i.e.
    /// leftmost, then lowest OAM index) sprites priority, matching DMG
    /// behaviour.
    fn merge_sprite_pixels(&mut self, sprite: Sprite) {
        let height = self.regs().sprite_height();
        let flip_y = sprite.flags.get() & 0b0100_0000 != 0;
        let flip_x = sprite.flags.get() & 0b0010_0000 != 0;
        let uses_palette_1 = sprite.flags.get() & 0b0001_0000 != 0;
        let bg_priority = sprite.flags.get() & 0b1000_0000 != 0;

        let mut row = (self.regs().current_line + 16).get().wrapping_sub(sprite.y.get());
        if flip_y {
            row = height - 1 - row;
        }

        let tile_idx = if height == 16 { sprite.tile_idx.get() & 0xFE } else { sprite.tile_idx.get() };
        let tile_start = Word::new(tile_idx as u16 * 16);
        let line_offset = tile_start + row as u16 * 2;
        let lo = self.vram[line_offset].get();
        let hi = self.vram[line_offset + 1u8].get();

        let screen_x = sprite.x.get() as i16 - 8;
        for col in 0..8u8 {
            let bit = if flip_x { col } else { 7 - col };
            let pattern = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
            if pattern == 0 {
                continue;
            }

            let x = screen_x + col as i16;
            if x < 0 || x as usize >= SCREEN_WIDTH {
                continue;
            }

            let slot = &mut self.sprite_overlay[x as usize];
            if slot.is_none() {
                *slot = Some(SpritePixel { color: pattern, uses_palette_1, bg_priority });
            }
        }
    }
}

/// Mixes the popped background and (optional) sprite pixel according to DMG
/// priority rules: the sprite pixel wins unless it's transparent (color 0),
/// or it has the background-priority bit set and the background (when
/// enabled) isn't itself color 0.
fn mix_pixel(
    bg_color: u8,
    sprite: Option<SpritePixel>,
    bg_and_window_enabled: bool,
    regs: &PpuRegisters,
) -> PixelColor {
    match sprite {
        Some(sp) if !(sp.bg_priority && bg_and_window_enabled && bg_color != 0) => {
            let palette = if sp.uses_palette_1 { regs.sprite_palette_1 } else { regs.sprite_palette_0 };
            PixelColor::from_palette_index(palette, sp.color)
        }
        _ => PixelColor::from_palette_index(regs.background_palette, bg_color),
    }
}

/// Specifies which mode the PPU is in.
///
/// Breakdown of one frame:
///
/// ```ignore
///    ┌── 80 cycles ──┬─────── 168+ cycles ──────┬─────────── 208- cycles ──────────┐
///    │               │                          |                                  │
///  144      OAM      │         Pixel             │         H-Blank                 │
/// lines    Search    │        Transfer           │                                  │
///    ├───────────────┴──────────────────────────┴──────────────────────────────────┤
///   10                                V-Blank                                      │
/// lines                                                                            │
///    └─────────────────────────────────────────────────────────────────────────────┘
/// ```
///
/// All cycles are t-cycles (4 MHz). Pixel transfer can vary in length for
/// different lines, due to the window and sprites interrupting the normal
/// fetcher process.
///
/// Duration of some things:
/// - One line: 456 t-cycles
/// - V-Blank: 10 * one line = 4560 t-cycles
/// - One frame: one line * 154 = 70224 t-cycles
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub enum Mode {
    /// Also called "Mode 2": PPU determines which sprites are visible on the
    /// current line.
    OamSearch = 2,

    /// Also called "Mode 3": pixels are transferred to the LCD screen.
    PixelTransfer = 3,

    /// Also called "Mode 0": time after pixel transfer when the PPU is waiting
    /// to start a new line.
    HBlank = 0,

    /// Also called "Mode 1": time after the last line has been drawn and
    /// before the next frame begins.
    VBlank = 1,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Mode::OamSearch => "OAM search",
            Mode::PixelTransfer => "pixel transfer",
            Mode::HBlank => "H-Blank",
            Mode::VBlank => "V-Blank",
        }.fmt(f)
    }
}

/// Describes a sprite. The OAM stores exactly this information for up to 40
/// sprites.
#[derive(Copy, Clone, Debug)]
#[derive(Serialize, Deserialize)]
struct Sprite {
    y: Byte,
    x: Byte,
    tile_idx: Byte,
    flags: Byte,
}

impl Sprite {
    /// Returns an instance that has an x value of 255, making it invisble. All
    /// other fields are 0.
    fn invisible() -> Self {
        Self {
            y: Byte::zero(),
            x: Byte::new(255),
            tile_idx: Byte::zero(),
            flags: Byte::zero(),
        }
    }
}
