//! A cycle-accurate emulator core for an 8-bit handheld game console.
//!
//! This crate is the emulator core: a `Cargo.toml`-visible `Emulator` facade
//! that owns a [`Machine`] and drives it one host-visible `step` at a time.
//! It has no window, no audio device and no file I/O of its own -- the host
//! supplies a ROM, reads the framebuffer, pumps an audio ring buffer and
//! registers whatever debug callbacks it wants.

use std::collections::HashMap;

use crate::{
    cartridge::Cartridge,
    disasm::Disassembled,
    machine::{Machine, input::Keys},
    primitives::{Byte, PixelColor, Word},
    log::*,
};


#[macro_use]
pub mod instr;

pub mod mbc;
pub mod log;
pub mod primitives;
pub mod env;
pub mod cartridge;
pub mod machine;
pub mod disasm;
mod save_state;
mod error;

pub use error::{LoadError, PersistentError, SaveError};

/// Width of the Game Boy screen in pixels.
pub const SCREEN_WIDTH: usize = 160;

/// Height of the Game Boy screen in pixels.
pub const SCREEN_HEIGHT: usize = 144;

/// Base clock speed of the DMG in t-cycles per second.
const T_CYCLES_PER_SECOND: f64 = 4_194_304.0;

/// Minimum accepted value for [`Emulator::set_turbo_speed`].
const MIN_TURBO_SPEED: f64 = 0.25;


/// A 16-bit button bitmap as described by the host-facing API: bits 0-3 are
/// the d-pad (Up, Down, Left, Right), bits 4-7 are the buttons (A, B, Start,
/// Select). This differs from [`Keys`]'s internal bit layout, so `step`
/// converts between the two at the boundary.
fn keys_from_input_bitmap(inputs: u16) -> Keys {
    const UP: u16 = 1 << 0;
    const DOWN: u16 = 1 << 1;
    const LEFT: u16 = 1 << 2;
    const RIGHT: u16 = 1 << 3;
    const A: u16 = 1 << 4;
    const B: u16 = 1 << 5;
    const START: u16 = 1 << 6;
    const SELECT: u16 = 1 << 7;

    use machine::input::JoypadKey::*;
    Keys::none()
        .set_key(Up, inputs & UP != 0)
        .set_key(Down, inputs & DOWN != 0)
        .set_key(Left, inputs & LEFT != 0)
        .set_key(Right, inputs & RIGHT != 0)
        .set_key(A, inputs & A != 0)
        .set_key(B, inputs & B != 0)
        .set_key(Start, inputs & START != 0)
        .set_key(Select, inputs & SELECT != 0)
}

/// Breakdown of how many bytes the emulator currently has allocated, broken
/// down by subsystem. Debug-only: meant for a host-side memory inspector,
/// never consulted by the emulation loop itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUse {
    pub rom_bytes: usize,
    pub external_ram_bytes: usize,
    pub wram_bytes: usize,
    pub hram_bytes: usize,
    pub vram_bytes: usize,
    pub oam_bytes: usize,
    pub audio_buffer_bytes: usize,
}

/// Severity passed to the host's logger callback, re-exported so callers
/// don't need their own dependency on the `log` crate just to match on it.
pub use ::log::Level as LogLevel;


/// The emulator core. Owns a [`Machine`] once a cartridge has been loaded via
/// [`Emulator::load`], plus whatever host callbacks were registered.
///
/// The core is single-threaded and cooperative: nothing here spawns a
/// thread, blocks, or retains a lock across a call. The host must not call
/// methods on the same instance concurrently from multiple threads.
pub struct Emulator {
    machine: Option<Machine>,

    turbo_speed: f64,

    logger_callback: Option<Box<dyn FnMut(&str, LogLevel)>>,
    persistent_memory_callback: Option<Box<dyn FnMut(&[u8])>>,
    last_persistent_memory: Option<Vec<u8>>,

    /// Fractional milliseconds of host wall-clock time accumulated between
    /// whole-second RTC ticks (the MBC3 RTC advances in wall-clock seconds,
    /// not t-cycles, since its crystal runs independently of the CPU clock).
    rtc_accum_ms: f64,

    /// Total CPU instructions retired since the cartridge was loaded. Feeds
    /// the instruction-count breakpoints and nothing else.
    instructions_executed: u64,

    pc_callbacks: HashMap<Word, Box<dyn FnMut(&Machine)>>,
    instruction_callbacks: HashMap<Byte, Box<dyn FnMut(&Machine)>>,
    instruction_count_callbacks: HashMap<u64, Box<dyn FnMut(&Machine)>>,
    data_callbacks: HashMap<Word, Box<dyn FnMut(&Machine, Byte)>>,
}

impl Emulator {
    /// Creates an emulator with no cartridge loaded. Call [`Emulator::load`]
    /// before calling [`Emulator::step`].
    pub fn create() -> Self {
        info!("Creating emulator");

        Self {
            machine: None,
            turbo_speed: 1.0,
            logger_callback: None,
            persistent_memory_callback: None,
            last_persistent_memory: None,
            rtc_accum_ms: 0.0,
            instructions_executed: 0,
            pc_callbacks: HashMap::new(),
            instruction_callbacks: HashMap::new(),
            instruction_count_callbacks: HashMap::new(),
            data_callbacks: HashMap::new(),
        }
    }

    /// Parses `rom_bytes` as a cartridge and starts a fresh [`Machine`] for
    /// it. `name` is only used for log messages. If `bootrom_bytes` is
    /// `Some`, execution starts at `0x0000` with the bootrom mounted;
    /// otherwise it starts directly at the cartridge entry point with
    /// post-bootrom register state.
    pub fn load(
        &mut self,
        name: &str,
        rom_bytes: &[u8],
        bootrom_bytes: Option<&[u8]>,
    ) -> Result<(), LoadError> {
        let cartridge = Cartridge::from_bytes(rom_bytes)?;
        self.log(LogLevel::Info, &format!("loaded cartridge '{}' for '{}'", cartridge.title(), name));

        self.machine = Some(Machine::new(cartridge, bootrom_bytes));
        self.last_persistent_memory = None;
        self.rtc_accum_ms = 0.0;
        self.instructions_executed = 0;
        Ok(())
    }

    /// Restores battery-backed cartridge RAM (and, for MBC3, the RTC) saved
    /// by an earlier session.
    pub fn load_persistent_memory(&mut self, bytes: &[u8]) {
        if let Some(machine) = &mut self.machine {
            machine.cartridge.load_persistent_memory(bytes);
        }
    }

    /// Registers a callback invoked with the battery-backed save data
    /// whenever it changes. At most one invocation per [`Emulator::step`]
    /// call, per §5's "at most once per frame" contract.
    pub fn set_persistent_memory_callback(&mut self, callback: impl FnMut(&[u8]) + 'static) {
        self.persistent_memory_callback = Some(Box::new(callback));
    }

    /// Registers the audio sink the APU writes samples into. `num_frames` is
    /// the capacity of the ring buffer in stereo frames.
    pub fn set_audio_buffer(&mut self, num_frames: usize, sample_rate: u32) {
        if let Some(machine) = &mut self.machine {
            machine.apu.set_audio_buffer(num_frames, sample_rate);
        }
    }

    /// Returns the current write position (in stereo frames) into the audio
    /// ring buffer registered via [`Emulator::set_audio_buffer`], if any. The
    /// host reads up to this position and advances its own read cursor; the
    /// buffer is single-writer/single-reader and never locks.
    pub fn audio_write_pos(&self) -> Option<usize> {
        self.machine.as_ref()?.apu.audio_buffer().map(|buf| buf.write_pos())
    }

    /// Returns the raw sample slice backing the audio ring buffer, if one has
    /// been registered.
    pub fn audio_buffer(&self) -> Option<&[f32]> {
        self.machine.as_ref()?.apu.audio_buffer().map(|buf| buf.as_slice())
    }

    /// Registers a callback receiving every log message the core emits along
    /// with its severity. Without one, messages only go through the `log`
    /// facade (i.e. whatever logger the host installed globally).
    pub fn set_logger_callback(&mut self, callback: impl FnMut(&str, LogLevel) + 'static) {
        self.logger_callback = Some(Box::new(callback));
    }

    /// Emits a message both through the ordinary `log` facade (whatever
    /// global logger the host installed) and through the per-instance
    /// callback registered via [`Emulator::set_logger_callback`], if any.
    fn log(&mut self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Error => error!("{}", msg),
            LogLevel::Warn => warn!("{}", msg),
            LogLevel::Info => info!("{}", msg),
            LogLevel::Debug => debug!("{}", msg),
            LogLevel::Trace => trace!("{}", msg),
        }
        if let Some(cb) = &mut self.logger_callback {
            cb(msg, level);
        }
    }

    /// Sets the emulation speed multiplier. `1.0` is real-time; values above
    /// that run faster ("turbo"). Clamped to a minimum of `0.25` since a
    /// smaller multiplier would make `step`'s cycle budget round to zero for
    /// realistic `dt_ms` values.
    pub fn set_turbo_speed(&mut self, speed: f64) {
        self.turbo_speed = speed.max(MIN_TURBO_SPEED);
    }

    /// Returns a reference to the underlying machine, mostly useful for
    /// tests and debug tooling.
    pub fn machine(&self) -> Option<&Machine> {
        self.machine.as_ref()
    }

    /// Runs the emulator for approximately `dt_ms` milliseconds of emulated
    /// time (scaled by the turbo speed), or until a frame becomes ready,
    /// whichever comes first. `inputs` is the 16-bit button bitmap described
    /// in §6.
    ///
    /// Per-m-cycle ordering is CPU, then Timer, DMA and PPU once per t-cycle
    /// of that instruction, then the APU once for the whole batch; this
    /// matches the ordering guarantee in §5 and lets any interrupt flag a
    /// component raises during one instruction be observed by the CPU at the
    /// start of the next.
    pub fn step(&mut self, inputs: u16, dt_ms: f64) {
        let machine = match &mut self.machine {
            Some(machine) => machine,
            None => {
                self.log(LogLevel::Warn, "step() called with no cartridge loaded");
                return;
            }
        };

        let keys = keys_from_input_bitmap(inputs);
        let budget_cycles = T_CYCLES_PER_SECOND * (dt_ms / 1000.0) * self.turbo_speed;
        let mut cycles = 0.0_f64;

        loop {
            let pc = machine.cpu.pc;
            if let Some(cb) = self.pc_callbacks.get_mut(&pc) {
                cb(machine);
            }
            let opcode = machine.load_byte_bypass_dma(pc);
            if let Some(cb) = self.instruction_callbacks.get_mut(&opcode) {
                cb(machine);
            }

            let watched: Vec<(Word, Byte)> = self.data_callbacks.keys()
                .map(|&addr| (addr, machine.load_byte_bypass_dma(addr)))
                .collect();

            let t_cycles = machine.step();

            for _ in 0..t_cycles {
                machine.timer.step(&mut machine.interrupt_controller);
                machine.dma_step();
                machine.ppu.step(&mut machine.interrupt_controller);
            }
            machine.apu.step(t_cycles);

            machine.input_controller.handle_input(&keys, &mut machine.interrupt_controller);

            self.instructions_executed += 1;
            let instructions_executed = self.instructions_executed;
            if let Some(cb) = self.instruction_count_callbacks.get_mut(&instructions_executed) {
                cb(machine);
            }
            for (addr, before) in watched {
                let after = machine.load_byte_bypass_dma(addr);
                if after != before {
                    if let Some(cb) = self.data_callbacks.get_mut(&addr) {
                        cb(machine, after);
                    }
                }
            }

            cycles += t_cycles as f64;

            let frame_ready = machine.ppu.take_frame_ready();
            if frame_ready {
                break;
            }
            if cycles >= budget_cycles {
                break;
            }
        }

        // The RTC crystal runs independently of the emulated CPU clock, so it
        // is advanced by real elapsed time rather than by t-cycles executed.
        self.rtc_accum_ms += dt_ms;
        let whole_seconds = (self.rtc_accum_ms / 1000.0).floor();
        if whole_seconds >= 1.0 {
            self.rtc_accum_ms -= whole_seconds * 1000.0;
            machine.cartridge.mbc.tick_rtc(whole_seconds as u64);
        }

        if let Some(current) = machine.cartridge.persistent_memory() {
            if self.last_persistent_memory.as_ref() != Some(&current) {
                if let Some(cb) = &mut self.persistent_memory_callback {
                    cb(&current);
                }
                self.last_persistent_memory = Some(current);
            }
        }
    }

    /// Returns the current framebuffer: 160x144 pixels, 4 bytes per pixel
    /// (R, G, B, A with A always 255), top-to-bottom and left-to-right.
    /// Stable between the end of one `step` and the start of the next.
    pub fn get_frame_buffer(&self) -> Vec<u8> {
        match &self.machine {
            None => vec![0; SCREEN_WIDTH * SCREEN_HEIGHT * 4],
            Some(machine) => machine.ppu.framebuffer()
                .iter()
                .flat_map(PixelColor::to_rgba)
                .collect(),
        }
    }

    /// Writes a full save-state byte image (see §4.13) for the current
    /// machine state. `raw` skips the gzip compression step, trading size for
    /// lower latency -- useful for high-frequency rewind snapshots.
    pub fn serialize(&self, raw: bool) -> Result<Vec<u8>, SaveError> {
        match &self.machine {
            None => Ok(Vec::new()),
            Some(machine) => save_state::serialize(machine, raw),
        }
    }

    /// Restores machine state from a byte image produced by
    /// [`Emulator::serialize`]. Requires a cartridge to already be loaded,
    /// since save-states never carry raw ROM bytes.
    pub fn deserialize(&mut self, bytes: &[u8], raw: bool) -> Result<(), SaveError> {
        match &mut self.machine {
            None => Err(SaveError::Truncated("no cartridge loaded".into())),
            Some(machine) => save_state::deserialize(machine, bytes, raw),
        }
    }

    /// Registers a breakpoint firing whenever the CPU is about to execute
    /// the instruction at `pc`.
    pub fn set_pc_callback(&mut self, pc: Word, callback: impl FnMut(&Machine) + 'static) {
        self.pc_callbacks.insert(pc, Box::new(callback));
    }

    /// Registers a breakpoint firing whenever the CPU is about to execute
    /// the given (unprefixed) opcode.
    pub fn set_instruction_callback(&mut self, opcode: Byte, callback: impl FnMut(&Machine) + 'static) {
        self.instruction_callbacks.insert(opcode, Box::new(callback));
    }

    /// Registers a breakpoint firing once the `n`-th instruction since load
    /// has retired.
    pub fn set_instruction_count_callback(&mut self, n: u64, callback: impl FnMut(&Machine) + 'static) {
        self.instruction_count_callbacks.insert(n, Box::new(callback));
    }

    /// Registers a breakpoint firing whenever the byte at `addr` changes
    /// value during a `step` call.
    pub fn set_data_callback(&mut self, addr: Word, callback: impl FnMut(&Machine, Byte) + 'static) {
        self.data_callbacks.insert(addr, Box::new(callback));
    }

    /// Drops every registered debug callback.
    pub fn clear_callbacks(&mut self) {
        self.pc_callbacks.clear();
        self.instruction_callbacks.clear();
        self.instruction_count_callbacks.clear();
        self.data_callbacks.clear();
    }

    /// Disassembles the instruction at `addr`, for debugger UIs. Never
    /// mutates emulator state.
    pub fn get_disassembly_info(&self, addr: Word) -> Option<Disassembled> {
        self.machine.as_ref().map(|machine| disasm::disassemble(machine, addr))
    }

    /// Reports how many bytes each subsystem currently has allocated.
    pub fn get_memory_use(&self) -> MemoryUse {
        match &self.machine {
            None => MemoryUse::default(),
            Some(machine) => MemoryUse {
                rom_bytes: machine.cartridge.rom_size().len(),
                external_ram_bytes: machine.cartridge.ram_size().len(),
                wram_bytes: machine.wram.len().get() as usize,
                hram_bytes: machine.hram.len().get() as usize,
                vram_bytes: machine.ppu.framebuffer().len() * std::mem::size_of::<PixelColor>(),
                oam_bytes: 0xA0,
                audio_buffer_bytes: machine.apu.audio_buffer()
                    .map(|buf| buf.as_slice().len() * std::mem::size_of::<f32>())
                    .unwrap_or(0),
            },
        }
    }
}
