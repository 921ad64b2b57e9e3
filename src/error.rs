//! Error types returned by the public API.

use thiserror::Error;

/// Everything that can go wrong while parsing a ROM and turning it into a
/// runnable [`crate::cartridge::Cartridge`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("cartridge header checksum mismatch (expected 0x{expected:02x}, got 0x{actual:02x})")]
    HeaderChecksum { expected: u8, actual: u8 },

    #[error("cartridge declares an unknown or unsupported MBC type (0x{0:02x})")]
    UnknownMbc(u8),

    #[error("cartridge data length ({actual}) doesn't match the ROM size byte in the header ({expected})")]
    InvalidRomSize { expected: usize, actual: usize },

    #[error("cartridge declares a RAM size byte (0x{0:02x}) that is invalid for its MBC type")]
    InvalidRamSize(u8),
}

/// Everything that can go wrong while restoring a save-state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SaveError {
    #[error("save-state doesn't start with the expected magic bytes")]
    Magic,

    #[error("save-state was created by an incompatible version ({found}, expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("save-state is truncated or otherwise corrupt: {0}")]
    Truncated(String),

    #[error("failed to decompress save-state body: {0}")]
    Compression(String),
}

/// Raised when persisting battery-backed cartridge RAM to the host fails.
///
/// This is never fatal to emulation: the frontend is only notified via the
/// logger callback so that save progress can run without the emulation loop
/// depending on host I/O succeeding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistentError {
    #[error("writing persistent (battery-backed) memory failed: {0}")]
    WriteFailed(String),
}
