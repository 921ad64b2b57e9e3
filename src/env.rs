//! Small interfaces through which the emulator core talks to whatever embeds
//! it, without depending on any concrete windowing, audio or input library.

use crate::machine::input::Keys;

/// Supplies the currently pressed buttons/d-pad for one `Emulator::step`
/// call. The simplest implementation is `Keys` itself (it implements this
/// trivially); hosts with their own input abstraction can implement it on
/// their own type instead of converting up front.
pub trait Input {
    fn get_pressed_keys(&self) -> Keys;
}

impl Input for Keys {
    fn get_pressed_keys(&self) -> Keys {
        *self
    }
}
