//! The seam between the execution controller and the emulator host.
//!
//! [`LibretroHost`] is the production implementation; tests drive the
//! controller and machine model against scripted implementations instead of a
//! real plug-in.

use libretro_host::{FrameReport, KeyEvent, LibretroHost, LibretroHostError, SectionBases};

pub trait CoreHost {
    /// Advance the emulated machine by one frame.
    fn run_frame(&mut self) -> FrameReport;

    /// Serialize the machine into a buffer owned by the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the plug-in cannot serialize its state.
    fn serialize_snapshot(&mut self) -> Result<&[u8], LibretroHostError>;

    /// Rehydrate the machine from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the plug-in rejects the snapshot.
    fn unserialize(&mut self, bytes: &[u8]) -> Result<(), LibretroHostError>;

    fn set_paused(&mut self, paused: bool);

    fn read_registers(&mut self, out: &mut [u32]) -> usize;

    /// Return-address trail from the emulated stack, outermost first.
    fn read_callstack(&mut self, out: &mut [u32]) -> usize;

    fn read_vram(&mut self, out: &mut [u8]) -> usize;

    fn read_checkpoints(&mut self, out: &mut [u8]) -> usize;

    fn set_breakpoint(&mut self, addr: u32, enabled: bool);

    fn remove_breakpoint(&mut self, addr: u32);

    fn suppress_breakpoint_at(&mut self, addr: u32) -> bool;

    fn set_joypad(&mut self, port: u32, button_id: u32, pressed: bool);

    fn clear_joypad_state(&mut self);

    fn queue_key_event(&mut self, event: KeyEvent);

    fn checkpoint_enabled(&mut self) -> Option<bool>;

    fn set_checkpoint_enabled(&mut self, enabled: bool);

    fn reset_checkpoints(&mut self);

    /// Section base addresses published by the plug-in, when it did.
    fn section_bases(&self) -> SectionBases {
        SectionBases::default()
    }

    fn target_fps(&self) -> f64;
}

impl CoreHost for LibretroHost {
    fn run_frame(&mut self) -> FrameReport {
        Self::run_frame(self)
    }

    fn serialize_snapshot(&mut self) -> Result<&[u8], LibretroHostError> {
        Self::serialize_snapshot(self)
    }

    fn unserialize(&mut self, bytes: &[u8]) -> Result<(), LibretroHostError> {
        Self::unserialize(self, bytes)
    }

    fn set_paused(&mut self, paused: bool) {
        Self::set_paused(self, paused);
    }

    fn read_registers(&mut self, out: &mut [u32]) -> usize {
        Self::read_registers(self, out)
    }

    fn read_callstack(&mut self, out: &mut [u32]) -> usize {
        Self::read_callstack(self, out)
    }

    fn read_vram(&mut self, out: &mut [u8]) -> usize {
        Self::read_vram(self, out)
    }

    fn read_checkpoints(&mut self, out: &mut [u8]) -> usize {
        Self::read_checkpoints(self, out)
    }

    fn set_breakpoint(&mut self, addr: u32, enabled: bool) {
        Self::set_breakpoint(self, addr, enabled);
    }

    fn remove_breakpoint(&mut self, addr: u32) {
        Self::remove_breakpoint(self, addr);
    }

    fn suppress_breakpoint_at(&mut self, addr: u32) -> bool {
        Self::suppress_breakpoint_at(self, addr)
    }

    fn set_joypad(&mut self, port: u32, button_id: u32, pressed: bool) {
        Self::set_joypad(self, port, button_id, pressed);
    }

    fn clear_joypad_state(&mut self) {
        Self::clear_joypad_state(self);
    }

    fn queue_key_event(&mut self, event: KeyEvent) {
        Self::queue_key_event(self, event);
    }

    fn checkpoint_enabled(&mut self) -> Option<bool> {
        Self::checkpoint_enabled(self)
    }

    fn set_checkpoint_enabled(&mut self, enabled: bool) {
        Self::set_checkpoint_enabled(self, enabled);
    }

    fn reset_checkpoints(&mut self) {
        Self::reset_checkpoints(self);
    }

    fn section_bases(&self) -> SectionBases {
        Self::section_bases(self)
    }

    fn target_fps(&self) -> f64 {
        Self::target_fps(self)
    }
}
