//! Scripted [`CoreHost`] implementation for controller and model tests.

use crate::corehost::CoreHost;
use libretro_host::{FrameReport, KeyEvent, LibretroHostError};
use rustc_hash::FxHashMap;

/// A deterministic stand-in for a real plug-in. The "machine" is a counter
/// that advances once per completed frame; snapshots serialize the counter,
/// so time travel is observable without an emulator.
#[derive(Debug, Default)]
pub(crate) struct ScriptedHost {
    pub machine_state: u64,
    pub pc: u32,
    pub registers: Vec<u32>,
    pub callstack: Vec<u32>,
    pub checkpoints: Vec<u8>,
    pub breakpoints: FxHashMap<u32, bool>,
    pub suppressed: Option<u32>,
    /// Frames that hit a breakpoint: the machine-state value the frame would
    /// have produced, mapped to the breakpoint address.
    pub break_on_state: FxHashMap<u64, u32>,
    pub paused: bool,
    pub fail_serialize: bool,
    pub frames_run: u64,
    pub restores: u64,
    pub joypad_events: Vec<(u32, u32, bool)>,
    pub key_events: Vec<KeyEvent>,
    pub clears: u32,
    pub checkpoint_enabled: bool,
    pub checkpoint_resets: u32,
    scratch: Vec<u8>,
}

impl CoreHost for ScriptedHost {
    fn run_frame(&mut self) -> FrameReport {
        let next_state = self.machine_state + 1;

        if let Some(&addr) = self.break_on_state.get(&next_state) {
            if self.suppressed == Some(addr) {
                // One instruction has executed past the breakpoint; rearm
                self.suppressed = None;
            } else if self.breakpoints.get(&addr).copied().unwrap_or(false) {
                self.paused = true;
                self.pc = addr;
                return FrameReport { breakpoint_hit: Some(addr), vblank: false };
            }
        }

        self.machine_state = next_state;
        self.frames_run += 1;
        FrameReport { breakpoint_hit: None, vblank: true }
    }

    fn serialize_snapshot(&mut self) -> Result<&[u8], LibretroHostError> {
        if self.fail_serialize {
            return Err(LibretroHostError::SerializeFailed { size: 0 });
        }
        self.scratch = self.machine_state.to_le_bytes().to_vec();
        Ok(&self.scratch)
    }

    fn unserialize(&mut self, bytes: &[u8]) -> Result<(), LibretroHostError> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| LibretroHostError::UnserializeFailed { size: bytes.len() })?;
        self.machine_state = u64::from_le_bytes(raw);
        self.restores += 1;
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    fn read_registers(&mut self, out: &mut [u32]) -> usize {
        if self.registers.is_empty() && self.callstack.is_empty() && self.pc == 0 {
            return 0;
        }

        let mut registers = self.registers.clone();
        if registers.is_empty() {
            registers = vec![0; 18];
        }
        if let Some(pc_slot) = registers.last_mut()
            && self.pc != 0
        {
            *pc_slot = self.pc;
        }

        let count = registers.len().min(out.len());
        out[..count].copy_from_slice(&registers[..count]);
        count
    }

    fn read_callstack(&mut self, out: &mut [u32]) -> usize {
        let count = self.callstack.len().min(out.len());
        out[..count].copy_from_slice(&self.callstack[..count]);
        count
    }

    fn read_vram(&mut self, _out: &mut [u8]) -> usize {
        0
    }

    fn read_checkpoints(&mut self, out: &mut [u8]) -> usize {
        let count = self.checkpoints.len().min(out.len());
        out[..count].copy_from_slice(&self.checkpoints[..count]);
        count
    }

    fn set_breakpoint(&mut self, addr: u32, enabled: bool) {
        if self.suppressed == Some(addr) {
            self.suppressed = None;
        }
        self.breakpoints.insert(addr, enabled);
    }

    fn remove_breakpoint(&mut self, addr: u32) {
        self.breakpoints.remove(&addr);
    }

    fn suppress_breakpoint_at(&mut self, addr: u32) -> bool {
        if self.breakpoints.get(&addr).copied().unwrap_or(false) {
            self.suppressed = Some(addr);
            true
        } else {
            false
        }
    }

    fn set_joypad(&mut self, port: u32, button_id: u32, pressed: bool) {
        self.joypad_events.push((port, button_id, pressed));
    }

    fn clear_joypad_state(&mut self) {
        self.clears += 1;
    }

    fn queue_key_event(&mut self, event: KeyEvent) {
        self.key_events.push(event);
    }

    fn checkpoint_enabled(&mut self) -> Option<bool> {
        Some(self.checkpoint_enabled)
    }

    fn set_checkpoint_enabled(&mut self, enabled: bool) {
        self.checkpoint_enabled = enabled;
    }

    fn reset_checkpoints(&mut self) {
        self.checkpoint_resets += 1;
    }

    fn target_fps(&self) -> f64 {
        60.0
    }
}
