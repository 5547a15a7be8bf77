//! Breakpoint enforcement and per-frame debug latches.

use retroscope_common::addr::mask_code_address;
use rustc_hash::FxHashMap;

/// Section base addresses the plug-in may publish through the debug-base
/// callback (text, data, bss).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionBases {
    pub text: Option<u32>,
    pub data: Option<u32>,
    pub bss: Option<u32>,
}

/// The authoritative breakpoint set plus the latches the instruction-hook and
/// vblank trampolines raise during `retro_run`.
#[derive(Debug, Default)]
pub(crate) struct DebugState {
    breakpoints: FxHashMap<u32, bool>,
    suppressed: Option<u32>,
    breakpoint_hit: Option<u32>,
    vblank_seen: bool,
    pub paused: bool,
    section_bases: SectionBases,
}

impl DebugState {
    pub fn set_breakpoint(&mut self, addr: u32, enabled: bool) {
        let addr = mask_code_address(addr);
        if self.suppressed == Some(addr) {
            self.suppressed = None;
        }
        self.breakpoints.insert(addr, enabled);
    }

    pub fn remove_breakpoint(&mut self, addr: u32) {
        let addr = mask_code_address(addr);
        if self.suppressed == Some(addr) {
            self.suppressed = None;
        }
        self.breakpoints.remove(&addr);
    }

    /// Temporarily lift an enabled breakpoint so execution can leave the
    /// current PC. The breakpoint is reinstated by the instruction hook as
    /// soon as it observes a different address.
    pub fn suppress_breakpoint(&mut self, addr: u32) -> bool {
        let addr = mask_code_address(addr);
        match self.breakpoints.get(&addr) {
            Some(true) => {
                self.breakpoints.remove(&addr);
                self.suppressed = Some(addr);
                true
            }
            _ => false,
        }
    }

    /// Breakpoint test invoked for every emulated instruction. Returns whether
    /// the plug-in must stop before executing `pc`.
    pub fn instruction_at(&mut self, pc: u32) -> bool {
        if let Some(addr) = self.suppressed
            && pc != addr
        {
            self.breakpoints.insert(addr, true);
            self.suppressed = None;
        }

        if self.breakpoints.get(&pc).copied().unwrap_or(false) {
            self.breakpoint_hit = Some(pc);
            self.paused = true;
            true
        } else {
            false
        }
    }

    pub fn note_vblank(&mut self) {
        self.vblank_seen = true;
    }

    pub fn take_vblank(&mut self) -> bool {
        std::mem::take(&mut self.vblank_seen)
    }

    pub fn take_breakpoint_hit(&mut self) -> Option<u32> {
        self.breakpoint_hit.take()
    }

    pub fn set_section_base(&mut self, section: u32, base: u32) {
        match section {
            1 => self.section_bases.data = Some(base),
            2 => self.section_bases.bss = Some(base),
            _ => self.section_bases.text = Some(base),
        }
    }

    pub fn section_bases(&self) -> SectionBases {
        self.section_bases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_fires_only_when_enabled() {
        let mut debug = DebugState::default();
        debug.set_breakpoint(0x1234, true);
        debug.set_breakpoint(0x2000, false);

        assert!(debug.instruction_at(0x1234));
        assert_eq!(debug.take_breakpoint_hit(), Some(0x1234));
        assert!(debug.paused);

        assert!(!debug.instruction_at(0x2000));
        assert_eq!(debug.take_breakpoint_hit(), None);
    }

    #[test]
    fn addresses_masked_to_24_bits() {
        let mut debug = DebugState::default();
        debug.set_breakpoint(0xFF001234, true);
        assert!(debug.instruction_at(0x001234));
    }

    #[test]
    fn suppressed_breakpoint_rearms_on_next_differing_pc() {
        let mut debug = DebugState::default();
        debug.set_breakpoint(0x1234, true);

        assert!(debug.suppress_breakpoint(0x1234));
        // The instruction at the suppressed address no longer breaks
        assert!(!debug.instruction_at(0x1234));

        // First hook invocation at a different PC rearms the breakpoint
        assert!(!debug.instruction_at(0x1236));
        // Execution looping back now breaks again
        assert!(debug.instruction_at(0x1234));
    }

    #[test]
    fn suppress_requires_enabled_breakpoint() {
        let mut debug = DebugState::default();
        assert!(!debug.suppress_breakpoint(0x4000));

        debug.set_breakpoint(0x4000, false);
        assert!(!debug.suppress_breakpoint(0x4000));
    }

    #[test]
    fn vblank_latch_is_consumed() {
        let mut debug = DebugState::default();
        assert!(!debug.take_vblank());
        debug.note_vblank();
        assert!(debug.take_vblank());
        assert!(!debug.take_vblank());
    }
}
