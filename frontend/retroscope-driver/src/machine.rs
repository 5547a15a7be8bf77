//! In-memory mirror of the emulated CPU state at the last refresh.

use crate::corehost::CoreHost;
use crate::source::SourceCache;
use crate::symbolizer::SymbolizerClient;
use libretro_host::SectionBases;
use retroscope_common::addr::{format_code_address, mask_code_address};
use std::path::Path;
use std::str::FromStr;

const MAX_CALLSTACK_FRAMES: usize = 256;

const M68K_REGISTER_NAMES: [&str; 18] = [
    "D0", "D1", "D2", "D3", "D4", "D5", "D6", "D7", "A0", "A1", "A2", "A3", "A4", "A5", "A6", "A7",
    "SR", "PC",
];

/// The emulated systems the debugger knows how to drive. Both are 68000
/// machines; the differences are confined to the small tables below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemKind {
    #[default]
    NeoGeo,
    Amiga,
}

impl SystemKind {
    #[must_use]
    pub fn register_names(self) -> &'static [&'static str] {
        match self {
            Self::NeoGeo | Self::Amiga => &M68K_REGISTER_NAMES,
        }
    }

    #[must_use]
    pub fn default_toolchain_prefix(self) -> &'static str {
        match self {
            Self::NeoGeo => "m68k-neogeo-elf",
            Self::Amiga => "m68k-amigaos-",
        }
    }

    #[must_use]
    pub fn joypad_port(self) -> u32 {
        0
    }
}

impl FromStr for SystemKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "neogeo" => Ok(Self::NeoGeo),
            "amiga" => Ok(Self::Amiga),
            _ => Err(format!("unknown system '{raw}'")),
        }
    }
}

impl std::fmt::Display for SystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NeoGeo => write!(f, "neogeo"),
            Self::Amiga => write!(f, "amiga"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub name: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// 0 is the innermost frame (the program counter).
    pub level: usize,
    pub addr: u32,
    /// Resolved function name, or the address as hex when unresolved.
    pub func: String,
    /// Basename of the resolved source file; empty when unresolved.
    pub file: String,
    pub line: u32,
    /// Cached text of the resolved source line, for display.
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub enabled: bool,
    pub addr: u32,
}

/// Everything the callstack resolver needs besides the host.
pub struct RefreshContext<'a> {
    pub symbolizer: &'a mut SymbolizerClient,
    pub sources: &'a mut SourceCache,
    pub source_dir: Option<&'a Path>,
    /// `None` disables resolution (no ELF configured, or it failed validation).
    pub elf_path: Option<&'a Path>,
}

#[derive(Debug)]
pub struct MachineModel {
    system: SystemKind,
    registers: Vec<Register>,
    frames: Vec<StackFrame>,
    breakpoints: Vec<Breakpoint>,
    next_breakpoint_id: u32,
    running: bool,
    section_bases: SectionBases,
}

impl MachineModel {
    #[must_use]
    pub fn new(system: SystemKind) -> Self {
        Self {
            system,
            registers: Vec::new(),
            frames: Vec::new(),
            breakpoints: Vec::new(),
            next_breakpoint_id: 1,
            running: false,
            section_bases: SectionBases::default(),
        }
    }

    #[must_use]
    pub fn system(&self) -> SystemKind {
        self.system
    }

    #[must_use]
    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    #[must_use]
    pub fn callstack(&self) -> &[StackFrame] {
        &self.frames
    }

    #[must_use]
    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn section_bases(&self) -> SectionBases {
        self.section_bases
    }

    /// Track the running/paused flag. Returns `true` on the running→paused
    /// edge so the caller can refresh and notify.
    pub fn set_running(&mut self, running: bool) -> bool {
        let was_running = self.running;
        self.running = running;
        was_running && !running
    }

    pub fn find_register(&self, name: &str) -> Option<u64> {
        self.registers
            .iter()
            .find(|register| register.name.eq_ignore_ascii_case(name))
            .map(|register| register.value)
    }

    #[must_use]
    pub fn pc(&self) -> Option<u32> {
        self.find_register("PC").map(|value| mask_code_address(value as u32))
    }

    /// Replace registers and rebuild the callstack from the host's debug
    /// reads. Breakpoints persist across refreshes. Returns whether register
    /// state was available.
    pub fn refresh<H: CoreHost>(&mut self, host: &mut H, ctx: &mut RefreshContext<'_>) -> bool {
        self.section_bases = host.section_bases();

        self.registers.clear();
        let names = self.system.register_names();
        let mut values = vec![0_u32; names.len()];
        let count = host.read_registers(&mut values);
        let regs_ok = count > 0;
        for (name, &value) in names.iter().zip(&values[..count.min(names.len())]) {
            self.registers.push(Register { name: (*name).to_owned(), value: u64::from(value) });
        }

        self.frames.clear();
        let mut return_addrs = vec![0_u32; MAX_CALLSTACK_FRAMES];
        let count = host.read_callstack(&mut return_addrs);
        return_addrs.truncate(count);

        if let Some(pc) = self.pc() {
            self.frames.push(fill_frame(0, pc, ctx));
        }

        // The host delivers the return-address trail outermost first; the
        // model wants innermost first with the outermost return site last
        let base_level = self.frames.len();
        for (index, &addr) in return_addrs.iter().rev().enumerate() {
            let level = base_level + index;
            if level >= MAX_CALLSTACK_FRAMES {
                break;
            }
            self.frames.push(fill_frame(level, mask_code_address(addr), ctx));
        }

        regs_ok
    }

    pub fn find_breakpoint_by_addr(&self, addr: u32) -> Option<&Breakpoint> {
        let addr = mask_code_address(addr);
        self.breakpoints.iter().find(|breakpoint| breakpoint.addr == addr)
    }

    pub fn find_breakpoint_by_id(&self, id: u32) -> Option<&Breakpoint> {
        self.breakpoints.iter().find(|breakpoint| breakpoint.id == id)
    }

    /// Idempotent per address: re-adding an existing breakpoint returns the
    /// existing record, re-enabling it when `enabled` is requested. Ids are
    /// 1-based, strictly increasing, and never reused.
    pub fn add_breakpoint(&mut self, addr: u32, enabled: bool) -> Breakpoint {
        let addr = mask_code_address(addr);

        if let Some(index) = self.breakpoints.iter().position(|breakpoint| breakpoint.addr == addr)
        {
            if enabled {
                self.breakpoints[index].enabled = true;
            }
            return self.breakpoints[index];
        }

        let breakpoint = Breakpoint { id: self.next_breakpoint_id, enabled, addr };
        self.next_breakpoint_id += 1;
        self.breakpoints.push(breakpoint);
        breakpoint
    }

    /// Toggle by id, returning the masked address so the host can mirror the
    /// change.
    pub fn set_breakpoint_enabled(&mut self, id: u32, enabled: bool) -> Option<u32> {
        let breakpoint = self.breakpoints.iter_mut().find(|breakpoint| breakpoint.id == id)?;
        breakpoint.enabled = enabled;
        Some(breakpoint.addr)
    }

    /// Remove and compact. The id is retired, never reused.
    pub fn remove_breakpoint_by_addr(&mut self, addr: u32) -> bool {
        let addr = mask_code_address(addr);
        let before = self.breakpoints.len();
        self.breakpoints.retain(|breakpoint| breakpoint.addr != addr);
        self.breakpoints.len() != before
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }
}

fn fill_frame(level: usize, addr: u32, ctx: &mut RefreshContext<'_>) -> StackFrame {
    let mut frame = StackFrame {
        level,
        addr,
        func: format_code_address(addr),
        file: String::new(),
        line: 0,
        source: String::new(),
    };

    let Some(elf_path) = ctx.elf_path else {
        return frame;
    };
    if !ctx.symbolizer.start(elf_path) {
        return frame;
    }
    let Some(resolved) = ctx.symbolizer.resolve(addr) else {
        return frame;
    };

    if let Some(function) = resolved.function {
        frame.func = function;
    }
    frame.file = resolved
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    frame.line = resolved.line;

    // Prefer the configured source directory, falling back to the absolute
    // path the symbolizer reported
    let from_source_dir = ctx
        .source_dir
        .map(|dir| dir.join(&frame.file))
        .and_then(|path| ctx.sources.line(&path, frame.line).map(str::to_owned));
    frame.source = from_source_dir
        .or_else(|| ctx.sources.line(&resolved.file, frame.line).map(str::to_owned))
        .unwrap_or_default();

    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedHost;

    fn refresh_with(host: &mut ScriptedHost, model: &mut MachineModel) -> bool {
        let mut symbolizer = SymbolizerClient::new("/nonexistent-prefix");
        let mut sources = SourceCache::new();
        let mut ctx = RefreshContext {
            symbolizer: &mut symbolizer,
            sources: &mut sources,
            source_dir: None,
            elf_path: None,
        };
        model.refresh(host, &mut ctx)
    }

    #[test]
    fn breakpoint_ids_are_monotonic_and_never_reused() {
        let mut model = MachineModel::new(SystemKind::NeoGeo);

        let first = model.add_breakpoint(0x1000, true);
        let second = model.add_breakpoint(0x2000, true);
        assert_eq!((first.id, second.id), (1, 2));

        assert!(model.remove_breakpoint_by_addr(0x2000));
        let third = model.add_breakpoint(0x2000, true);
        assert_eq!(third.id, 3);

        let ids: Vec<u32> = model.breakpoints().iter().map(|breakpoint| breakpoint.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn add_breakpoint_is_idempotent_per_address() {
        let mut model = MachineModel::new(SystemKind::NeoGeo);

        let original = model.add_breakpoint(0x1234, true);
        model.set_breakpoint_enabled(original.id, false);

        // Re-adding with enabled re-enables the existing record
        let again = model.add_breakpoint(0x1234, true);
        assert_eq!(again.id, original.id);
        assert!(again.enabled);
        assert_eq!(model.breakpoints().len(), 1);

        // Re-adding disabled does not disable an enabled breakpoint
        let again = model.add_breakpoint(0x1234, false);
        assert!(again.enabled);
    }

    #[test]
    fn addresses_are_masked_everywhere() {
        let mut model = MachineModel::new(SystemKind::NeoGeo);

        let breakpoint = model.add_breakpoint(0xFF123456, true);
        assert_eq!(breakpoint.addr, 0x123456);
        assert!(model.find_breakpoint_by_addr(0x123456).is_some());
        assert!(model.find_breakpoint_by_addr(0xAA123456).is_some());
        assert!(model.remove_breakpoint_by_addr(0x01123456));
        assert!(model.breakpoints().is_empty());
    }

    #[test]
    fn set_enabled_returns_the_masked_address() {
        let mut model = MachineModel::new(SystemKind::NeoGeo);
        let breakpoint = model.add_breakpoint(0xFFABCDEF, true);

        assert_eq!(model.set_breakpoint_enabled(breakpoint.id, false), Some(0xABCDEF));
        assert!(!model.find_breakpoint_by_id(breakpoint.id).unwrap().enabled);
        assert_eq!(model.set_breakpoint_enabled(99, true), None);
    }

    #[test]
    fn register_lookup_is_case_insensitive() {
        let mut model = MachineModel::new(SystemKind::NeoGeo);
        let mut host = ScriptedHost::default();
        host.registers = (0..18).collect();

        assert!(refresh_with(&mut host, &mut model));
        assert_eq!(model.find_register("d3"), Some(3));
        assert_eq!(model.find_register("D3"), Some(3));
        assert_eq!(model.find_register("pc"), Some(17));
        assert_eq!(model.find_register("nope"), None);
    }

    #[test]
    fn callstack_has_pc_first_and_outermost_last() {
        let mut model = MachineModel::new(SystemKind::NeoGeo);
        let mut host = ScriptedHost::default();
        host.registers = vec![0; 18];
        host.registers[17] = 0x00401C; // PC
        // Outermost first, as the host delivers it
        host.callstack = vec![0x000100, 0x002000, 0x003000];

        assert!(refresh_with(&mut host, &mut model));

        let frames = model.callstack();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].level, 0);
        assert_eq!(frames[0].addr, 0x00401C);
        assert_eq!(frames[0].func, "0x00401C");
        assert_eq!(frames[1].addr, 0x003000);
        assert_eq!(frames[2].addr, 0x002000);
        assert_eq!(frames[3].addr, 0x000100);
        assert!(frames.iter().enumerate().all(|(index, frame)| frame.level == index));
    }

    #[test]
    fn refresh_clears_stale_state_but_keeps_breakpoints() {
        let mut model = MachineModel::new(SystemKind::NeoGeo);
        model.add_breakpoint(0x1000, true);

        let mut host = ScriptedHost::default();
        host.registers = (100..118).collect();
        host.callstack = vec![0x2000];
        assert!(refresh_with(&mut host, &mut model));
        assert_eq!(model.registers().len(), 18);

        // A host with no debug extension leaves an empty mirror
        let mut dead_host = ScriptedHost::default();
        assert!(!refresh_with(&mut dead_host, &mut model));
        assert!(model.registers().is_empty());
        assert!(model.callstack().is_empty());
        assert_eq!(model.breakpoints().len(), 1);
    }

    #[test]
    fn running_edge_is_reported_once() {
        let mut model = MachineModel::new(SystemKind::NeoGeo);
        assert!(!model.set_running(true));
        assert!(model.set_running(false));
        assert!(!model.set_running(false));
        assert!(!model.set_running(true));
    }
}
