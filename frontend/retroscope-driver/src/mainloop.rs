//! The execution controller: the frame-driven run loop and the seek,
//! frame-step, and breakpoint plumbing around it.

use crate::config::AppConfig;
use crate::corehost::CoreHost;
use crate::input_record::{self, InputRecord};
use crate::machine::{Breakpoint, MachineModel, RefreshContext};
use crate::source::SourceCache;
use crate::state_ring::{SnapshotRecord, StateRing};
use crate::symbolizer::SymbolizerClient;
use crate::elf;
use libretro_host::KeyEvent;
use retroscope_common::addr::mask_code_address;

pub const WARP_MULTIPLIER: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Normal forward execution.
    #[default]
    Live,
    /// Execute exactly one frame, forward or backward, then pause.
    FrameStep,
    /// Do not tick the emulator.
    Paused,
    /// A seek is in progress; drag events drive restores.
    Restore,
    /// No UI present; tick as fast as possible to a terminating condition.
    Headless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPhase {
    BeginDrag,
    Drag,
    Release,
}

/// What one call to [`Debugger::tick`] did, for the UI to react to.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    pub frames_advanced: u64,
    /// The running→paused transition happened this tick; refresh displays and
    /// surface the pause.
    pub entered_pause: bool,
    pub breakpoint_hit: Option<u32>,
}

/// The debugger aggregate: owns the emulator host, the machine mirror, the
/// time-travel ring, input recording, and the symbolizer, and orchestrates
/// them one frame at a time. Everything lives on the main thread.
pub struct Debugger<H> {
    host: H,
    machine: MachineModel,
    ring: StateRing,
    input_record: InputRecord,
    symbolizer: SymbolizerClient,
    sources: SourceCache,
    config: AppConfig,
    elf_valid: bool,
    mode: RunMode,
    mode_before_seek: RunMode,
    headless: bool,
    frame_counter: u64,
    speed_multiplier: u64,
    frame_step_pending: i8,
    snapshots_unsupported: bool,
    restart_requested: bool,
}

impl<H: CoreHost> Debugger<H> {
    pub fn new(host: H, config: AppConfig, input_record: InputRecord) -> Self {
        let elf_valid = config.elf_valid()
            && config.elf_path.as_deref().is_some_and(|path| elf::text_bounds(path).is_some());
        if config.elf_path.is_some() && !elf_valid {
            log::warn!("Configured ELF is missing or unreadable; callstacks will show raw addresses");
        }

        let mut machine = MachineModel::new(config.system);
        machine.set_running(true);

        Self {
            host,
            machine,
            ring: StateRing::from_env(),
            input_record,
            symbolizer: SymbolizerClient::new(&config.toolchain_prefix),
            sources: SourceCache::new(),
            config,
            elf_valid,
            mode: RunMode::Live,
            mode_before_seek: RunMode::Live,
            headless: false,
            frame_counter: 0,
            speed_multiplier: 1,
            frame_step_pending: 0,
            snapshots_unsupported: false,
            restart_requested: false,
        }
    }

    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    #[must_use]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    #[must_use]
    pub fn machine(&self) -> &MachineModel {
        &self.machine
    }

    #[must_use]
    pub fn ring(&self) -> &StateRing {
        &self.ring
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[must_use]
    pub fn target_fps(&self) -> f64 {
        self.host.target_fps()
    }

    #[must_use]
    pub fn speed_multiplier(&self) -> u64 {
        self.speed_multiplier
    }

    /// Toggle between real-time and warp speed.
    pub fn toggle_speed(&mut self) {
        self.speed_multiplier =
            if self.speed_multiplier == WARP_MULTIPLIER { 1 } else { WARP_MULTIPLIER };
    }

    pub fn set_warp(&mut self, warp: bool) {
        self.speed_multiplier = if warp { WARP_MULTIPLIER } else { 1 };
    }

    /// Disable rolling snapshot capture (headless / smoke / --no-rolling).
    pub fn disable_rolling_capture(&mut self) {
        self.ring.set_rolling_paused(true);
    }

    /// Ask the hosting process to exit and relaunch.
    pub fn request_restart(&mut self) {
        self.restart_requested = true;
    }

    #[must_use]
    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    /// Run one scheduling quantum: up to `speed_multiplier` frames in Live
    /// mode, one pending step in FrameStep/Paused, nothing while seeking.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        match self.mode {
            RunMode::Restore => {}
            RunMode::Paused | RunMode::FrameStep => match self.frame_step_pending {
                1 => {
                    self.frame_step_pending = 0;
                    self.host.set_paused(false);
                    self.advance_frame(&mut report);
                    if report.breakpoint_hit.is_none() {
                        self.enter_pause(&mut report);
                    }
                }
                -1 => {
                    self.frame_step_pending = 0;
                    self.step_backward(&mut report);
                }
                _ => {}
            },
            RunMode::Live | RunMode::Headless => {
                let frames = if self.mode == RunMode::Headless { 1 } else { self.speed_multiplier };
                for _ in 0..frames {
                    self.advance_frame(&mut report);
                    if self.mode != RunMode::Live && self.mode != RunMode::Headless {
                        break;
                    }
                }
            }
        }

        report
    }

    /// No UI: tick flat out until `frame_limit` frames have completed.
    /// Breakpoints are stepped over so a stray breakpoint cannot hang an
    /// unattended run. Returns the process exit code to propagate.
    pub fn run_headless(&mut self, frame_limit: u64) -> i32 {
        self.headless = true;
        self.mode = RunMode::Headless;
        self.ring.set_rolling_paused(true);

        while self.frame_counter < frame_limit {
            let report = self.tick();
            if report.frames_advanced == 0 {
                if self.mode == RunMode::Paused {
                    self.continue_execution();
                } else {
                    log::error!(
                        "Headless run stalled at frame {} in mode {:?}",
                        self.frame_counter,
                        self.mode
                    );
                    return 1;
                }
            }
        }

        0
    }

    fn advance_frame(&mut self, report: &mut TickReport) {
        let next_frame = self.frame_counter + 1;
        self.input_record.apply(next_frame, &mut self.host);

        let frame = self.host.run_frame();

        if let Some(addr) = frame.breakpoint_hit {
            // The frame did not complete: no snapshot, no counter bump
            report.breakpoint_hit = Some(addr);
            self.enter_pause(report);
            return;
        }

        if frame.vblank && !self.snapshots_unsupported {
            match self.host.serialize_snapshot() {
                Ok(bytes) => {
                    // A refused push leaves a gap in the timeline; execution
                    // continues regardless
                    self.ring.push(next_frame, bytes);
                }
                Err(err @ libretro_host::LibretroHostError::SerializeUnsupported) => {
                    log::warn!("{err}; time travel disabled for this session");
                    self.snapshots_unsupported = true;
                }
                Err(err) => {
                    log::warn!("Snapshot skipped for frame {next_frame}: {err}");
                }
            }
        }

        self.frame_counter = next_frame;
        report.frames_advanced += 1;
    }

    fn enter_pause(&mut self, report: &mut TickReport) {
        self.mode = RunMode::Paused;
        self.frame_step_pending = 0;
        self.host.set_paused(true);
        self.refresh_machine();
        self.machine.set_running(false);
        report.entered_pause = true;
    }

    fn refresh_machine(&mut self) {
        let mut ctx = RefreshContext {
            symbolizer: &mut self.symbolizer,
            sources: &mut self.sources,
            source_dir: self.config.source_dir.as_deref(),
            elf_path: if self.elf_valid { self.config.elf_path.as_deref() } else { None },
        };
        self.machine.refresh(&mut self.host, &mut ctx);
    }

    /// Resume execution. When the program counter already sits on an enabled
    /// breakpoint, that breakpoint is lifted for exactly one instruction so
    /// execution can leave the address instead of immediately re-breaking.
    pub fn continue_execution(&mut self) {
        if let Some(pc) = self.machine.pc()
            && self.machine.find_breakpoint_by_addr(pc).is_some_and(|breakpoint| breakpoint.enabled)
        {
            self.host.suppress_breakpoint_at(pc);
        }

        self.frame_step_pending = 0;
        self.mode = if self.headless { RunMode::Headless } else { RunMode::Live };
        self.host.set_paused(false);
        self.machine.set_running(true);
    }

    /// Pause without a breakpoint. Returns whether this was the
    /// running→paused edge.
    pub fn pause(&mut self) -> bool {
        let mut report = TickReport::default();
        self.enter_pause(&mut report);
        report.entered_pause
    }

    /// Queue a single-frame step; the next [`Self::tick`] executes it.
    pub fn request_frame_step(&mut self, backward: bool) {
        self.mode = RunMode::FrameStep;
        self.frame_step_pending = if backward { -1 } else { 1 };
    }

    pub fn clear_frame_step(&mut self) {
        self.frame_step_pending = 0;
        if self.mode == RunMode::FrameStep {
            self.mode = RunMode::Paused;
        }
    }

    fn step_backward(&mut self, report: &mut TickReport) {
        if let Some(previous) = self.frame_counter.checked_sub(1)
            && let Some((frame_no, bytes)) = self.ring.snapshot_for_frame(previous)
        {
            match self.host.unserialize(&bytes) {
                Ok(()) => {
                    self.rewind_timeline_to(frame_no);
                }
                Err(err) => log::error!("Backward step restore failed: {err}"),
            }
        }

        self.enter_pause(report);
    }

    /// Seek-bar protocol: `(phase, percent)` events from the UI. Returns
    /// whether the machine model was refreshed (the UI should redraw).
    pub fn handle_seek(&mut self, phase: SeekPhase, percent: f64) -> bool {
        match phase {
            SeekPhase::BeginDrag => {
                self.ring.set_paused(true);
                // A seek-drag cancels any pending frame-step; a cancelled
                // step leaves the debugger paused when the drag ends
                self.frame_step_pending = 0;
                if self.mode != RunMode::Restore {
                    self.mode_before_seek = match self.mode {
                        RunMode::FrameStep => RunMode::Paused,
                        mode => mode,
                    };
                    self.mode = RunMode::Restore;
                }
                false
            }
            SeekPhase::Drag => self.restore_at_percent(percent),
            SeekPhase::Release => {
                let refreshed = self.restore_at_percent(percent);
                if let Some(target) =
                    self.ring.record_at_percent(percent).map(SnapshotRecord::frame_no)
                {
                    self.rewind_timeline_to(target);
                }
                self.ring.set_paused(false);
                self.mode = self.mode_before_seek;
                refreshed
            }
        }
    }

    fn restore_at_percent(&mut self, percent: f64) -> bool {
        let Some((frame_no, bytes)) = self.ring.snapshot_at_percent(percent) else {
            return false;
        };

        match self.host.unserialize(&bytes) {
            Ok(()) => {
                self.frame_counter = frame_no;
                self.refresh_machine();
                true
            }
            Err(err) => {
                log::error!("Seek restore to frame {frame_no} failed: {err}");
                false
            }
        }
    }

    /// Discard the timeline's future past `frame_no`: ring records, and
    /// recorded input when the input source is live. A replayed input file
    /// keeps its events and only rewinds its cursor, so the original timeline
    /// reproduces when execution advances again.
    fn rewind_timeline_to(&mut self, frame_no: u64) {
        self.ring.trim_after(frame_no);
        self.frame_counter = self.frame_counter.min(frame_no);

        if self.input_record.is_recording() {
            self.input_record.truncate_after(frame_no);
        } else {
            self.input_record.rewind_cursor(frame_no);
        }
    }

    // Live input entry points. Events take effect on the upcoming frame and
    // are recorded under that frame number so playback re-applies them at the
    // same point.

    pub fn set_joypad_input(&mut self, port: u32, button_id: u32, pressed: bool) {
        self.host.set_joypad(port, button_id, pressed);
        self.input_record.record_joypad(self.frame_counter + 1, port, button_id, pressed);
    }

    pub fn send_key_event(&mut self, event: KeyEvent) {
        self.host.queue_key_event(event);
        self.input_record.record_key(
            self.frame_counter + 1,
            event.keycode,
            event.character,
            event.modifiers,
            event.pressed,
        );
    }

    pub fn clear_joypad_input(&mut self) {
        self.host.clear_joypad_state();
        self.input_record.record_clear(self.frame_counter + 1);
    }

    pub fn handle_ui_key(&mut self, keycode: u32, pressed: bool) {
        input_record::handle_ui_key(&mut self.host, keycode, pressed);
        self.input_record.record_ui_key(self.frame_counter + 1, keycode, pressed);
    }

    // Breakpoint operations keep the model (ids, display) and the host's
    // authoritative set in lockstep.

    pub fn add_breakpoint(&mut self, addr: u32, enabled: bool) -> Breakpoint {
        let breakpoint = self.machine.add_breakpoint(addr, enabled);
        self.host.set_breakpoint(breakpoint.addr, breakpoint.enabled);
        breakpoint
    }

    pub fn set_breakpoint_enabled(&mut self, id: u32, enabled: bool) -> bool {
        match self.machine.set_breakpoint_enabled(id, enabled) {
            Some(addr) => {
                self.host.set_breakpoint(addr, enabled);
                true
            }
            None => false,
        }
    }

    pub fn remove_breakpoint(&mut self, addr: u32) -> bool {
        let removed = self.machine.remove_breakpoint_by_addr(addr);
        if removed {
            self.host.remove_breakpoint(mask_code_address(addr));
        }
        removed
    }

    /// Stop the symbolizer and release the host. The host's teardown always
    /// reaches the plug-in's deinit, from any state.
    pub fn shutdown(mut self) {
        self.symbolizer.stop();
        drop(self.input_record);
    }
}
