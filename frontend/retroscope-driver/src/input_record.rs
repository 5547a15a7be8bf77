//! Input recording and playback.
//!
//! A session either records live input to disk or replays input from disk,
//! never both. The file is line-oriented ASCII: a header line, then one line
//! per event tagged with the frame number it belongs to.

use crate::corehost::CoreHost;
use libretro_host::KeyEvent;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const FILE_HEADER: &str = "E9K_INPUT_V1";

/// Checkpoint histogram layout: 64 slots of six u64 counters
/// (current, accumulator, count, average, minimum, maximum).
const CHECKPOINT_SLOTS: usize = 64;
const CHECKPOINT_ENTRY_BYTES: usize = 6 * 8;

/// UI keys replayed through the record file drive profiler checkpoint actions.
pub const UI_KEY_CHECKPOINT_TOGGLE: u32 = b',' as u32;
pub const UI_KEY_CHECKPOINT_RESET: u32 = b'.' as u32;
pub const UI_KEY_CHECKPOINT_DUMP: u32 = b'/' as u32;

#[derive(Debug, Error)]
pub enum InputRecordError {
    #[error("--record and --playback are mutually exclusive")]
    BothPathsSet,
    #[error("Failed to open record file '{path}': {source}")]
    OpenRecord {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read playback file '{path}': {source}")]
    OpenPlayback {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Playback file '{path}' line {line_no}: frame numbers must not decrease")]
    NonMonotonic { path: PathBuf, line_no: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Joypad { port: u32, button_id: u32, pressed: bool },
    Key { keycode: u32, character: u32, modifiers: u16, pressed: bool },
    ClearAll,
    UiKey { keycode: u32, pressed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimedEvent {
    frame: u64,
    event: InputEvent,
}

#[derive(Debug, Default)]
enum Mode {
    #[default]
    Off,
    Record {
        writer: BufWriter<File>,
        path: PathBuf,
        events: Vec<TimedEvent>,
    },
    Playback {
        events: Vec<TimedEvent>,
        cursor: usize,
    },
}

#[derive(Debug, Default)]
pub struct InputRecord {
    mode: Mode,
    injecting: bool,
}

impl InputRecord {
    /// Set up recording or playback. Passing neither path yields an inert
    /// record that ignores every call.
    ///
    /// # Errors
    ///
    /// Returns an error if both paths are given, or the requested file cannot
    /// be opened/parsed.
    pub fn new(
        record_path: Option<&Path>,
        playback_path: Option<&Path>,
    ) -> Result<Self, InputRecordError> {
        match (record_path, playback_path) {
            (Some(_), Some(_)) => Err(InputRecordError::BothPathsSet),
            (Some(path), None) => {
                let file = File::create(path).map_err(|source| InputRecordError::OpenRecord {
                    path: path.to_path_buf(),
                    source,
                })?;
                let mut writer = BufWriter::new(file);
                writeln!(writer, "{FILE_HEADER}").and_then(|()| writer.flush()).map_err(
                    |source| InputRecordError::OpenRecord { path: path.to_path_buf(), source },
                )?;

                log::info!("Recording input to '{}'", path.display());
                Ok(Self {
                    mode: Mode::Record { writer, path: path.to_path_buf(), events: Vec::new() },
                    injecting: false,
                })
            }
            (None, Some(path)) => {
                let contents = fs::read_to_string(path).map_err(|source| {
                    InputRecordError::OpenPlayback { path: path.to_path_buf(), source }
                })?;

                let mut events: Vec<TimedEvent> = Vec::new();
                for (index, line) in contents.lines().enumerate() {
                    let Some(event) = parse_line(line) else {
                        if !line.trim().is_empty() && !line.starts_with(FILE_HEADER) {
                            log::warn!(
                                "Skipping malformed input record line {}: '{line}'",
                                index + 1
                            );
                        }
                        continue;
                    };

                    if let Some(last) = events.last()
                        && event.frame < last.frame
                    {
                        return Err(InputRecordError::NonMonotonic {
                            path: path.to_path_buf(),
                            line_no: index + 1,
                        });
                    }
                    events.push(event);
                }

                log::info!("Replaying {} input event(s) from '{}'", events.len(), path.display());
                Ok(Self { mode: Mode::Playback { events, cursor: 0 }, injecting: false })
            }
            (None, None) => Ok(Self::default()),
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        matches!(self.mode, Mode::Record { .. })
    }

    #[must_use]
    pub fn is_playback(&self) -> bool {
        matches!(self.mode, Mode::Playback { .. })
    }

    #[must_use]
    pub fn is_injecting(&self) -> bool {
        self.injecting
    }

    /// During playback, deliver every not-yet-applied event with
    /// `event.frame <= frame` into the host. Re-recording is suppressed while
    /// events are being injected.
    pub fn apply<H: CoreHost>(&mut self, frame: u64, host: &mut H) {
        let Mode::Playback { events, cursor } = &mut self.mode else { return };

        self.injecting = true;
        while let Some(timed) = events.get(*cursor) {
            if timed.frame > frame {
                break;
            }

            match timed.event {
                InputEvent::Joypad { port, button_id, pressed } => {
                    host.set_joypad(port, button_id, pressed);
                }
                InputEvent::Key { keycode, character, modifiers, pressed } => {
                    host.queue_key_event(KeyEvent { keycode, character, modifiers, pressed });
                }
                InputEvent::ClearAll => host.clear_joypad_state(),
                InputEvent::UiKey { keycode, pressed } => handle_ui_key(host, keycode, pressed),
            }
            *cursor += 1;
        }
        self.injecting = false;
    }

    pub fn record_joypad(&mut self, frame: u64, port: u32, button_id: u32, pressed: bool) {
        self.record(frame, InputEvent::Joypad { port, button_id, pressed });
    }

    pub fn record_key(
        &mut self,
        frame: u64,
        keycode: u32,
        character: u32,
        modifiers: u16,
        pressed: bool,
    ) {
        self.record(frame, InputEvent::Key { keycode, character, modifiers, pressed });
    }

    pub fn record_clear(&mut self, frame: u64) {
        self.record(frame, InputEvent::ClearAll);
    }

    pub fn record_ui_key(&mut self, frame: u64, keycode: u32, pressed: bool) {
        self.record(frame, InputEvent::UiKey { keycode, pressed });
    }

    fn record(&mut self, frame: u64, event: InputEvent) {
        if self.injecting {
            return;
        }
        let Mode::Record { writer, path, events } = &mut self.mode else { return };

        let timed = TimedEvent { frame, event };
        if let Err(err) = writeln!(writer, "{}", serialize_event(timed)).and_then(|()| writer.flush())
        {
            log::error!("Failed to append to input record '{}': {err}", path.display());
            return;
        }
        events.push(timed);
    }

    /// Forget the recorded "future" after a backwards seek: rewrite the record
    /// file keeping only events at or before `frame`. Recording continues from
    /// the branch point.
    pub fn truncate_after(&mut self, frame: u64) {
        let Mode::Record { writer, path, events } = &mut self.mode else { return };

        let retain = events.partition_point(|event| event.frame <= frame);
        if retain == events.len() {
            return;
        }
        events.truncate(retain);

        let rewrite = || -> io::Result<BufWriter<File>> {
            let mut new_writer = BufWriter::new(File::create(path.as_path())?);
            writeln!(new_writer, "{FILE_HEADER}")?;
            for event in events.iter() {
                writeln!(new_writer, "{}", serialize_event(*event))?;
            }
            new_writer.flush()?;
            Ok(new_writer)
        };

        match rewrite() {
            Ok(new_writer) => *writer = new_writer,
            Err(err) => {
                log::error!("Failed to truncate input record '{}': {err}", path.display());
            }
        }
    }

    /// After a backwards seek during playback, rewind the cursor so events
    /// past the seek target are delivered again as the timeline is rebuilt.
    /// The event list itself is untouched.
    pub fn rewind_cursor(&mut self, frame: u64) {
        let Mode::Playback { events, cursor } = &mut self.mode else { return };
        *cursor = events.partition_point(|event| event.frame <= frame);
    }
}

/// Perform the debugger action a UI key maps to, whether it arrives live or
/// from a replayed record.
pub(crate) fn handle_ui_key<H: CoreHost>(host: &mut H, keycode: u32, pressed: bool) {
    if !pressed {
        return;
    }

    match keycode {
        UI_KEY_CHECKPOINT_TOGGLE => {
            if let Some(enabled) = host.checkpoint_enabled() {
                host.set_checkpoint_enabled(!enabled);
            }
        }
        UI_KEY_CHECKPOINT_RESET => host.reset_checkpoints(),
        UI_KEY_CHECKPOINT_DUMP => dump_checkpoints(host),
        _ => {}
    }
}

fn dump_checkpoints<H: CoreHost>(host: &mut H) {
    let mut raw = [0_u8; CHECKPOINT_SLOTS * CHECKPOINT_ENTRY_BYTES];
    let bytes = host.read_checkpoints(&mut raw);
    let count = bytes / CHECKPOINT_ENTRY_BYTES;

    println!("Profiler checkpoints (avg/min/max):");
    for slot in 0..count {
        let entry = &raw[slot * CHECKPOINT_ENTRY_BYTES..(slot + 1) * CHECKPOINT_ENTRY_BYTES];
        let field =
            |index: usize| u64::from_le_bytes(entry[index * 8..(index + 1) * 8].try_into().unwrap());

        // Layout: current, accumulator, count, average, minimum, maximum
        if field(2) == 0 {
            continue;
        }
        println!("{slot:02} avg:{} min:{} max:{}", field(3), field(4), field(5));
    }
}

fn serialize_event(timed: TimedEvent) -> String {
    let frame = timed.frame;
    match timed.event {
        InputEvent::Joypad { port, button_id, pressed } => {
            format!("F {frame} J {port} {button_id} {}", u8::from(pressed))
        }
        InputEvent::Key { keycode, character, modifiers, pressed } => {
            format!("F {frame} K {keycode} {character} {modifiers} {}", u8::from(pressed))
        }
        InputEvent::ClearAll => format!("F {frame} C"),
        InputEvent::UiKey { keycode, pressed } => {
            format!("F {frame} U {keycode} {}", u8::from(pressed))
        }
    }
}

fn parse_line(line: &str) -> Option<TimedEvent> {
    let mut fields = line.split_ascii_whitespace();
    if fields.next()? != "F" {
        return None;
    }

    let frame: u64 = fields.next()?.parse().ok()?;
    let kind = fields.next()?;

    let next_u32 = |fields: &mut std::str::SplitAsciiWhitespace<'_>| -> Option<u32> {
        fields.next()?.parse().ok()
    };

    let event = match kind {
        "J" => {
            let port = next_u32(&mut fields)?;
            let button_id = next_u32(&mut fields)?;
            let pressed = next_u32(&mut fields)? != 0;
            InputEvent::Joypad { port, button_id, pressed }
        }
        "K" => {
            let keycode = next_u32(&mut fields)?;
            let character = next_u32(&mut fields)?;
            let modifiers = u16::try_from(next_u32(&mut fields)?).ok()?;
            let pressed = next_u32(&mut fields)? != 0;
            InputEvent::Key { keycode, character, modifiers, pressed }
        }
        "C" => InputEvent::ClearAll,
        "U" => {
            let keycode = next_u32(&mut fields)?;
            let pressed = next_u32(&mut fields)? != 0;
            InputEvent::UiKey { keycode, pressed }
        }
        _ => return None,
    };

    Some(TimedEvent { frame, event })
}

#[cfg(test)]
mod tests {
    use super::*;
    use libretro_host::{FrameReport, LibretroHostError};
    use std::env;

    #[derive(Debug, Default)]
    struct RecordingHost {
        joypad_events: Vec<(u64, u32, u32, bool)>,
        key_events: Vec<KeyEvent>,
        clears: u32,
        current_frame: u64,
        checkpoint_enabled: bool,
        checkpoint_resets: u32,
    }

    impl CoreHost for RecordingHost {
        fn run_frame(&mut self) -> FrameReport {
            FrameReport::default()
        }

        fn serialize_snapshot(&mut self) -> Result<&[u8], LibretroHostError> {
            Err(LibretroHostError::SerializeUnsupported)
        }

        fn unserialize(&mut self, _bytes: &[u8]) -> Result<(), LibretroHostError> {
            Ok(())
        }

        fn set_paused(&mut self, _paused: bool) {}

        fn read_registers(&mut self, _out: &mut [u32]) -> usize {
            0
        }

        fn read_callstack(&mut self, _out: &mut [u32]) -> usize {
            0
        }

        fn read_vram(&mut self, _out: &mut [u8]) -> usize {
            0
        }

        fn read_checkpoints(&mut self, _out: &mut [u8]) -> usize {
            0
        }

        fn set_breakpoint(&mut self, _addr: u32, _enabled: bool) {}

        fn remove_breakpoint(&mut self, _addr: u32) {}

        fn suppress_breakpoint_at(&mut self, _addr: u32) -> bool {
            false
        }

        fn set_joypad(&mut self, port: u32, button_id: u32, pressed: bool) {
            self.joypad_events.push((self.current_frame, port, button_id, pressed));
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

    fn temp_file(name: &str) -> PathBuf {
        env::temp_dir().join(format!("retroscope-input-{name}-{}", std::process::id()))
    }

    #[test]
    fn serialize_parse_round_trip() {
        let events = [
            TimedEvent { frame: 100, event: InputEvent::Joypad { port: 0, button_id: 4, pressed: true } },
            TimedEvent {
                frame: 101,
                event: InputEvent::Key { keycode: 13, character: 13, modifiers: 3, pressed: false },
            },
            TimedEvent { frame: 102, event: InputEvent::ClearAll },
            TimedEvent { frame: 103, event: InputEvent::UiKey { keycode: 44, pressed: true } },
        ];

        for event in events {
            assert_eq!(parse_line(&serialize_event(event)), Some(event));
        }

        assert!(parse_line(FILE_HEADER).is_none());
        assert!(parse_line("F 5 X 1 2").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn record_then_playback_delivers_at_original_frames() {
        let path = temp_file("roundtrip");

        let mut record = InputRecord::new(Some(&path), None).unwrap();
        assert!(record.is_recording());
        record.record_joypad(100, 0, 1, true);
        record.record_joypad(120, 0, 1, false);
        record.record_clear(150);
        drop(record);

        let mut playback = InputRecord::new(None, Some(&path)).unwrap();
        assert!(playback.is_playback());

        let mut host = RecordingHost::default();
        for frame in 0..=200 {
            host.current_frame = frame;
            playback.apply(frame, &mut host);
        }

        assert_eq!(host.joypad_events, vec![(100, 0, 1, true), (120, 0, 1, false)]);
        assert_eq!(host.clears, 1);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn events_are_delivered_once_and_in_order() {
        let path = temp_file("once");
        fs::write(&path, format!("{FILE_HEADER}\nF 5 J 0 2 1\nF 5 J 0 3 1\nF 9 C\n")).unwrap();

        let mut playback = InputRecord::new(None, Some(&path)).unwrap();
        let mut host = RecordingHost::default();

        // Applying the same frame twice must not re-deliver
        host.current_frame = 5;
        playback.apply(5, &mut host);
        playback.apply(5, &mut host);
        assert_eq!(host.joypad_events, vec![(5, 0, 2, true), (5, 0, 3, true)]);

        // Skipping ahead delivers everything not yet applied
        host.current_frame = 20;
        playback.apply(20, &mut host);
        assert_eq!(host.clears, 1);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn record_and_playback_are_mutually_exclusive() {
        let record = temp_file("excl-record");
        let playback = temp_file("excl-playback");
        assert!(matches!(
            InputRecord::new(Some(&record), Some(&playback)),
            Err(InputRecordError::BothPathsSet)
        ));
    }

    #[test]
    fn non_monotonic_playback_is_rejected() {
        let path = temp_file("nonmono");
        fs::write(&path, format!("{FILE_HEADER}\nF 10 C\nF 9 C\n")).unwrap();

        assert!(matches!(
            InputRecord::new(None, Some(&path)),
            Err(InputRecordError::NonMonotonic { line_no: 3, .. })
        ));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn ui_keys_drive_checkpoint_actions() {
        let path = temp_file("uikeys");
        fs::write(
            &path,
            format!(
                "{FILE_HEADER}\nF 1 U {UI_KEY_CHECKPOINT_TOGGLE} 1\nF 2 U {UI_KEY_CHECKPOINT_RESET} 1\nF 3 U {UI_KEY_CHECKPOINT_RESET} 0\n"
            ),
        )
        .unwrap();

        let mut playback = InputRecord::new(None, Some(&path)).unwrap();
        let mut host = RecordingHost::default();
        for frame in 0..=3 {
            playback.apply(frame, &mut host);
        }

        assert!(host.checkpoint_enabled);
        // Releases are ignored
        assert_eq!(host.checkpoint_resets, 1);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn truncate_after_drops_recorded_future() {
        let path = temp_file("truncate");

        let mut record = InputRecord::new(Some(&path), None).unwrap();
        record.record_joypad(10, 0, 1, true);
        record.record_joypad(50, 0, 1, false);
        record.record_clear(90);
        record.truncate_after(50);
        // Recording continues from the branch point
        record.record_joypad(60, 0, 2, true);
        drop(record);

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![FILE_HEADER, "F 10 J 0 1 1", "F 50 J 0 1 0", "F 60 J 0 2 1"]
        );

        fs::remove_file(&path).ok();
    }

    #[test]
    fn playback_cursor_rewind_replays_the_future() {
        let path = temp_file("rewind");
        fs::write(&path, format!("{FILE_HEADER}\nF 100 J 0 1 1\nF 120 J 0 1 0\n")).unwrap();

        let mut playback = InputRecord::new(None, Some(&path)).unwrap();
        let mut host = RecordingHost::default();

        for frame in 0..=130 {
            host.current_frame = frame;
            playback.apply(frame, &mut host);
        }
        assert_eq!(host.joypad_events.len(), 2);

        // Seek back to frame 90 and advance again: both events re-deliver
        playback.rewind_cursor(90);
        for frame in 91..=130 {
            host.current_frame = frame;
            playback.apply(frame, &mut host);
        }
        assert_eq!(
            host.joypad_events,
            vec![(100, 0, 1, true), (120, 0, 1, false), (100, 0, 1, true), (120, 0, 1, false)]
        );

        fs::remove_file(&path).ok();
    }

    #[test]
    fn recording_suppressed_while_injecting() {
        let path = temp_file("inject");
        let mut record = InputRecord::new(Some(&path), None).unwrap();

        record.injecting = true;
        record.record_joypad(5, 0, 1, true);
        record.injecting = false;
        record.record_joypad(6, 0, 1, true);
        drop(record);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2); // header + one event

        fs::remove_file(&path).ok();
    }
}
