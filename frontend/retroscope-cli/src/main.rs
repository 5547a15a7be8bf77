use anyhow::{Context, anyhow};
use clap::Parser;
use env_logger::Env;
use libretro_host::{HostConfig, LibretroHost};
use retroscope_common::addr::format_code_address;
use retroscope_common::timeutils;
use retroscope_driver::mainloop::Debugger;
use retroscope_driver::{AppConfig, InputRecord, SystemKind};
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_CONFIG_FILE: &str = "retroscope.cfg";

const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_RESTART: u8 = 2;

const CORE_OPTIONS_HEADING: &str = "Core Options";
const INPUT_OPTIONS_HEADING: &str = "Input Record Options";
const RUN_OPTIONS_HEADING: &str = "Run Options";

#[derive(Debug, Parser)]
struct Args {
    /// Override default config file path (retroscope.cfg)
    #[arg(long = "config")]
    config_path_override: Option<PathBuf>,

    /// Emulated system (neogeo, amiga)
    #[arg(long)]
    system: Option<SystemKind>,

    /// Emulator core library path
    #[arg(long, help_heading = CORE_OPTIONS_HEADING)]
    core: Option<PathBuf>,

    /// ROM/program path
    #[arg(short = 'f', long, help_heading = CORE_OPTIONS_HEADING)]
    rom: Option<PathBuf>,

    /// ELF with debug info for source-level callstacks
    #[arg(long, help_heading = CORE_OPTIONS_HEADING)]
    elf: Option<PathBuf>,

    /// Toolchain prefix for the addr2line helper
    #[arg(long, help_heading = CORE_OPTIONS_HEADING)]
    toolchain_prefix: Option<String>,

    /// BIOS/system directory handed to the core
    #[arg(long, help_heading = CORE_OPTIONS_HEADING)]
    bios_dir: Option<PathBuf>,

    /// Save directory handed to the core
    #[arg(long, help_heading = CORE_OPTIONS_HEADING)]
    save_dir: Option<PathBuf>,

    /// Directory the target program's source files live in
    #[arg(long, help_heading = CORE_OPTIONS_HEADING)]
    source_dir: Option<PathBuf>,

    /// Probe and print the core's option catalogue, then exit
    #[arg(long, help_heading = CORE_OPTIONS_HEADING)]
    probe_options: bool,

    /// Record input to this file
    #[arg(long, help_heading = INPUT_OPTIONS_HEADING)]
    record: Option<PathBuf>,

    /// Play back input from this file
    #[arg(long, help_heading = INPUT_OPTIONS_HEADING)]
    playback: Option<PathBuf>,

    /// Run without pacing or rolling snapshots until this many frames have
    /// completed, then exit
    #[arg(long, value_name = "FRAMES", help_heading = RUN_OPTIONS_HEADING)]
    headless_frames: Option<u64>,

    /// Stop a paced run after this many frames
    #[arg(long, value_name = "FRAMES", help_heading = RUN_OPTIONS_HEADING)]
    frames: Option<u64>,

    /// Start at warp speed (x10)
    #[arg(long, help_heading = RUN_OPTIONS_HEADING)]
    warp: bool,

    /// Disable rolling snapshot capture
    #[arg(long, help_heading = RUN_OPTIONS_HEADING)]
    no_rolling: bool,

    /// Plant a breakpoint at a hex code address; may be repeated
    #[arg(long = "break", value_name = "ADDR", help_heading = RUN_OPTIONS_HEADING)]
    breakpoints: Vec<String>,
}

impl Args {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(system) = self.system {
            config.system = system;
            config.toolchain_prefix = system.default_toolchain_prefix().to_owned();
        }
        if let Some(core) = &self.core {
            config.core_path = Some(core.clone());
        }
        if let Some(rom) = &self.rom {
            config.rom_path = Some(rom.clone());
        }
        if let Some(elf) = &self.elf {
            config.elf_path = Some(elf.clone());
        }
        if let Some(prefix) = &self.toolchain_prefix {
            config.toolchain_prefix = prefix.clone();
        }
        if let Some(bios_dir) = &self.bios_dir {
            config.system_dir = Some(bios_dir.clone());
        }
        if let Some(save_dir) = &self.save_dir {
            config.save_dir = Some(save_dir.clone());
        }
        if let Some(source_dir) = &self.source_dir {
            config.source_dir = Some(source_dir.clone());
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<u8> {
    let config_path =
        args.config_path_override.clone().unwrap_or_else(|| DEFAULT_CONFIG_FILE.into());
    let mut config = AppConfig::load(&config_path)?;
    args.apply_overrides(&mut config);

    let core_path = config
        .core_path
        .clone()
        .ok_or_else(|| anyhow!("No core library configured; pass --core or set core_path"))?;

    if args.probe_options {
        return probe_options(&core_path, &config);
    }

    let rom_path = config
        .rom_path
        .clone()
        .ok_or_else(|| anyhow!("No ROM configured; pass --rom or set rom_path"))?;

    let host_config = HostConfig {
        system_dir: config.system_dir.as_ref().map(|dir| dir.display().to_string()),
        save_dir: config.save_dir.as_ref().map(|dir| dir.display().to_string()),
        audio_enabled: config.audio_enabled,
        audio_buffer_ms: config.audio_buffer_ms,
        option_overrides: config.core_options.clone(),
    };

    let mut host = LibretroHost::load(&core_path, &host_config)
        .with_context(|| format!("Failed to load core '{}'", core_path.display()))?;
    host.start(&rom_path)
        .with_context(|| format!("Failed to start content '{}'", rom_path.display()))?;

    if let Some(enabled) = host.profiler_enabled() {
        log::info!("Core profiler is {}", if enabled { "enabled" } else { "disabled" });
    }

    let input_record = InputRecord::new(args.record.as_deref(), args.playback.as_deref())?;

    let mut debugger = Debugger::new(host, config, input_record);
    if args.warp {
        debugger.set_warp(true);
    }
    if args.no_rolling {
        debugger.disable_rolling_capture();
    }
    for raw_addr in &args.breakpoints {
        let addr = parse_hex_address(raw_addr)?;
        let breakpoint = debugger.add_breakpoint(addr, true);
        log::info!("Breakpoint {} at {}", breakpoint.id, format_code_address(breakpoint.addr));
    }

    let exit_code = if let Some(frame_limit) = args.headless_frames {
        debugger.run_headless(frame_limit)
    } else {
        run_paced(&mut debugger, args.frames)
    };

    let restart = debugger.restart_requested();
    debugger.shutdown();

    if restart {
        return Ok(EXIT_RESTART);
    }
    Ok(u8::try_from(exit_code).unwrap_or(EXIT_ERROR))
}

/// Real-time loop: tick, surface pauses on the console, sleep to the next
/// frame boundary.
fn run_paced(debugger: &mut Debugger<LibretroHost>, frame_limit: Option<u64>) -> i32 {
    let mut next_frame_nanos = timeutils::current_time_nanos();

    loop {
        let report = debugger.tick();

        if report.entered_pause {
            print_pause_state(debugger, report.breakpoint_hit);
            // There is no interactive surface here; resume so a planted
            // breakpoint traces instead of hanging the session
            debugger.continue_execution();
        }

        if let Some(limit) = frame_limit
            && debugger.frame_counter() >= limit
        {
            return 0;
        }
        if debugger.restart_requested() {
            return 0;
        }

        let frame_nanos = (1_000_000_000.0 / debugger.target_fps()) as u128;
        next_frame_nanos += frame_nanos;
        timeutils::sleep_until(next_frame_nanos);
    }
}

fn print_pause_state(debugger: &Debugger<LibretroHost>, breakpoint_hit: Option<u32>) {
    let machine = debugger.machine();

    match breakpoint_hit {
        Some(addr) => println!(
            "Breakpoint hit at {} (frame {})",
            format_code_address(addr),
            debugger.frame_counter()
        ),
        None => println!("Paused at frame {}", debugger.frame_counter()),
    }

    for chunk in machine.registers().chunks(6) {
        let line: Vec<String> = chunk
            .iter()
            .map(|register| format!("{}={:08X}", register.name, register.value))
            .collect();
        println!("  {}", line.join(" "));
    }

    for frame in machine.callstack() {
        if frame.file.is_empty() {
            println!("  #{} {}", frame.level, frame.func);
        } else {
            println!("  #{} {} ({}:{})", frame.level, frame.func, frame.file, frame.line);
            if !frame.source.is_empty() {
                println!("      {}", frame.source);
            }
        }
    }
}

fn probe_options(core_path: &std::path::Path, config: &AppConfig) -> anyhow::Result<u8> {
    let system_dir = config.system_dir.as_ref().map(|dir| dir.display().to_string());
    let save_dir = config.save_dir.as_ref().map(|dir| dir.display().to_string());

    let catalog =
        libretro_host::probe_core_options(core_path, system_dir.as_deref(), save_dir.as_deref())
            .with_context(|| format!("Failed to probe core '{}'", core_path.display()))?;

    if catalog.is_empty() {
        println!("Core publishes no options");
        return Ok(EXIT_OK);
    }

    for definition in &catalog.definitions {
        let desc = definition.desc.as_deref().unwrap_or("");
        let default = definition.default_value.as_deref().unwrap_or("");
        println!("{} \"{desc}\" (default: {default})", definition.key);
        for value in &definition.values {
            match &value.label {
                Some(label) => println!("    {} ({label})", value.value),
                None => println!("    {}", value.value),
            }
        }
    }

    Ok(EXIT_OK)
}

fn parse_hex_address(raw: &str) -> anyhow::Result<u32> {
    let trimmed = raw.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(trimmed, 16).with_context(|| format!("Invalid breakpoint address '{raw}'"))
}
