//! CLI entry point for the BNS emulator.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use bns::config::Config;
use bns::emu::machine::{Bns, Variant};
use bns::synth::phonemes::PhonemeBank;
use bns::synth::Ssi263Synth;

/// Set from the SIGINT handler; polled by the run loop.
static STOP: AtomicBool = AtomicBool::new(false);

fn usage() {
    eprintln!("Usage: bns [options] <rom_file>");
    eprintln!("  --audio            enable SSI-263 audio output");
    eprintln!("  --trace            show boot trace instead of running");
    eprintln!("  --cycles N         stop after N CPU cycles (0 = unbounded)");
    eprintln!("  --variant NAME     machine variant: bsplus (default) or bl40");
    eprintln!("  --phonemes FILE    extracted phoneme bank (SSIP format)");
    eprintln!("  --io-trace         dump every I/O port access");
    eprintln!("  --irq-trace        log interrupt-line edges");
    eprintln!("  --itc-trace        decode ITC register writes");
    eprintln!("  --watch ADDR       trace writes to a physical address (hex, repeatable)");
    eprintln!("  --watch-range A:B  trace writes inside a physical range (hex)");
    eprintln!("  --watch-first N    trace the first N physical writes");
    eprintln!("  --census FILE      dump per-address write counts as CSV on exit");
}

struct Args {
    rom: PathBuf,
    trace_boot: bool,
    cycles: u64,
    census: Option<PathBuf>,
    watch_addrs: Vec<u32>,
    watch_range: Option<(u32, u32)>,
    watch_first: u32,
    config: Config,
}

fn parse_hex(s: &str) -> Option<u32> {
    u32::from_str_radix(s.trim_start_matches("0x").trim_start_matches("0X"), 16).ok()
}

fn parse_args(config: Config) -> Result<Args, String> {
    let mut args = Args {
        rom: PathBuf::new(),
        trace_boot: false,
        cycles: 0,
        census: None,
        watch_addrs: Vec::new(),
        watch_range: None,
        watch_first: 0,
        config,
    };

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut rom: Option<PathBuf> = None;
    let mut i = 0;

    fn value(argv: &[String], i: &mut usize) -> Result<String, String> {
        *i += 1;
        argv.get(*i)
            .cloned()
            .ok_or_else(|| format!("{} needs a value", argv[*i - 1]))
    }

    while i < argv.len() {
        match argv[i].as_str() {
            "--audio" => args.config.audio = true,
            "--trace" => args.trace_boot = true,
            "--io-trace" => args.config.trace_io = true,
            "--irq-trace" => args.config.trace_irq = true,
            "--itc-trace" => args.config.trace_itc = true,
            "--cycles" => {
                let v = value(&argv, &mut i)?;
                args.cycles = v.parse().map_err(|_| format!("bad cycle count '{v}'"))?;
            }
            "--variant" => {
                let v = value(&argv, &mut i)?;
                Variant::from_name(&v).ok_or_else(|| format!("unknown variant '{v}'"))?;
                args.config.variant = v;
            }
            "--phonemes" => args.config.phoneme_bank = Some(value(&argv, &mut i)?),
            "--watch" => {
                let v = value(&argv, &mut i)?;
                let addr = parse_hex(&v).ok_or_else(|| format!("bad address '{v}'"))?;
                args.watch_addrs.push(addr);
            }
            "--watch-range" => {
                let v = value(&argv, &mut i)?;
                let range = v
                    .split_once(':')
                    .and_then(|(a, b)| Some((parse_hex(a)?, parse_hex(b)?)))
                    .ok_or_else(|| format!("bad range '{v}' (expected LO:HI)"))?;
                args.watch_range = Some(range);
            }
            "--watch-first" => {
                let v = value(&argv, &mut i)?;
                args.watch_first = v.parse().map_err(|_| format!("bad count '{v}'"))?;
            }
            "--census" => args.census = Some(PathBuf::from(value(&argv, &mut i)?)),
            flag if flag.starts_with("--") => return Err(format!("unknown option '{flag}'")),
            path => rom = Some(PathBuf::from(path)),
        }
        i += 1;
    }

    args.rom = rom.ok_or_else(|| "no ROM file given".to_string())?;
    Ok(args)
}

#[cfg(unix)]
fn install_sigint_handler() {
    extern "C" fn on_sigint(_: libc::c_int) {
        STOP.store(true, Ordering::Relaxed);
    }
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as usize);
    }
}

#[cfg(not(unix))]
fn install_sigint_handler() {}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args(Config::load()) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("[bns] Error: {e}\n");
            usage();
            return ExitCode::FAILURE;
        }
    };

    let variant = Variant::from_name(&args.config.variant).unwrap_or(Variant::BsPlus);
    // The Z180 instruction engine is an external component; without
    // one bound the facade runs degraded (no bus traffic).
    let mut machine = Bns::new(variant, args.config.clock_hz, None);

    machine.board.io.tracing = args.config.trace_io;
    machine.board.irq.trace = args.config.trace_irq;
    machine.board.trace_itc = args.config.trace_itc;
    machine.board.memory.watch.addrs = args.watch_addrs.clone();
    machine.board.memory.watch.range = args.watch_range;
    machine.board.memory.watch.first_n = args.watch_first;
    if args.census.is_some() {
        machine.board.memory.enable_write_census();
    }

    if args.config.audio {
        let bank =
            PhonemeBank::load_or_builtin(args.config.phoneme_bank.as_deref().map(Path::new));
        machine.attach_synth(Ssi263Synth::new(bank));
    }

    if let Err(e) = machine.load_rom_file(&args.rom) {
        eprintln!("[bns] Cannot load ROM {}: {e}", args.rom.display());
        return ExitCode::FAILURE;
    }
    let mut config = args.config.clone();
    config.remember_rom_dir(&args.rom);

    machine.reset();

    if args.trace_boot {
        machine.trace_boot();
        return ExitCode::SUCCESS;
    }

    install_sigint_handler();
    machine.run(args.cycles, &STOP);

    if let Some(path) = &args.census {
        match machine.dump_write_census(path) {
            Ok(()) => eprintln!("[bns] Write census saved to {}", path.display()),
            Err(e) => eprintln!("[bns] Cannot write census: {e}"),
        }
    }

    ExitCode::SUCCESS
}
