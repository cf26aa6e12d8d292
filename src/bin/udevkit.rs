//! udevkit command line
//!
//! Lists devices, resolves ancestor chains and watches hotplug events on the
//! host's udev. All output is JSON, one document per line.

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use udevkit::{Channel, DeviceNode, Devices, DevicesConfig, SummaryPadding, UdevSubsystem};

enum Command {
    List { subsystem: Option<String> },
    Chain { syspath: String },
    Summary { syspath: String, pad: bool },
    Monitor { subsystem: Option<String>, once: bool },
}

fn usage() {
    println!("udevkit - device enumeration and monitoring");
    println!();
    println!("USAGE:");
    println!("    udevkit list [--subsystem <NAME>]");
    println!("    udevkit chain <SYSPATH>");
    println!("    udevkit summary <SYSPATH> [--pad]");
    println!("    udevkit monitor [--subsystem <NAME>] [--once]");
    println!();
    println!("OPTIONS:");
    println!("    -s, --subsystem <NAME>    Restrict to one subsystem");
    println!("        --pad                 Pad missing summary fields with null");
    println!("        --once                Stop after the first added device");
    println!("    -h, --help                Print help information");
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        return Err("missing command".to_string());
    };

    let mut subsystem = None;
    let mut positional = None;
    let mut pad = false;
    let mut once = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--subsystem" | "-s" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| "--subsystem requires a value".to_string())?;
                subsystem = Some(value.clone());
                i += 2;
            }
            "--pad" => {
                pad = true;
                i += 1;
            }
            "--once" => {
                once = true;
                i += 1;
            }
            arg if arg.starts_with('-') => return Err(format!("unknown argument: {arg}")),
            arg => {
                if positional.replace(arg.to_string()).is_some() {
                    return Err(format!("unexpected argument: {arg}"));
                }
                i += 1;
            }
        }
    }

    let syspath = || positional.clone().ok_or_else(|| format!("{command} requires a <SYSPATH>"));
    match command.as_str() {
        "list" => Ok(Command::List { subsystem }),
        "chain" => Ok(Command::Chain { syspath: syspath()? }),
        "summary" => Ok(Command::Summary {
            syspath: syspath()?,
            pad,
        }),
        "monitor" => Ok(Command::Monitor { subsystem, once }),
        "--help" | "-h" | "help" => {
            usage();
            std::process::exit(0);
        }
        other => Err(format!("unknown command: {other}")),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List { subsystem } => {
            let devices = Devices::udev();
            let list = match subsystem.as_deref() {
                Some(s) => devices.list_subsystem(s)?,
                None => devices.list()?,
            };
            for device in &list {
                print_json(device)?;
            }
        }
        Command::Chain { syspath } => {
            let chain = Devices::udev().resolve_chain(&DeviceNode::new(syspath))?;
            print_json(&chain)?;
        }
        Command::Summary { syspath, pad } => {
            let mut config = DevicesConfig::default();
            if pad {
                config.resolver.padding = SummaryPadding::Null;
            }
            let devices = Devices::with_config(Arc::new(UdevSubsystem::new()), config);
            print_json(&devices.summarize(&DeviceNode::new(syspath))?)?;
        }
        Command::Monitor { subsystem, once } => {
            let monitor = Devices::udev().monitor(subsystem.as_deref())?;
            let handle = monitor.handle();

            for channel in Channel::ALL {
                let handle = handle.clone();
                monitor.on(channel, move |device| {
                    let line = serde_json::json!({ "action": channel, "device": device });
                    println!("{line}");
                    if once && channel == Channel::Add {
                        handle.close();
                    }
                });
            }

            tracing::info!(subsystem = ?subsystem, "watching device events");
            // Blocks until the monitor closes.
            let closed = monitor.stream(Channel::Add);
            for _ in closed.iter() {}
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("udevkit=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = match parse_args() {
        Ok(command) => command,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!();
            usage();
            return ExitCode::FAILURE;
        }
    };

    match run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
