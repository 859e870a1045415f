//! Console driver for the sBPF debugger bridge.
//!
//! Starts a session from a launch configuration (or a bare program
//! path) and drives it with single-letter commands, printing session
//! events as they arrive. Logs go to a file so they do not fight the
//! prompt.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use color_eyre::eyre::{self, Context};
use launch_configuration::{ChosenLaunchConfiguration, LaunchConfiguration, SbpfLaunch};
use session::{REGISTERS_REFERENCE, Session, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::filter::EnvFilter;

#[derive(Debug, Parser)]
struct Args {
    /// Path to a VS Code launch.json with sbpf configurations.
    #[clap(short, long)]
    launch_configuration: Option<PathBuf>,

    /// Name of the configuration to run.
    #[clap(short, long)]
    name: Option<String>,

    /// Program to debug directly, bypassing launch.json.
    program: Option<PathBuf>,

    /// Stop at the entry instruction before executing anything.
    #[clap(long)]
    stop_on_entry: bool,
}

fn resolve_launch(args: &Args) -> eyre::Result<SbpfLaunch> {
    if let Some(path) = &args.launch_configuration {
        let chosen = launch_configuration::load_from_path(args.name.as_ref(), path)
            .wrap_err("loading launch configuration")?;
        match chosen {
            ChosenLaunchConfiguration::Specific(LaunchConfiguration::Sbpf(mut launch)) => {
                launch.stop_on_entry |= args.stop_on_entry;
                Ok(launch)
            }
            ChosenLaunchConfiguration::NotFound => {
                eyre::bail!("no launch configuration with the given name")
            }
            ChosenLaunchConfiguration::ToBeChosen(names) => {
                eyre::bail!("choose a configuration with --name: {}", names.join(", "))
            }
        }
    } else if let Some(program) = &args.program {
        let mut launch = SbpfLaunch::from_program(program.clone());
        launch.stop_on_entry = args.stop_on_entry;
        Ok(launch)
    } else {
        eyre::bail!("either a launch configuration or a program path is required")
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install().wrap_err("installing color_eyre")?;
    let log_file = std::fs::File::create("sbpf-dap.log").wrap_err("creating log file")?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(Mutex::new(log_file))
        .init();

    let args = Args::parse();
    let config = resolve_launch(&args)?;
    let (session, mut events) = Session::launch(&config).wrap_err("starting session")?;
    println!("debugging {}", session.program().display());

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if handle_event(event) {
                        break;
                    }
                    prompt()?;
                }
                None => break,
            },
            line = input.next_line() => {
                let Ok(Some(line)) = line else { break };
                if handle_command(&session, line.trim()).await {
                    break;
                }
                prompt()?;
            }
        }
    }

    session.disconnect().await;
    Ok(())
}

fn prompt() -> eyre::Result<()> {
    print!("> ");
    std::io::stdout().flush().wrap_err("flushing prompt")
}

/// Print one session event. Returns true when the session is over.
fn handle_event(event: SessionEvent) -> bool {
    match event {
        SessionEvent::Stopped { reason } => println!("stopped: {reason}"),
        SessionEvent::Terminated { exit_code } => {
            match exit_code {
                Some(code) => println!("terminated (exit code {code})"),
                None => println!("terminated"),
            }
            return true;
        }
        SessionEvent::Output { output, .. } => println!("{output}"),
        SessionEvent::Fault { message } => println!("fault: {message}"),
        SessionEvent::ProtocolError { raw, reason } => {
            tracing::warn!(%raw, %reason, "protocol error from backend");
        }
    }
    false
}

/// Execute one console command. Returns true to quit.
async fn handle_command(session: &Session, input: &str) -> bool {
    let mut parts = input.split_whitespace();
    let result = match parts.next() {
        None => Ok(()),
        Some("q") => return true,
        Some("c") => session.continue_execution().await,
        Some("s") | Some("n") => session.next().await,
        Some("w") => match session.stack_trace().await {
            Ok(frames) => {
                for frame in frames {
                    println!(
                        "#{} {} at {}:{}",
                        frame.id,
                        frame.name,
                        frame.source_name.unwrap_or_else(|| "<unknown>".to_string()),
                        frame.line
                    );
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        Some("r") => match session.variables(REGISTERS_REFERENCE).await {
            Ok(registers) => {
                for register in registers {
                    println!("{:>4} = {}", register.name, register.value);
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        Some("cu") => match session.compute_units().await {
            Ok(units) => {
                println!(
                    "compute units: {}/{} used, {} remaining",
                    units.used, units.total, units.remaining
                );
                Ok(())
            }
            Err(e) => Err(e),
        },
        Some("b") => {
            let (Some(file), Some(line)) = (parts.next(), parts.next()) else {
                println!("usage: b <file> <line>");
                return false;
            };
            let Ok(line) = line.parse::<u64>() else {
                println!("not a line number: {line}");
                return false;
            };
            match session.set_breakpoints(file, &[line]).await {
                Ok(breakpoints) => {
                    for breakpoint in breakpoints {
                        println!(
                            "breakpoint at line {}: verified={}",
                            breakpoint.line, breakpoint.verified
                        );
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Some("set") => {
            let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
                println!("usage: set <register> <value>");
                return false;
            };
            match session.set_variable(REGISTERS_REFERENCE, name, value).await {
                Ok(variable) => {
                    println!("{} = {}", variable.name, variable.value);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Some("m") => {
            let (Some(address), Some(size)) = (parts.next(), parts.next()) else {
                println!("usage: m <address> <size>");
                return false;
            };
            let (Ok(address), Ok(size)) = (parse_u64(address), size.parse::<u64>()) else {
                println!("not a valid address/size pair");
                return false;
            };
            match session.read_memory(address, size).await {
                Ok(region) => {
                    println!("{:#x}: {:02x?}", region.address, region.data);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Some("i") => {
            match session.debug_info().await {
                Some(info) => println!(
                    "dwarf: {}, source files: {:?}",
                    info.has_dwarf, info.source_files
                ),
                None => println!("debug info not available yet"),
            }
            Ok(())
        }
        Some(other) => {
            println!("unknown command: '{other}' (c, s, w, r, cu, b, set, m, i, q)");
            Ok(())
        }
    };
    if let Err(e) = result {
        println!("error: {e}");
    }
    false
}

fn parse_u64(value: &str) -> Result<u64, std::num::ParseIntError> {
    match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    }
}
