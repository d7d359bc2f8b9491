use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use antiphon::midi::{list_input_ports, list_output_ports};
use antiphon::{Clock, Engine, GeneratorRegistry, InteractionConfig, MidiIo};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: antiphon <config.ron> | antiphon --list-ports";

fn main() -> ExitCode {
    let Some(arg) = std::env::args().nth(1) else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    if arg == "--list-ports" {
        init_logging("warn");
        return list_ports();
    }

    let path = PathBuf::from(arg);
    let mut config = match InteractionConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log);

    // Bundle paths are relative to the config file.
    let base = path.parent().map(PathBuf::from).unwrap_or_default();
    config.bundle_files = config.bundle_files.iter().map(|p| base.join(p)).collect();

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn list_ports() -> ExitCode {
    let listed = list_input_ports().and_then(|inputs| Ok((inputs, list_output_ports()?)));
    match listed {
        Ok((inputs, outputs)) => {
            println!("Inputs:");
            for name in inputs {
                println!("  {name}");
            }
            println!("Outputs:");
            for name in outputs {
                println!("  {name}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: InteractionConfig) -> Result<(), antiphon::EngineError> {
    let generators = GeneratorRegistry::with_builtins().load_all(&config.bundle_files)?;
    let io = MidiIo::open(&config.input_port, &config.output_port, Clock::new())?;
    let mut engine = Engine::start(config, generators, io)?;

    println!("Running. Press Enter to stop.");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);

    let status = engine.status();
    info!(cycle = status.cycle, phase = ?status.phase, "stopping");
    engine.stop();
    Ok(())
}
