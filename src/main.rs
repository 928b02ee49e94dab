use std::env;
use std::process;

use anyhow::Result;
use log::{error, info, LevelFilter};

use inspector_debugger::replay::{load_transcript, Replay};
use inspector_debugger::{Capabilities, DebuggerSettings, JsonFileSettingsStore, ManagerConfig, PKG_DESCRIPTION, VERSION};

struct Options {
    transcript: String,
    settings: Option<String>,
    legacy: bool,
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args);

    inspector_debugger::init_logging(if options.verbose { LevelFilter::Debug } else { LevelFilter::Warn });
    info!("Starting inspector-debugger v{}", VERSION);

    if let Err(e) = run(&options).await {
        error!("Replay failed: {:#}", e);
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(options: &Options) -> Result<()> {
    let steps = load_transcript(&options.transcript)?;

    let settings = match &options.settings {
        Some(path) => DebuggerSettings::load(Box::new(JsonFileSettingsStore::open(path)?)),
        None => DebuggerSettings::in_memory(),
    };
    let capabilities = if options.legacy { Capabilities::legacy() } else { Capabilities::modern() };

    let mut replay = Replay::start(capabilities, settings, ManagerConfig::default()).await?;
    for (index, step) in steps.iter().enumerate() {
        let events = replay.apply(step).await?;
        println!("{:>3} {}", index, step.name());
        for event in events {
            println!("      {:?}", event);
        }
    }

    print!("{}", replay.summary());
    Ok(())
}

fn parse_args(args: &[String]) -> Options {
    let program = args.first().map(String::as_str).unwrap_or("inspector-debugger");
    let mut options = Options {
        transcript: String::new(),
        settings: None,
        legacy: false,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-v" | "--version" => {
                println!("inspector-debugger v{}", VERSION);
                println!("{}", PKG_DESCRIPTION);
                process::exit(0);
            }
            "-h" | "--help" => {
                print_usage(program);
                process::exit(0);
            }
            "--settings" => {
                i += 1;
                match args.get(i) {
                    Some(path) => options.settings = Some(path.clone()),
                    None => {
                        eprintln!("--settings needs a path");
                        process::exit(1);
                    }
                }
            }
            "--legacy" => options.legacy = true,
            "--verbose" => options.verbose = true,
            arg => options.transcript = arg.to_string(),
        }
        i += 1;
    }

    if options.transcript.is_empty() {
        print_usage(program);
        process::exit(1);
    }
    options
}

fn print_usage(program: &str) {
    println!("Usage: {} [OPTIONS] <TRANSCRIPT>", program);
    println!();
    println!("Replays a JSON transcript of debugger actions against a scripted backend.");
    println!();
    println!("Options:");
    println!("  -h, --help           Show this help message");
    println!("  -v, --version        Show version information");
    println!("  --settings <PATH>    Persist settings in a JSON file");
    println!("  --legacy             Emulate a backend without newer protocol features");
    println!("  --verbose            Log debug output");
}
