// ABOUTME: Command-line driver for the Slate interpreter

use clap::Parser;
use log::debug;
use slate::eval::Interpreter;
use slate::{parse_source, PRELUDE};
use std::path::PathBuf;
use std::process::ExitCode;

/// Interpreter for the Slate scripting language
#[derive(Parser, Debug)]
#[command(name = "slate")]
#[command(version)]
#[command(about = "Runs a Slate source file")]
struct CliArgs {
    /// Slate source file to run
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,

    /// Print every global variable and constant after the program ends
    #[arg(long)]
    dump: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let level = if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Warn
    };
    simple_logger::init_with_level(level).expect("logger initializes once");

    let Some(path) = args.script else {
        eprintln!("No filepath given!");
        return ExitCode::FAILURE;
    };

    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Cannot read {}: {}", path.display(), error);
            return ExitCode::FAILURE;
        }
    };

    let interpreter = Interpreter::new();
    if let Err(message) = load_prelude(&interpreter) {
        eprintln!("Prelude error: {}", message);
        return ExitCode::FAILURE;
    }

    match parse_source(&source) {
        Ok(program) => {
            debug!("parsed {} top-level statements", program.len());
            if let Err(error) = interpreter.run(&program) {
                // The first runtime error halts the remaining statements;
                // bindings made before it survive for the dump below.
                eprintln!("Error: {}", error);
            }
        }
        Err(errors) => {
            debug!("parsing failed, program will not run");
            for error in &errors {
                eprintln!("Error: {}", error);
            }
        }
    }

    if args.dump {
        dump_bindings(&interpreter);
    }
    ExitCode::SUCCESS
}

/// The prelude ships inside the binary; failing to evaluate it is a build
/// defect, not a user error.
fn load_prelude(interpreter: &Interpreter) -> Result<(), String> {
    let nodes = parse_source(PRELUDE).map_err(|errors| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    })?;
    interpreter.run(&nodes).map_err(|error| error.to_string())?;
    debug!("prelude loaded");
    Ok(())
}

fn dump_bindings(interpreter: &Interpreter) {
    let globals = interpreter.globals();
    for (name, value) in globals.variable_bindings() {
        println!("var {} = {}", name, value);
    }
    for (name, value) in globals.constant_bindings() {
        println!("const {} = {}", name, value);
    }
}
