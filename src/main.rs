extern crate clap;
#[macro_use] extern crate log;
#[macro_use] extern crate lazy_static;
extern crate fern;
extern crate chrono;
extern crate term_grid;

pub mod compiler;

use clap::{Arg, ArgMatches, App};
use term_grid::{Grid, GridOptions, Direction, Filling, Cell};

use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

use compiler::ast::Instruction;
use compiler::fixture::{Expected, FixtureError, Mismatch};
use compiler::interpreter::{Machine, RuntimeError};
use compiler::CompileError;

fn main() {
    let args = process_arguments();
    initialize_logging(args.occurrences_of("verbose"));

    debug!("Arguments:\n\tVerbosity: {}\n\tRun: {}\n\tExpect: {}\n\tOutfile: {}\n\tInfile: {}",
        verbosity_level(args.occurrences_of("verbose")),
        args.is_present("run"),
        args.value_of("expect").unwrap_or("None"),
        args.value_of("output").unwrap_or("None"),
        args.value_of("INPUT").unwrap_or("None")
    );

    // clap rejects the invocation before we get here if INPUT is missing.
    let input = Path::new(args.value_of("INPUT").unwrap_or_default());
    let print_debug = args.is_present("print-debug");

    let result = if args.is_present("run") {
        run(input, args.value_of("expect").map(Path::new), print_debug)
    } else {
        build(input, args.value_of("output").map(Path::new), print_debug)
    };

    if let Err(failure) = result {
        eprintln!("{}", failure);
        std::process::exit(1);
    }
}

/// Everything that can stop a build or a run. `Display` is the diagnostic
/// line printed before exiting.
#[derive(Debug, Error)]
enum Failure {
    #[error("{0}")]
    Compile(#[from] CompileError),
    #[error("runtime: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("fixture: {0}")]
    Fixture(#[from] FixtureError),
    #[error("fixture: {0}")]
    Mismatch(#[from] Mismatch),
    #[error("io: unable to write output: {0}")]
    Output(#[source] io::Error),
}

/// Compiles `input` to assembly.
fn build(input: &Path, output: Option<&Path>, print_debug: bool) -> Result<(), Failure> {
    if print_debug {
        let source = compiler::read_source(input)?;
        print_listing(&compiler::resolve_source(&source)?);
    }
    let unit = compiler::compile(input, output).map_err(|e| {
        debug!("{} stage failed at {:?}", e.stage(), e.loc());
        e
    })?;
    info!("{} instruction(s) compiled to `{}`", unit.instructions, unit.path.display());
    Ok(())
}

/// Interprets `input`, writing printed values to stdout, and optionally checks
/// them against a fixture file.
fn run(input: &Path, expect: Option<&Path>, print_debug: bool) -> Result<(), Failure> {
    let source = compiler::read_source(input)?;
    let expected = match expect {
        Some(path) => Some(Expected::parse(&compiler::read_source(path)?)?),
        None => None,
    };

    // Output printed before a runtime error still reaches stdout, the same
    // as with the compiled executable.
    let mut out: Vec<u8> = Vec::new();
    let status = interpret(&source, print_debug, &mut out);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(&out).and_then(|_| handle.flush()).map_err(Failure::Output)?;
    status?;

    if let Some(expected) = expected {
        expected.verify(&String::from_utf8_lossy(&out))?;
        info!("output matches {} expected value(s)", expected.values.len());
    }

    Ok(())
}

/// Runs `source` through the compiler's checks, then the interpreter. A
/// program the compiler rejects never starts, so `out` stays empty.
fn interpret<W: Write>(source: &str, print_debug: bool, out: &mut W) -> Result<(), Failure> {
    let program = compiler::check_source(source)?;
    if print_debug {
        print_listing(&program);
    }

    let mut machine = Machine::new();
    machine.run(&program, out)?;
    debug!("{} value(s) left on the stack", machine.stack().len());
    Ok(())
}

/// Lists each instruction with its location and the stack depth after it runs.
fn print_listing(program: &[Instruction]) {
    let mut grid = Grid::new(GridOptions {
        filling:     Filling::Spaces(1),
        direction:   Direction::LeftToRight,
    });

    let mut depth = 0;
    for (idx, ins) in program.iter().enumerate() {
        let (pops, pushes) = ins.opcode.arity();
        depth = depth + pushes - pops;
        grid.add(Cell::from(format!("0x{:04X}:", idx)));
        grid.add(Cell::from(format!("{}:{}", ins.loc.row, ins.loc.col)));
        grid.add(Cell::from(format!("{}", ins)));
        grid.add(Cell::from("=>".to_string()));
        grid.add(Cell::from(format!("depth {}", depth)));
    }

    eprintln!("{}", grid.fit_into_columns(5));
}

fn verbosity_level(verbosity: u64) -> log::LevelFilter {
    match verbosity {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    }
}

fn process_arguments() -> ArgMatches<'static> {
    App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(Arg::with_name("INPUT")
            .help("Sets the input file to use")
            .required(true)
            .multiple(false)
            .index(1))
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .takes_value(false)
            .help("Sets the level of verbosity"))
        .arg(Arg::with_name("output")
            .short("o")
            .takes_value(true)
            .conflicts_with("run")
            .help("write the assembly to an outfile instead of INPUT.asm"))
        .arg(Arg::with_name("run")
            .short("r")
            .long("run")
            .takes_value(false)
            .help("interprets the program instead of generating assembly"))
        .arg(Arg::with_name("expect")
            .short("x")
            .long("expect")
            .takes_value(true)
            .requires("run")
            .help("checks the interpreted output against an .expected fixture"))
        .arg(Arg::with_name("print-debug")
            .short("d")
            .alias("show")
            .alias("s")
            .takes_value(false)
            .help("prints the resolved instructions and stack depths to STDERR"))
        .get_matches()
}

fn initialize_logging(verbosity: u64) {
    // Logs go to stderr; stdout carries nothing but printed values.
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(verbosity_level(verbosity))
        .chain(std::io::stderr())
        .apply().ok();
}
