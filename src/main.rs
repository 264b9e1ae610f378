use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::fmt::Formatter;
use env_logger::Builder;
use log::{debug, info, LevelFilter, Record};

use treelox::error::LoxError;
use treelox::lox::{self, Lox};

#[derive(Parser, Debug)]
#[command(version, about = "Tree-walking interpreter for a small class-based scripting language", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Write debug logs to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a script
    Run { script: PathBuf },

    /// Print the value of a file holding a single expression
    Evaluate { script: PathBuf },

    /// Interactive prompt; definitions persist between lines
    Repl,
}

/// `[module:line] - message`, with the crate prefix dropped from the module.
fn format_record(buf: &mut Formatter, record: &Record) -> io::Result<()> {
    let path = record.module_path().unwrap_or("<unnamed>");
    let module = path.strip_prefix("treelox::").unwrap_or(path);

    writeln!(
        buf,
        "[{}:{}] - {}",
        module,
        record.line().unwrap_or(0),
        record.args()
    )
}

/// Debug logging to `app.log`; `RUST_LOG` still overrides the level.
fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("could not create app.log")?;

    Builder::new()
        .format(format_record)
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(LevelFilter::Debug)
        .parse_default_env()
        .init();

    info!("Logging to app.log");
    Ok(())
}

/// Prints a language error and exits with its sysexits code.
fn fail(e: LoxError) -> ! {
    debug!("Exiting after error: {:?}", e);
    eprintln!("{}", e);
    std::process::exit(e.exit_code());
}

fn repl(lox: &mut Lox) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        // The session keeps its globals after an error.
        match lox.run_line(&line) {
            Ok(Some(echo)) => println!("{}", echo),
            Ok(None) => {}
            Err(e) => eprintln!("{}", e),
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.log {
        init_logger()?;
    } else {
        Builder::new().filter_level(LevelFilter::Off).init();
    }

    debug!("{:?}", cli);

    let mut lox = Lox::new();

    match cli.command {
        Command::Run { script } => {
            let source = lox::read_source(&script).unwrap_or_else(|e| fail(e));
            if let Err(e) = lox.run(&source) {
                fail(e);
            }
            info!("{} finished", script.display());
        }

        Command::Evaluate { script } => {
            let source = lox::read_source(&script).unwrap_or_else(|e| fail(e));
            match lox.evaluate(&source) {
                Ok(value) => println!("{}", value),
                Err(e) => fail(e),
            }
        }

        Command::Repl => repl(&mut lox)?,
    }

    Ok(())
}
