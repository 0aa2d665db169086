use clap::Parser;
use colored::Colorize;
use kaleidoc::toplevel::{self, Driver, Options};
use std::fs;
use std::path::PathBuf;
use std::process;

/// Compiles Kaleidoscope source with Cranelift and runs top-level expressions.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Source file to compile. Reads declarations from stdin when absent.
    file: Option<PathBuf>,

    /// Only lower top-level expressions, do not evaluate them.
    #[arg(long)]
    no_eval: bool,

    /// Do not print the IR of each lowered function.
    #[arg(short, long)]
    quiet: bool,

    /// Print the whole module once all input is processed.
    #[arg(long)]
    dump_module: bool,
}

fn main() {
    let args = Args::parse();

    let options = Options {
        print_ir: !args.quiet,
        evaluate: !args.no_eval,
    };
    let mut driver = Driver::new(options).unwrap_or_else(|e| {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    });

    let failed = match &args.file {
        Some(path) => {
            let src = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("{} failed to read '{}': {}", "Error:".red().bold(), path.display(), e);
                process::exit(1);
            });
            let results = driver.run_source(&src);
            toplevel::report(&results);
            results.iter().any(|r| r.is_err())
        }
        None => match toplevel::main_loop(&mut driver) {
            Ok(()) => false,
            Err(e) => {
                eprintln!("{} {}", "Error:".red().bold(), e);
                true
            }
        },
    };

    if args.dump_module {
        print!("{}", driver.session().module());
    }
    if failed {
        process::exit(1);
    }
}
