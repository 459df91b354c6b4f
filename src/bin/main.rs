use std::{fs, path::PathBuf, process::ExitCode};

use clap::Parser;
use clite::{config::Config, util::fmt::error::render};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Checks and runs a Clite program, printing the final state of its variables.
#[derive(Parser)]
#[command(name = "clite", version)]
struct Cli {
    /// Path to the Clite source file
    path: PathBuf,
    /// Artifacts to print, in order (default: state)
    #[arg(long, value_enum, value_delimiter = ',')]
    emit: Vec<Emit>,
    /// Reject implicit float to int narrowing in assignments
    #[arg(long)]
    strict: bool,
    /// Log pipeline events to stderr (repeat for more detail)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "snake_case")]
enum Emit {
    Tokens,
    Ast,
    Types,
    Transformed,
    State,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let path = cli.path.display().to_string();
    let src = match fs::read_to_string(&cli.path) {
        Ok(src) => src,
        Err(error) => {
            eprintln!("failed to read {path}: {error}");
            return ExitCode::FAILURE;
        }
    };
    let config = if cli.strict {
        Config::strict()
    } else {
        Config::default()
    };
    debug!(path, ?config, "starting");

    let artifacts = match clite::run(&src, &config) {
        Ok(artifacts) => artifacts,
        Err(error) => {
            eprint!("{}", render(&src, &path, &error));
            return ExitCode::FAILURE;
        }
    };

    let compiled = &artifacts.compiled;
    let emit = if cli.emit.is_empty() {
        vec![Emit::State]
    } else {
        cli.emit
    };
    for (i, emit) in emit.into_iter().enumerate() {
        if i > 0 {
            println!();
        }
        match emit {
            Emit::Tokens => {
                for token in &compiled.tokens {
                    let span = token.span();
                    println!("{:?} {span} {:?}", token.kind, span.substr(&src));
                }
            }
            Emit::Ast => print!("{}", compiled.program),
            Emit::Types => print!("{}", compiled.types),
            Emit::Transformed => print!("{}", compiled.transformed),
            Emit::State => print!("{}", artifacts.state),
        }
    }

    ExitCode::SUCCESS
}

fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbosity {
            0 => "warn",
            1 => "clite=debug",
            _ => "clite=trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
