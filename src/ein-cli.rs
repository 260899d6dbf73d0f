//! A small offline tool for working with election credentials.
//! It uses the server's own credential generator and reconciliation engine,
//! so its output always agrees with the API.

use std::fs;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;

use ein_backend::{
    model::ein::{generate, Ein, EinError, MAX_DIGITS},
    reconcile::{compute_status, ReconciliationResult},
};

const PROGRAM_NAME: &str = "ein-cli";

const ABOUT_TEXT: &str = "Generate and reconcile anonymous election credentials.

EXIT CODES:
     0: Success.
     1: Error.";

const GENERATE: &str = "generate";
const RECONCILE: &str = "reconcile";
const COUNT: &str = "COUNT";
const DIGITS: &str = "digits";
const EXPECTED_PATH: &str = "EXPECTED_PATH";
const FOUND_PATH: &str = "FOUND_PATH";

const DEFAULT_DIGITS: usize = 10;
const DEFAULT_DIGITS_ARG: &str = "10";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .subcommand(
            Command::new(GENERATE)
                .about("Print fresh, distinct credentials, one per line")
                .arg(
                    Arg::new(COUNT)
                        .help("How many credentials to generate")
                        .value_parser(value_parser!(usize))
                        .action(ArgAction::Set)
                        .required(true),
                )
                .arg(
                    Arg::new(DIGITS)
                        .long(DIGITS)
                        .short('d')
                        .help("Numerals per credential")
                        .value_parser(value_parser!(usize))
                        .action(ArgAction::Set)
                        .default_value(DEFAULT_DIGITS_ARG),
                ),
        )
        .subcommand(
            Command::new(RECONCILE)
                .about("Compare submitted credentials with the expected ones, printing JSON")
                .arg(
                    Arg::new(EXPECTED_PATH)
                        .help("File of expected credentials, one per line")
                        .action(ArgAction::Set)
                        .required(true),
                )
                .arg(
                    Arg::new(FOUND_PATH)
                        .help("File of submitted values, one per line")
                        .action(ArgAction::Set)
                        .required(true),
                ),
        )
}

/// Errors that this program may produce.
#[derive(Debug, Eq, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Bad generation parameters.
    Ein(EinError),
}

fn generate_eins(count: usize, digits: usize) -> Result<Vec<Ein>, Error> {
    generate(count, digits).map_err(Error::Ein)
}

/// Non-empty lines of the file at `path`.
fn read_lines(path: &str) -> Result<Vec<String>, Error> {
    let text = fs::read_to_string(path).map_err(|e| Error::IO(format!("{path}: {e}")))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn reconcile(expected_path: &str, found_path: &str) -> Result<ReconciliationResult, Error> {
    let expected = read_lines(expected_path)?;
    let found = read_lines(found_path)?;
    Ok(compute_status(&expected, &found))
}

/// Run the chosen subcommand, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let result = match args.subcommand() {
        Some((GENERATE, sub)) => {
            // Required/defaulted arguments are guaranteed to be present.
            let count = *sub.get_one::<usize>(COUNT).unwrap();
            let digits = *sub.get_one::<usize>(DIGITS).unwrap();
            generate_eins(count, digits).map(|eins| {
                eins.iter()
                    .map(Ein::to_string)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Some((RECONCILE, sub)) => {
            let expected: &String = sub.get_one(EXPECTED_PATH).unwrap();
            let found: &String = sub.get_one(FOUND_PATH).unwrap();
            reconcile(expected, found).and_then(|result| {
                serde_json::to_string_pretty(&result).map_err(|e| Error::IO(e.to_string()))
            })
        }
        _ => unreachable!("a subcommand is required"),
    };

    match result {
        Ok(output) => {
            println!("{output}");
            0
        }
        Err(Error::IO(msg)) => {
            eprintln!("IO error: {msg}");
            1
        }
        Err(Error::Ein(EinError::InvalidParameters {
            count,
            digits,
            min_digits,
        })) => {
            eprintln!(
                "Cannot make {count} distinct credentials of {digits} digits; \
                use between {min_digits} and {MAX_DIGITS} digits."
            );
            1
        }
        Err(Error::Ein(err)) => {
            eprintln!("{err}");
            1
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}
