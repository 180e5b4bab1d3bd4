//! Command-line arguments

use std::path::PathBuf;

use crate::error::{CliError, Result};

pub fn print_usage() {
    eprintln!("Usage: gridweave [OPTIONS] [FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [FILE]                    Document to open (.json)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -t, --templates <FILE>    Load a template library (JSON)");
    eprintln!("  -c, --command <FORMULA>   Evaluate a formula against the document and print it");
    eprintln!("  -o, --output <FILE>       Export visible values to a markdown file");
    eprintln!("  --config <FILE>           Read settings from this TOML file");
    eprintln!("  -v, --verbose             Log debug output to stderr");
    eprintln!("  -h, --help                Print help");
}

#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub file: Option<PathBuf>,
    pub templates: Option<PathBuf>,
    pub commands: Vec<String>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub help: bool,
}

fn value_of(args: &[String], i: usize, flag: &str, what: &'static str) -> Result<String> {
    args.get(i).cloned().ok_or_else(|| CliError::MissingValue {
        flag: flag.to_string(),
        what,
    })
}

/// Parse arguments, program name excluded.
pub fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => parsed.help = true,
            "-v" | "--verbose" => parsed.verbose = true,
            flag @ ("-t" | "--templates") => {
                i += 1;
                parsed.templates = Some(PathBuf::from(value_of(args, i, flag, "a file path")?));
            }
            flag @ ("-c" | "--command") => {
                i += 1;
                parsed.commands.push(value_of(args, i, flag, "a formula")?);
            }
            flag @ ("-o" | "--output") => {
                i += 1;
                parsed.output = Some(PathBuf::from(value_of(args, i, flag, "a file path")?));
            }
            flag @ "--config" => {
                i += 1;
                parsed.config = Some(PathBuf::from(value_of(args, i, flag, "a file path")?));
            }
            arg if arg.starts_with('-') && arg.len() > 1 => {
                return Err(CliError::UnknownOption(arg.to_string()));
            }
            arg => {
                if parsed.file.is_some() {
                    return Err(CliError::UnexpectedArgument(arg.to_string()));
                }
                parsed.file = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_full_command_line() {
        let parsed = parse_args(&args(&["doc.json", "-t", "lib.json", "-c", "=1+1", "-c", "=A1", "-v"])).unwrap();
        assert_eq!(parsed.file, Some(PathBuf::from("doc.json")));
        assert_eq!(parsed.templates, Some(PathBuf::from("lib.json")));
        assert_eq!(parsed.commands, vec!["=1+1".to_string(), "=A1".to_string()]);
        assert!(parsed.verbose);
    }

    #[test]
    fn test_missing_value() {
        assert_eq!(
            parse_args(&args(&["-o"])),
            Err(CliError::MissingValue { flag: "-o".into(), what: "a file path" })
        );
    }

    #[test]
    fn test_unknown_and_extra_arguments() {
        assert_eq!(parse_args(&args(&["--nope"])), Err(CliError::UnknownOption("--nope".into())));
        assert_eq!(
            parse_args(&args(&["a.json", "b.json"])),
            Err(CliError::UnexpectedArgument("b.json".into()))
        );
    }
}
