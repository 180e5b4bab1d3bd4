//! Gridweave - structure-based spreadsheet engine, command-line front end

mod cli;
mod config;
mod error;
mod logging;

use anyhow::Context;
use gridweave_core::Document;
use log::LevelFilter;
use std::env;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let raw: Vec<String> = env::args().skip(1).collect();
    let args = match cli::parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            cli::print_usage();
            std::process::exit(1);
        }
    };
    if args.help {
        cli::print_usage();
        return Ok(());
    }

    let (config, warnings) = config::load_config(args.config.as_deref());
    logging::init(if args.verbose { LevelFilter::Debug } else { config.level() });
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }

    let mut doc = Document::with_file(args.file.clone(), config.engine)
        .with_context(|| match &args.file {
            Some(path) => format!("loading {}", path.display()),
            None => "creating document".to_string(),
        })?;

    if let Some(path) = &args.templates {
        let count = doc
            .load_templates(path)
            .with_context(|| format!("loading templates from {}", path.display()))?;
        log::debug!("Loaded {count} template(s)");
    }

    for command in &args.commands {
        println!("{}", doc.evaluate(command));
    }

    if let Some(output_path) = &args.output {
        doc.export_markdown(output_path)
            .with_context(|| format!("exporting to {}", output_path.display()))?;
        println!("Exported to {}", output_path.display());
    } else if args.commands.is_empty() {
        print!("{}", gridweave_core::storage::markdown_content(doc.snapshot()));
    }
    Ok(())
}
