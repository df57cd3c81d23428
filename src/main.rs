//! cssfill command line
//!
//! Runs the keyword filter against a CSS file at a simulated viewport width
//! and prints the rules that currently apply as JSON. Handy for checking
//! what a polyfill instance would see on a given page without a browser.
//!
//! ```text
//! cssfill --width 500 --declaration 'position:sticky' site.css
//! ```

use cssfill::dom::{SimViewport, StaticDocument};
use cssfill::{Keywords, Polyfill, PolyfillContext, PolyfillOptions, Result};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

struct CliArgs {
    file: String,
    width: f32,
    em_size: f32,
    keywords: Keywords,
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!();
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cssfill: {}", e);
            ExitCode::FAILURE
        }
    }
}

const USAGE: &str = "\
Usage: cssfill [OPTIONS] <FILE.css>

Options:
  --width <PX>          viewport width in pixels (default 1024)
  --em <PX>             pixel value of 1em in media queries (default 16)
  --selector <PAT>      selector substring pattern (repeatable)
  --declaration <PAT>   property:value glob pattern (repeatable)";

fn parse_args(mut args: impl Iterator<Item = String>) -> std::result::Result<CliArgs, String> {
    let mut file = None;
    let mut width = 1024.0;
    let mut em_size = 16.0;
    let mut keywords = Keywords::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--width" => width = numeric_value(&arg, args.next())?,
            "--em" => em_size = numeric_value(&arg, args.next())?,
            "--selector" => keywords.selectors.push(required_value(&arg, args.next())?),
            "--declaration" => keywords.declarations.push(required_value(&arg, args.next())?),
            "--help" | "-h" => return Err("cssfill - CSS feature polyfill engine".to_string()),
            other if other.starts_with("--") => {
                return Err(format!("unknown option: {}", other));
            }
            _ => {
                if file.replace(arg).is_some() {
                    return Err("expected exactly one CSS file".to_string());
                }
            }
        }
    }

    if keywords.selectors.is_empty() && keywords.declarations.is_empty() {
        return Err("at least one --selector or --declaration pattern is required".to_string());
    }
    let file = file.ok_or_else(|| "missing CSS file argument".to_string())?;
    Ok(CliArgs {
        file,
        width,
        em_size,
        keywords,
    })
}

fn required_value(flag: &str, value: Option<String>) -> std::result::Result<String, String> {
    value.ok_or_else(|| format!("{} requires a value", flag))
}

fn numeric_value(flag: &str, value: Option<String>) -> std::result::Result<f32, String> {
    required_value(flag, value)?
        .parse()
        .map_err(|_| format!("{} requires a number", flag))
}

fn run(args: &CliArgs) -> Result<()> {
    let css = std::fs::read_to_string(&args.file)?;

    let document = StaticDocument::new().with_inline(None, &css);
    let viewport = Arc::new(SimViewport::new(args.width, args.em_size));
    let context = PolyfillContext::new(Arc::new(document), viewport);
    let polyfill = Polyfill::new(context, PolyfillOptions::with_keywords(args.keywords.clone()));

    let matches = polyfill.current_matches();
    log::debug!("{} matching rule(s) at {}px", matches.len(), args.width);
    let json = serde_json::to_string_pretty(matches.rules())
        .map_err(|e| cssfill::CssfillError::Other(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
