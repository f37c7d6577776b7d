use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{arg, command, value_parser, ArgMatches, Command};
use crossterm::tty::IsTty;
use yansi::Color::{Cyan, Red};
use yansi::Paint;

use preg::{compile, Flags, MatchResult, Pattern};

const APP_HELP_TEMPLATE: &str = r#"preg {version}, a PCRE-flavored pattern matcher.

{before-help}{usage-heading}
  {usage}

{all-args}{after-help}
"#;

const EXIT_NO_MATCH: i32 = 1;
const EXIT_ERROR: i32 = 2;

fn cli() -> Command {
    command!()
        .name("preg")
        .help_template(APP_HELP_TEMPLATE)
        .arg(
            arg!(<PATTERN> "Pattern to search for, without delimiters"),
        )
        .arg(
            arg!([FILE] "File to search; standard input when omitted")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(-f --flags [LETTERS] "Flag letters (imsxgADUXu)")
                .default_value(""),
        )
        .arg(arg!(-g --global "Report every match, not only the first"))
        .arg(arg!(-c --count "Print only the number of matches"))
        .arg(
            arg!(--dump "Print the compiled program instead of matching"),
        )
}

fn main() -> anyhow::Result<()> {
    // Enable support for ANSI escape codes in Windows. In other platforms
    // this is a no-op.
    if let Err(err) = enable_ansi_support::enable_ansi_support() {
        println!("could not enable ANSI support: {}", err)
    }

    #[cfg(feature = "logging")]
    env_logger::init();

    // If stdout is not a tty (for example, because it was redirected to a
    // file) turn off colors, so that escape codes don't end up in the
    // redirected output.
    if !io::stdout().is_tty() {
        yansi::disable();
    }

    let args = cli().get_matches();

    match run(&args) {
        Ok(matched) => {
            if !matched {
                process::exit(EXIT_NO_MATCH);
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("{} {:#}", "error:".paint(Red).bold(), err);
            process::exit(EXIT_ERROR);
        }
    }
}

fn run(args: &ArgMatches) -> anyhow::Result<bool> {
    let source = args.get_one::<String>("PATTERN").unwrap();
    let letters = args.get_one::<String>("flags").unwrap();

    let flags = Flags::parse(letters)
        .with_context(|| format!("invalid flags `{}`", letters))?;

    let pattern = compile(source, flags)
        .with_context(|| format!("invalid pattern `{}`", source))?;

    if args.get_flag("dump") {
        print!("{}", pattern.dump_program());
        return Ok(true);
    }

    let subject = match args.get_one::<PathBuf>("FILE") {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("can not read `{}`", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("can not read standard input")?;
            buffer
        }
    };

    let global =
        args.get_flag("global") || flags.contains(Flags::GLOBAL);
    let count_only = args.get_flag("count");

    let mut count = 0;
    for m in pattern.find_iter(&subject) {
        count += 1;
        if !count_only {
            print_match(&pattern, &m, &subject);
        }
        if !global {
            break;
        }
    }

    if count_only {
        println!("{}", count);
    }

    Ok(count > 0)
}

fn print_match(pattern: &Pattern, m: &MatchResult, subject: &str) {
    let text = m.group_str(subject, 0).unwrap_or_default();
    println!(
        "{}..{}: {}",
        m.start(),
        m.end(),
        text.paint(Cyan).bold()
    );
    for group in 1..=pattern.group_count() {
        let name = match pattern.group_name(group) {
            Some(name) => format!("{} ({})", group, name),
            None => format!("{}", group),
        };
        match m.group_str(subject, group) {
            Some(text) => println!("  {}: {:?}", name, text),
            None => println!("  {}: <unmatched>", name),
        }
    }
}
