use std::io::{self, BufRead};
use std::path::Path;

use anyhow::{Result, anyhow};
use clap::Parser;
use pdf_form_filler::Session;

#[derive(Parser, Debug)]
#[command(
    name = "pdf-form-filler",
    version,
    about = "Fill a scanned rental application PDF from a JSON profile"
)]
struct Cli {
    /// Profile JSON to load (missing keys fall back to the profile template)
    #[arg(short = 'p', long = "profile")]
    profile: Option<String>,

    /// PDF form to fill
    #[arg(short = 'f', long = "pdf")]
    pdf: Option<String>,

    /// Where to write the filled PDF (default: form_filled.pdf)
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Override one profile field (field=value, repeatable)
    #[arg(short = 's', long = "set")]
    set: Vec<String>,

    /// Write the resulting profile to a JSON file
    #[arg(long = "save-profile")]
    save_profile: Option<String>,

    /// Print the profile fields and exit
    #[arg(long = "show-profile")]
    show_profile: bool,

    /// Print the form labels and the fields they anchor, then exit
    #[arg(long = "show-labels")]
    show_labels: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Tesseract languages (e.g. deu+eng)
    #[arg(short = 'l', long = "ocr-lang")]
    ocr_lang: Option<String>,

    /// Pages recognized in parallel (0 = one per CPU)
    #[arg(short = 'j', long = "jobs")]
    jobs: Option<usize>,

    /// Write OCR boxes and label positions next to the input PDF
    #[arg(long = "debug-ocr")]
    debug_ocr: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Interactive mode
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,
}

impl Cli {
    fn to_config(&self) -> pdf_form_filler::Config {
        pdf_form_filler::Config {
            profile: self.profile.clone(),
            pdf: self.pdf.clone(),
            output: self.output.clone(),
            set: self.set.clone(),
            save_profile: self.save_profile.clone(),
            show_profile: self.show_profile,
            show_labels: self.show_labels,
            settings_path: self.read_settings.clone(),
            ocr_lang: self.ocr_lang.clone(),
            jobs: self.jobs,
            debug_ocr: self.debug_ocr,
            verbose: self.verbose,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pdf_form_filler::logging::init(cli.verbose)?;
    if cli.interactive {
        return run_interactive(cli).await;
    }

    let output = pdf_form_filler::run(cli.to_config()).await?;
    println!("{}", output);
    Ok(())
}

async fn run_interactive(cli: Cli) -> Result<()> {
    use std::io::Write;

    // A bad --profile should not keep the prompt from opening; the status says what failed.
    let mut config = cli.to_config();
    let profile = config.profile.take();
    let mut session = pdf_form_filler::open_session(&config)?;
    if let Some(path) = profile {
        let _ = session.load_profile(Path::new(&path));
        println!("{}", session.status());
    }
    if let Some(path) = config.pdf.as_deref() {
        let _ = session.select_pdf(Path::new(path));
        println!("{}", session.status());
    }

    println!("Interactive mode. Use /quit or /exit to finish.");
    println!("Type /help to see available commands.");

    let mut line = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();
    loop {
        line.clear();
        print!("> ");
        io::stdout().flush()?;
        if stdin_lock.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if !input.starts_with('/') {
            eprintln!("commands start with '/'; type /help");
            continue;
        }
        if handle_interactive_command(input, &mut session).await? {
            break;
        }
    }
    Ok(())
}

async fn handle_interactive_command(input: &str, session: &mut Session) -> Result<bool> {
    let trimmed = input.trim();
    let (command, arg) = trimmed
        .split_once(char::is_whitespace)
        .map(|(command, arg)| (command, arg.trim()))
        .unwrap_or((trimmed, ""));

    match command {
        "/quit" | "/exit" => return Ok(true),
        "/help" => print_interactive_help(),
        "/status" => {
            println!("status: {}", display_or(session.status(), "(idle)"));
            println!(
                "pdf: {}",
                session
                    .pdf_path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string())
            );
            println!("output: {}", session.output_path().display());
        }
        "/show" => println!("{}", pdf_form_filler::format_profile(session.profile())),
        "/labels" => println!("{}", pdf_form_filler::format_labels()),
        "/load" => {
            if arg.is_empty() {
                eprintln!("usage: /load <profile.json>");
            } else {
                let _ = session.load_profile(Path::new(arg));
                println!("{}", session.status());
            }
        }
        "/save" => {
            if arg.is_empty() {
                eprintln!("usage: /save <profile.json>");
            } else {
                let _ = session.save_profile(Path::new(arg));
                println!("{}", session.status());
            }
        }
        "/pdf" => {
            if arg.is_empty() {
                eprintln!("usage: /pdf <form.pdf>");
            } else {
                let _ = session.select_pdf(Path::new(arg));
                println!("{}", session.status());
            }
        }
        "/output" => {
            if arg.is_empty() {
                println!("output: {}", session.output_path().display());
            } else {
                session.set_output(arg);
                println!("output set to {}", arg);
            }
        }
        "/set" => match parse_set(arg) {
            Ok((key, value)) => match session.set_field(key, value) {
                Ok(()) => println!("{} set", key),
                Err(err) => eprintln!("{}", err),
            },
            Err(err) => eprintln!("{}", err),
        },
        "/debug-ocr" => match parse_toggle(arg) {
            Ok(enabled) => {
                session.set_debug_ocr(enabled);
                println!("debug-ocr: {}", enabled);
            }
            Err(err) => eprintln!("{}", err),
        },
        "/fill" => {
            let _ = session.fill().await;
            println!("{}", session.status());
        }
        _ => eprintln!("unknown command: {}", trimmed),
    }
    Ok(false)
}

/// `/set <field> <value>` or `/set field=value`.
fn parse_set(arg: &str) -> Result<(&str, &str)> {
    if let Some((key, value)) = arg.split_once(char::is_whitespace) {
        if !key.contains('=') {
            return Ok((key, value.trim()));
        }
    }
    pdf_form_filler::parse_assignment(arg)
}

fn parse_toggle(arg: &str) -> Result<bool> {
    match arg.trim().to_lowercase().as_str() {
        "" | "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(anyhow!("expected on/off/true/false/1/0")),
    }
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

fn print_interactive_help() {
    println!("Commands:");
    println!("  /quit, /exit                 Exit interactive mode");
    println!("  /load <profile.json>         Load a profile");
    println!("  /save <profile.json>         Save the current profile");
    println!("  /pdf <form.pdf>              Select the form to fill");
    println!("  /set <field> <value>         Change one profile field");
    println!("  /show                        Show the current profile");
    println!("  /labels                      Show form labels and their fields");
    println!("  /output <file.pdf>           Set output file (or show current)");
    println!("  /debug-ocr [on|off]          Write OCR debug images on fill");
    println!("  /fill                        Fill the selected PDF");
    println!("  /status                      Show the last status line");
}
