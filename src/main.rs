use anyhow::{bail, Context};
use arboard::Clipboard;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zephyr_capture::{
    CaptureResult, Config, EokaDriver, Session, StdoutSink, BUILTIN_PROFILES,
};

const RULE_WIDTH: usize = 60;

#[derive(Parser)]
#[command(name = "zephyr")]
#[command(about = "Ask chat-style AI sites from the terminal")]
#[command(version)]
struct Cli {
    /// Use DeepAI chat
    #[arg(long)]
    deep: bool,

    /// Use Z.ai chat
    #[arg(long)]
    zchat: bool,

    /// Use iAsk
    #[arg(long)]
    iask: bool,

    /// Site profile (YAML) to use instead of a built-in one
    #[arg(short, long, value_name = "PATH")]
    profile: Option<PathBuf>,

    /// Ask the contents of a file once and exit
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Validate the profile without launching a browser
    #[arg(long)]
    check: bool,

    /// Copy each final answer to the clipboard
    #[arg(short, long)]
    copy: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    // Logs go to stderr so they never interleave with the streamed answer.
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    banner();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut config = load_profile(&cli, &mut stdin).await?;
    if cli.headed {
        config.browser.headless = false;
    }

    if cli.check {
        print_summary(&config);
        return Ok(());
    }

    let question = match cli.file {
        Some(ref path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };

    println!("Opening {}...", config.name);
    let driver = EokaDriver::launch(&config)
        .await
        .with_context(|| format!("failed to open {}", config.url))?;
    let mut session = Session::new(driver, config.capture_config());
    let mut clipboard = if cli.copy { open_clipboard() } else { None };

    match question {
        Some(question) => {
            ask(&mut session, &config.name, question.trim(), clipboard.as_mut()).await;
        }
        None => repl(&mut session, &config.name, &mut stdin, clipboard.as_mut()).await?,
    }

    session.into_driver().close().await?;
    println!("Session ended.");
    Ok(())
}

async fn repl(
    session: &mut Session<EokaDriver>,
    site: &str,
    stdin: &mut Lines<BufReader<Stdin>>,
    mut clipboard: Option<&mut Clipboard>,
) -> anyhow::Result<()> {
    println!("✓ Ready! Type your question (or 'exit' to quit).");

    loop {
        prompt("\nYou: ");
        let line = tokio::select! {
            line = stdin.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "exit" | "quit" | "q") {
            break;
        }
        ask(session, site, question, clipboard.as_deref_mut()).await;
    }
    Ok(())
}

/// Submit one question and stream the reply. Ctrl-C abandons the capture but
/// keeps the session open.
async fn ask(
    session: &mut Session<EokaDriver>,
    site: &str,
    question: &str,
    clipboard: Option<&mut Clipboard>,
) {
    let rule = "=".repeat(RULE_WIDTH);
    println!("\n{}\n{} response:\n{}", rule, site, rule);

    let mut sink = StdoutSink;
    let outcome = tokio::select! {
        result = session.ask(question, &mut sink) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(result)) => {
            finish(&result);
            if let Some(clipboard) = clipboard {
                copy_answer(clipboard, &result);
            }
        }
        Some(Err(e)) => eprintln!("⚠ Could not send question: {}", e),
        None => eprintln!("\n⚠ Interrupted; the response may be incomplete."),
    }
    println!("{}", rule);
}

fn finish(result: &CaptureResult) {
    info!(
        "captured {} chars in {:?} ({} ticks)",
        result.text.len(),
        result.elapsed,
        result.ticks
    );
    if result.text.is_empty() {
        println!("{}", result.display_text());
        return;
    }
    println!();
    if result.timed_out {
        eprintln!("⚠ Timed out waiting for the reply; the response may be incomplete.");
    }
}

fn open_clipboard() -> Option<Clipboard> {
    match Clipboard::new() {
        Ok(clipboard) => Some(clipboard),
        Err(e) => {
            warn!("clipboard unavailable, answers will not be copied: {}", e);
            None
        }
    }
}

/// Copy the answer, or its failure marker when there is no text.
fn copy_answer(clipboard: &mut Clipboard, result: &CaptureResult) {
    match clipboard.set_text(result.display_text()) {
        Ok(()) => println!("(copied to clipboard)"),
        Err(e) => warn!("could not copy answer: {}", e),
    }
}

async fn load_profile(
    cli: &Cli,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<Config> {
    if let Some(ref path) = cli.profile {
        return Config::load(path)
            .with_context(|| format!("failed to load profile {}", path.display()));
    }

    let name = if cli.deep {
        "deep"
    } else if cli.zchat {
        "zchat"
    } else if cli.iask {
        "iask"
    } else {
        choose_profile(stdin).await?
    };
    Ok(Config::builtin(name)?)
}

/// Interactive selector when no site flag is passed.
async fn choose_profile(stdin: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<&'static str> {
    println!("Choose a site:");
    for (i, (name, _)) in BUILTIN_PROFILES.iter().enumerate() {
        println!(" {}) {}", i + 1, name);
    }
    prompt("\nEnter number: ");

    let choice = stdin.next_line().await?.unwrap_or_default();
    let index = choice
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1));
    match index.and_then(|i| BUILTIN_PROFILES.get(i)) {
        Some((name, _)) => Ok(*name),
        None => bail!("invalid choice '{}'", choice.trim()),
    }
}

fn print_summary(config: &Config) {
    let capture = config.capture_config();
    println!("Profile valid: {}", config.name);
    println!("  URL: {}", config.url);
    println!("  Headless: {}", config.browser.headless);
    println!("  Answer selector: {}", config.selectors.answer);
    println!("  Turn strategy: {:?}", capture.turn);
    if capture.completion.busy_indicator {
        println!("  Completion: busy indicator");
    } else {
        println!(
            "  Completion: {} stable ticks",
            capture.completion.stable_ticks
        );
    }
    println!("  Poll interval: {:?}", capture.poll_interval);
    match capture.completion.timeout {
        Some(timeout) => println!("  Timeout: {:?}", timeout),
        None => println!("  Timeout: none"),
    }
    if !config.preflight.is_empty() {
        println!("  Preflight clicks: {}", config.preflight.len());
    }
}

fn banner() {
    let rule = "=".repeat(70);
    println!("{}", rule);
    println!(" zephyr - chat-site assistant for the terminal");
    println!("{}", rule);
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_flag() {
        let cli = Cli::try_parse_from(["zephyr", "--deep", "--copy"]).unwrap();
        assert!(cli.copy);
        assert!(cli.deep);

        let cli = Cli::try_parse_from(["zephyr", "--iask", "-c"]).unwrap();
        assert!(cli.copy);

        let cli = Cli::try_parse_from(["zephyr", "--zchat"]).unwrap();
        assert!(!cli.copy);
    }
}
