use std::io;
use std::time::Duration;

use crossterm::event::KeyEventKind;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

mod ai;
mod app;
mod config;
mod db;
mod error;
mod models;
mod pipeline;
mod tui;

use app::{build_pipeline, resolve_user, App};
use config::Config;
use error::{AppError, Result};
use models::{SortMode, SummaryLength, SummaryRecord, SummaryRequest};
use tui::{draw, handle_key_event};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Tui,
    Generate {
        book_name: String,
        length: Option<SummaryLength>,
        prompt: String,
    },
    List {
        sort: SortMode,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliArgs {
    command: Command,
    user: Option<String>,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut command = Command::Tui;
    let mut user = None;
    let mut length = None;
    let mut prompt = String::new();
    let mut sort = SortMode::default();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| AppError::InvalidRequest(format!("{flag} needs a value")))
        };

        match arg.as_str() {
            "--generate" => {
                command = Command::Generate {
                    book_name: value("--generate")?,
                    length: None,
                    prompt: String::new(),
                }
            }
            "--list" => command = Command::List { sort },
            "--user" => user = Some(value("--user")?),
            "--length" => length = Some(SummaryLength::from(value("--length")?)),
            "--prompt" => prompt = value("--prompt")?,
            "--sort" => {
                let mode = value("--sort")?;
                sort = SortMode::parse(&mode).ok_or_else(|| {
                    AppError::InvalidRequest(format!(
                        "unknown sort mode {mode:?} (expected id, name, length or date)"
                    ))
                })?;
            }
            other => {
                return Err(AppError::InvalidRequest(format!("unknown argument {other:?}")));
            }
        }
    }

    // Options may come before or after the mode flag
    let command = match command {
        Command::Generate { book_name, .. } => Command::Generate {
            book_name,
            length,
            prompt,
        },
        Command::List { .. } => Command::List { sort },
        Command::Tui => Command::Tui,
    };

    Ok(CliArgs { command, user })
}

fn print_record(record: &SummaryRecord) {
    println!(
        "#{} {} [{}] {}",
        record.summary_id, record.book_name, record.length, record.timestamp_formatted
    );
    if !record.add_prompt.is_empty() {
        println!("Prompt: {}", record.add_prompt);
    }
    println!("\n{}\n", record.summary);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    // Load configuration
    let config = Config::load()?;

    match cli.command {
        Command::Generate {
            book_name,
            length,
            prompt,
        } => {
            if config.gemini_api_key.is_none() {
                return Err(anyhow::anyhow!(
                    "gemini_api_key is not set in {:?} (or GEMINI_API_KEY)",
                    Config::config_path()
                )
                .into());
            }
            let user_id = resolve_user(&config, cli.user.as_deref())?;
            let pipeline = build_pipeline(&config).await?;
            let request = SummaryRequest::new(
                user_id,
                book_name,
                prompt,
                length.unwrap_or_else(|| config.default_length.clone()),
            )?;
            let record = pipeline.request_summary(request).await?;
            print_record(&record);
            return Ok(());
        }
        Command::List { sort } => {
            let user_id = resolve_user(&config, cli.user.as_deref())?;
            let pipeline = build_pipeline(&config).await?;
            let records = pipeline.load_summaries(&user_id, sort).await?;
            if records.is_empty() {
                println!("No saved summaries for {}", user_id);
            }
            for record in &records {
                print_record(record);
            }
            return Ok(());
        }
        Command::Tui => {}
    }

    // Initialize app
    let mut app = App::new(&config, cli.user.as_deref()).await?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, app))?;

        // Advance spinner animation
        app.tick_spinner();

        // Poll for pipeline progress and completed summaries
        app.poll_summary_result();

        // Poll for events with timeout to allow async operations
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(action) = handle_key_event(key, app.input_active, app.show_help) {
                        let should_quit = app.handle_action(action).await?;
                        if should_quit {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
