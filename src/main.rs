use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use arboard::Clipboard;
use clap::Parser;
use ratatui::DefaultTerminal;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod client;
mod config;
mod controller;
mod domain;
mod inputter;
mod model;
mod table;
mod ui;

use client::{HttpBackend, Worker};
use config::{Args, RvConfig};
use controller::Controller;
use domain::{Command, Message, RvError};
use model::{Model, Status};
use ui::TableUI;

fn main() -> ExitCode {
    match run() {
        Err(e) => {
            error!("rv stopped: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run() -> Result<(), RvError> {
    let args = Args::parse();
    let config = RvConfig::load(&args)?;
    init_logging(&config.log_file)?;
    info!("Starting rv against {}", config.server);

    let backend = HttpBackend::new(&config)?;
    let worker = Worker::spawn(backend, config.download_dir.clone());
    let controller = Controller::new(&config);
    let ui = TableUI::new(&config.server);

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &controller, &worker, &ui);
    ratatui::restore();
    result
}

fn event_loop(
    terminal: &mut DefaultTerminal,
    controller: &Controller,
    worker: &Worker,
    ui: &TableUI,
) -> Result<(), RvError> {
    let mut rng = rand::thread_rng();
    let mut clipboard: Option<Clipboard> = None;
    let mut model = Model::init(terminal.size()?.height as usize);
    // Load the list right away
    let mut queue = VecDeque::from([Message::Refresh]);

    while model.status != Status::QUITTING {
        if queue.is_empty() {
            // Render the current view
            terminal.draw(|f| ui.draw(&model, f))?;

            // Handle events and worker answers, mapped to a Message
            if let Some(message) = controller.handle_event(&model, worker)? {
                queue.push_back(message);
            }
        }

        while let Some(message) = queue.pop_front() {
            let (next, command) = model.update(message, &mut rng);
            model = next;
            if let Some(command) = command
                && let Some(reply) = dispatch(command, worker, &mut clipboard)?
            {
                queue.push_back(reply);
            }
        }
    }

    info!("Quitting rv");
    Ok(())
}

/// Network commands go to the worker, the clipboard is served right here.
fn dispatch(
    command: Command,
    worker: &Worker,
    clipboard: &mut Option<Clipboard>,
) -> Result<Option<Message>, RvError> {
    match command {
        Command::CopyToClipboard(text) => {
            let result = copy_to_clipboard(clipboard, &text)
                .map(|_| text)
                .map_err(|e| e.to_string());
            Ok(Some(Message::CopyFinished(result)))
        }
        other => {
            worker.submit(other)?;
            Ok(None)
        }
    }
}

fn copy_to_clipboard(clipboard: &mut Option<Clipboard>, text: &str) -> Result<(), RvError> {
    if clipboard.is_none() {
        *clipboard = Some(Clipboard::new()?);
    }
    let Some(clipboard) = clipboard.as_mut() else {
        return Err(RvError::InvalidInput("no clipboard".to_string()));
    };
    clipboard.set_text(text.to_string())?;
    Ok(())
}

/// The terminal belongs to the ui, so everything is logged to a file.
fn init_logging(path: &Path) -> Result<(), RvError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}
