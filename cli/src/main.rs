//! Quill terminal host.
//!
//! Wires a background coordinator to one simulated page (an in-memory
//! document) and maps console commands onto the trigger surfaces a browser
//! would provide: the context menu, the keyboard shortcuts, and the in-page
//! floating menu. Modal state transitions are printed as they happen, which
//! makes the whole request lifecycle observable from a terminal.
//!
//! Logs go to a file under the config directory, never to stdout, so the
//! session output stays readable.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use quill_config::SettingsStore;
use quill_coordinator::{Coordinator, CoordinatorHandle, PageEnvelope};
use quill_page::{
    Clipboard, CmarkFormatter, DocumentHost, MemoryDocument, MenuAction, ModalPhase,
    OperationReply, PageAgent, PageEvent, Point,
};
use quill_types::{AgentRequest, AgentResponse, TabId};

const SAMPLE_TEXT: &str = "Rust is a systems programming language that runs blazingly fast, \
prevents segfaults, and guarantees thread safety. It accomplishes these goals by being \
memory safe without using garbage collection.";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Some((path, file)) = open_log_file() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();
        tracing::info!(path = %path.display(), "Logging initialized");
    } else {
        // No writable log location: prefer silence over corrupting stdout.
        tracing_subscriber::registry().with(env_filter).init();
    }
}

fn open_log_file() -> Option<(PathBuf, std::fs::File)> {
    let config_path = quill_config::default_config_path()?;
    let log_dir = config_path.parent()?.join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    let path = log_dir.join("quill.log");
    let file = OpenOptions::new().create(true).append(true).open(&path).ok()?;
    Some((path, file))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let store = SettingsStore::new();
    let settings = store.load();
    let report = settings.validate();
    if report.is_valid() {
        println!(
            "Active provider: {} ({})",
            settings.active_provider.display_name(),
            settings.active().model
        );
    } else {
        println!("Settings need attention before operations will succeed:");
        for error in report.errors() {
            println!("  - {error}");
        }
        if let Some(path) = store.path() {
            println!("Edit {} to fix this.", path.display());
        }
    }

    let (coordinator, handle) = Coordinator::new(store);
    tokio::spawn(coordinator.run());

    let tab = TabId::new(1);
    let inbox = handle.register_tab(tab);
    let (agent, replies) = PageAgent::new(
        tab,
        MemoryDocument::new(SAMPLE_TEXT),
        handle.clone(),
        Clipboard::system(),
        Box::new(CmarkFormatter),
    );

    println!("Quill demo session. Type 'help' for commands.\n");
    run_session(agent, inbox, replies, &handle, tab).await;
    Ok(())
}

async fn run_session(
    mut agent: PageAgent<MemoryDocument>,
    mut inbox: mpsc::UnboundedReceiver<PageEnvelope>,
    mut replies: mpsc::UnboundedReceiver<OperationReply>,
    handle: &CoordinatorHandle,
    tab: TabId,
) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let deadline = agent.next_deadline();
        let tick = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at.into()).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                if !handle_command(&mut agent, handle, tab, line.trim()).await {
                    break;
                }
                agent.poll(Instant::now());
                render(&agent);
            }
            Some(envelope) = inbox.recv() => {
                agent.handle_envelope(envelope, Instant::now());
                render(&agent);
            }
            Some(reply) = replies.recv() => {
                agent.handle_reply(reply, Instant::now());
                render(&agent);
            }
            () = tick => {
                agent.poll(Instant::now());
                render(&agent);
            }
        }
    }
}

/// Apply one console command. Returns `false` to end the session.
async fn handle_command(
    agent: &mut PageAgent<MemoryDocument>,
    handle: &CoordinatorHandle,
    tab: TabId,
    line: &str,
) -> bool {
    let now = Instant::now();
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "help" => print_help(),
        "quit" | "exit" => return false,
        "doc" => {
            if rest.is_empty() {
                println!("{}", agent.host().content());
            } else {
                *agent.host_mut() = MemoryDocument::new(rest.to_string());
                println!("(document replaced)");
            }
        }
        "select" => {
            if agent.host_mut().select_str(rest) {
                agent.handle_event(PageEvent::PointerUp, now);
            } else {
                println!("'{rest}' is not in the document");
            }
        }
        "menu" => match MenuAction::parse(rest) {
            Some(action) => agent.handle_event(PageEvent::Menu(action), now),
            None => println!("usage: menu rephrase|summarize|explain"),
        },
        "shortcut" => match rest {
            "a" => handle.shortcut_rephrase(tab),
            "b" => handle.shortcut_summarize(tab),
            _ => println!("usage: shortcut a|b"),
        },
        "ctxmenu" => match agent.host().selection() {
            Some(selection) => handle.menu_selection(tab, selection.text),
            None => handle.menu_page(tab),
        },
        "click" => {
            let mut parts = rest.split_whitespace();
            match (
                parts.next().and_then(|v| v.parse().ok()),
                parts.next().and_then(|v| v.parse().ok()),
            ) {
                (Some(x), Some(y)) => {
                    agent.handle_event(PageEvent::PointerDown { at: Point::new(x, y) }, now);
                }
                _ => println!("usage: click <x> <y>"),
            }
        }
        "esc" => agent.handle_event(PageEvent::Escape, now),
        "retry" => agent.handle_event(PageEvent::Retry, now),
        "accept" => agent.handle_event(PageEvent::Accept, now),
        "copy" => agent.handle_event(PageEvent::CopyResult, now),
        "close" => agent.handle_event(PageEvent::CloseModal, now),
        "settings" => show_settings(handle, tab).await,
        other => println!("unknown command '{other}'; try 'help'"),
    }
    true
}

async fn show_settings(handle: &CoordinatorHandle, tab: TabId) {
    match handle.request(tab, &AgentRequest::GetSettings).await {
        Ok(AgentResponse::Settings { settings }) => {
            println!("active provider: {}", settings.active_provider.display_name());
            for provider in quill_types::Provider::all() {
                let per = settings.provider(*provider);
                let key = if per.api_key.trim().is_empty() {
                    "(not set)"
                } else {
                    "(set)"
                };
                println!(
                    "  {}: model={} api_key={}",
                    provider.display_name(),
                    per.model,
                    key
                );
            }
        }
        Ok(other) => println!("unexpected reply: {other:?}"),
        Err(_) => println!("coordinator is gone"),
    }
}

fn render(agent: &PageAgent<MemoryDocument>) {
    let mut out = std::io::stdout().lock();

    if let Some(modal) = agent.modal() {
        let kind = modal.kind().display_name();
        match modal.phase() {
            ModalPhase::Loading => {
                let _ = writeln!(out, "[{kind}] loading... ({})", snippet(modal.original()));
            }
            ModalPhase::Result { .. } => {
                let _ = writeln!(out, "[{kind}] result:");
                if let Some(html) = agent.result_html() {
                    let _ = writeln!(out, "{html}");
                }
                let actions = if modal.can_accept() {
                    "accept | retry | close"
                } else {
                    "copy | retry | close"
                };
                let _ = writeln!(out, "actions: {actions}");
            }
            ModalPhase::Failed { message } => {
                let _ = writeln!(out, "[{kind}] error: {message}");
                let _ = writeln!(out, "actions: retry | close");
            }
        }
    } else if let Some(menu) = agent.menu() {
        let rect = menu.rect();
        let _ = writeln!(
            out,
            "[menu] rephrase | summarize | explain (at {},{})",
            rect.x, rect.y
        );
    }
}

fn snippet(text: &str) -> String {
    const LIMIT: usize = 40;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}

fn print_help() {
    println!(
        "commands:\n  \
         select <text>      select a substring of the document\n  \
         menu <action>      click a floating-menu action (rephrase/summarize/explain)\n  \
         ctxmenu            context-menu trigger (selection if present, else page)\n  \
         shortcut a|b       keyboard shortcuts (a: rephrase, b: summarize)\n  \
         click <x> <y>      pointer-down at viewport coordinates\n  \
         esc                escape key\n  \
         retry|accept|copy|close   modal actions\n  \
         doc [text]         show or replace the document\n  \
         settings           show active settings\n  \
         quit               end the session"
    );
}
