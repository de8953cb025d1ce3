//! Prints session events to the terminal.

use gemini_live::{EventKind, ListenerId, LiveSession, SessionEvent};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// What to print for `event`, if anything.
pub fn render(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::SetupComplete => {
            Some("Session ready. Type a message and press Enter.\n".to_string())
        }
        SessionEvent::Content(content) => content.joined_text(),
        SessionEvent::TurnComplete => Some("\n".to_string()),
        SessionEvent::Interrupted => Some("\n[interrupted]\n".to_string()),
        SessionEvent::Error(failure) => Some(format!("\n[error] {failure}\n")),
        SessionEvent::Close { code, reason } if reason.is_empty() => {
            Some(format!("\n[closed] code {code}\n"))
        }
        SessionEvent::Close { code, reason } => Some(format!("\n[closed] code {code}: {reason}\n")),
        _ => None,
    }
}

/// Subscribes the console printer and an audio byte counter to `session`.
pub fn attach(session: &LiveSession) -> Vec<ListenerId> {
    let printer = session.on_any(|event| {
        if let Some(text) = render(event) {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
    });

    let counter = AtomicUsize::new(0);
    let audio = session.on(EventKind::Audio, move |event| {
        if let SessionEvent::Audio(data) = event {
            let total = counter.fetch_add(data.len(), Ordering::Relaxed) + data.len();
            debug!(bytes = data.len(), total, "Received model audio");
        }
    });

    let tools = session.on(EventKind::ToolCall, |event| {
        if let SessionEvent::ToolCall(call) = event {
            let names: Vec<_> = call.function_calls.iter().map(|c| c.name.as_str()).collect();
            info!(?names, "Model requested tools");
        }
    });

    vec![printer, audio, tools]
}
