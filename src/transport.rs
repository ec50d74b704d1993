//! Console chat transport.
//!
//! Stands in for a messaging platform: one local subscriber types on stdin
//! and reads replies and alerts on stdout. `/cmd` lines are commands, `!id`
//! lines press a button, anything else is free text.

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::QuoteResolver;
use crate::bot::{Bot, EventKind, InboundEvent, Reply};
use crate::error::DeliveryError;
use crate::models::SubscriberId;
use crate::notify::Notifier;

/// Turn an input line into an inbound event kind. Blank lines yield nothing.
pub fn parse_line(line: &str) -> Option<EventKind> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with('/') {
        return Some(EventKind::Command(line.to_string()));
    }
    match line.strip_prefix('!') {
        Some(id) => Some(EventKind::Action(id.trim().to_string())),
        None => Some(EventKind::Text(line.to_string())),
    }
}

/// Render a reply as plain text with its buttons as `[label] !id`.
pub fn render_reply(reply: &Reply) -> String {
    let mut out = reply.body();
    if let Some(menu) = &reply.menu {
        for row in &menu.rows {
            let buttons: Vec<String> = row
                .iter()
                .map(|b| format!("[{}] !{}", b.label, b.action))
                .collect();
            out.push_str("\n  ");
            out.push_str(&buttons.join("   "));
        }
    }
    out
}

/// Prints alerts on stdout.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    async fn deliver(&self, subscriber: SubscriberId, text: &str) -> Result<(), DeliveryError> {
        let mut out = io::stdout().lock();
        writeln!(out, "\n--- alert for {subscriber} ---\n{text}\n")?;
        out.flush()?;
        Ok(())
    }
}

fn print_reply(reply: &Reply) -> io::Result<()> {
    if reply.messages.is_empty() && reply.menu.is_none() {
        return Ok(());
    }
    let mut out = io::stdout().lock();
    writeln!(out, "{}\n", render_reply(reply))?;
    out.flush()
}

/// Read stdin lines on a plain thread so a pending read never holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Read stdin until EOF, `/quit` or `shutdown`, handling each line as `subscriber`.
pub async fn run_console<R, N>(
    bot: Arc<Bot<R, N>>,
    subscriber: SubscriberId,
    name: &str,
    shutdown: impl Future<Output = ()>,
) -> Result<()>
where
    R: QuoteResolver,
    N: Notifier,
{
    let mut lines = spawn_stdin_reader();
    tokio::pin!(shutdown);

    let greeting = bot
        .handle(InboundEvent::new(subscriber, name, EventKind::Command("/start".into())))
        .await;
    print_reply(&greeting).context("Failed to write to stdout")?;

    loop {
        let line = tokio::select! {
            _ = &mut shutdown => break,
            line = lines.recv() => line.transpose().context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            debug!("stdin closed");
            break;
        };
        if matches!(line.trim(), "/quit" | "/exit") {
            break;
        }
        let Some(kind) = parse_line(&line) else {
            continue;
        };

        let reply = bot.handle(InboundEvent::new(subscriber, name, kind)).await;
        print_reply(&reply).context("Failed to write to stdout")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::menu::Menu;

    #[test]
    fn test_parse_line_kinds() {
        assert_eq!(parse_line("  "), None);
        assert_eq!(
            parse_line("/add bitcoin"),
            Some(EventKind::Command("/add bitcoin".into()))
        );
        assert_eq!(
            parse_line("! override:bitcoin:2"),
            Some(EventKind::Action("override:bitcoin:2".into()))
        );
        assert_eq!(parse_line(" 1.5 "), Some(EventKind::Text("1.5".into())));
    }

    #[test]
    fn test_render_reply_lists_buttons() {
        let reply = Reply::text("Pick one").with_menu(
            Menu::new()
                .button("Bitcoin", Action::Add("bitcoin".into()))
                .back_to_main(),
        );
        assert_eq!(
            render_reply(&reply),
            "Pick one\n  [Bitcoin] !add:bitcoin\n  [Main menu] !menu"
        );
    }
}
