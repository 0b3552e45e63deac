// Terminal front end for the same controller the web UI drives.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::controller::{ConversationController, Notice, NoticeLevel, StartRequest};
use crate::session::{Role, Session};

const HELP: &str = "Commands: /show prints the conversation, /reset starts over, /quit exits.";

pub async fn run_chat<R, W>(controller: &ConversationController, input: &mut R, out: &mut W) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    info!("Starting interactive exploration chat...");

    match controller.session() {
        Some(session) => {
            writeln!(out, "Resuming exploration: {}", session.topic)?;
            print_transcript(out, &session)?;
        }
        None => {
            if !start_exploration(controller, input, out).await? {
                return Ok(());
            }
        }
    }
    writeln!(out, "{}", HELP)?;

    loop {
        let Some(line) = prompt(input, out, "> ")? else {
            break;
        };
        match line.as_str() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/help" => writeln!(out, "{}", HELP)?,
            "/show" => {
                if let Some(session) = controller.session() {
                    print_transcript(out, &session)?;
                }
            }
            "/reset" => {
                if !reset(controller, input, out)? {
                    continue;
                }
                if !start_exploration(controller, input, out).await? {
                    break;
                }
            }
            text => match controller.continue_session(text).await {
                Ok(session) => {
                    if let Some(reply) = session.messages.last() {
                        writeln!(out, "\nAI: {}\n", reply.content)?;
                    }
                }
                Err(e) => print_notice(out, &Notice::reply_failed(&e))?,
            },
        }
    }

    info!("Chat session finished.");
    Ok(())
}

/// Asks for topic, viewpoint and reference until a session starts. Returns
/// `false` if input ran out first.
async fn start_exploration<R: BufRead, W: Write>(
    controller: &ConversationController,
    input: &mut R,
    out: &mut W,
) -> Result<bool> {
    loop {
        let Some(topic) = prompt(input, out, "What topic would you like to explore? ")? else {
            return Ok(false);
        };
        let Some(viewpoint) = prompt(input, out, "What is your viewpoint on this topic? ")? else {
            return Ok(false);
        };
        let Some(reference_url) = prompt(input, out, "Reference URL (optional): ")? else {
            return Ok(false);
        };

        let request = StartRequest {
            topic,
            viewpoint,
            reference_url: Some(reference_url),
        };
        match controller.start_session(request).await {
            Ok(outcome) => {
                for notice in Notice::for_start(&outcome) {
                    print_notice(out, &notice)?;
                }
                print_transcript(out, &outcome.session)?;
                return Ok(true);
            }
            Err(e) => print_notice(out, &Notice::start_failed(&e))?,
        }
    }
}

/// Two-step reset: request, then confirm or cancel on the user's answer.
fn reset<R: BufRead, W: Write>(
    controller: &ConversationController,
    input: &mut R,
    out: &mut W,
) -> Result<bool> {
    if let Err(e) = controller.request_reset() {
        print_notice(out, &Notice::error(e.to_string()))?;
        return Ok(false);
    }
    let answer = prompt(
        input,
        out,
        "Explore a new topic? This will clear the history and cannot be undone. [y/N] ",
    )?;
    if matches!(answer.as_deref(), Some("y") | Some("Y") | Some("yes")) {
        controller.confirm_reset()?;
        print_notice(out, &Notice::reset_done())?;
        Ok(true)
    } else {
        controller.cancel_reset();
        Ok(false)
    }
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, label: &str) -> Result<Option<String>> {
    write!(out, "{}", label)?;
    out.flush()?;
    let mut line = String::new();
    let read = input.read_line(&mut line).context("Failed to read from stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

pub fn print_transcript<W: Write>(out: &mut W, session: &Session) -> Result<()> {
    writeln!(out, "\nTopic: {}", session.topic)?;
    writeln!(out, "Your view: {}", session.user_viewpoint)?;
    if let Some(url) = &session.reference_url {
        writeln!(out, "Reference: {}", url)?;
    }
    writeln!(out)?;
    for message in &session.messages {
        let speaker = match message.role {
            Role::User => "You",
            Role::Ai => "AI",
        };
        writeln!(out, "{}: {}", speaker, message.content)?;
        if session.is_unanswered(message) {
            writeln!(out, "   (no reply yet)")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn print_notice<W: Write>(out: &mut W, notice: &Notice) -> Result<()> {
    let tag = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Warning => "warn",
        NoticeLevel::Error => "error",
    };
    writeln!(out, "[{}] {}", tag, notice.text)?;
    Ok(())
}
