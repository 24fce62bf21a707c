//! Interactive exam page.
//!
//! Keys go to the answer buffer and, timestamped, to the verifier link. The
//! verifier can end the attempt at any moment; the candidate ends it with
//! Ctrl-D (submit) or Esc (abandon).

use std::io::{self, Write};
use std::sync::Arc;

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use futures::StreamExt;

use examguard_core::{
    ChannelStatus, Clock, ExamForm, MonotonicClock, ProctorError, Result, submit_exam,
};
use examguard_net::VerifierLink;

use super::{Context, runtime};
use crate::GlobalArgs;

/// Restores cooked mode on drop, including on early return.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

enum Finish {
    Submit,
    Abandon,
}

/// What a key press does to the answer buffer.
#[derive(Debug, PartialEq, Eq)]
enum KeyAction {
    Insert(char),
    Newline,
    Backspace,
    Submit,
    Abandon,
    Ignore,
}

fn classify(key: &KeyEvent) -> KeyAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('d') if ctrl => KeyAction::Submit,
        KeyCode::Char('c') if ctrl => KeyAction::Abandon,
        KeyCode::Esc => KeyAction::Abandon,
        KeyCode::Char(c) if !ctrl => KeyAction::Insert(c),
        KeyCode::Enter => KeyAction::Newline,
        KeyCode::Backspace => KeyAction::Backspace,
        _ => KeyAction::Ignore,
    }
}

fn status_badge(status: ChannelStatus) -> String {
    match status {
        ChannelStatus::Secure => " SECURE CONNECTION ".black().on_green().to_string(),
        ChannelStatus::Disconnected => " DISCONNECTED ".white().on_red().to_string(),
    }
}

fn echo(text: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes())?;
    out.flush()
}

pub fn run(global: &GlobalArgs, exam_id: &str, question_id: &str, question: &str) -> Result<()> {
    let ctx = Context::new(global)?;
    runtime()?.block_on(sit(ctx, exam_id, question_id, question))
}

async fn sit(ctx: Context, exam_id: &str, question_id: &str, question: &str) -> Result<()> {
    let principal = ctx
        .session
        .check_session()
        .await
        .ok_or(ProctorError::AuthenticationRejected)?;

    let clock = MonotonicClock::new();
    let mut link = VerifierLink::mount(
        ctx.config.clone(),
        principal.id.to_string(),
        Arc::clone(ctx.session.credentials()),
        Arc::clone(&ctx.navigator),
    )
    .await;
    let mut form = ExamForm::open(exam_id, question_id, clock.now_ms());

    println!("{}  {exam_id}/{question_id}", status_badge(link.status()));
    println!();
    println!("{}", question.bold());
    println!();
    println!("{}", "Type your answer. Ctrl-D submits, Esc abandons.".dim());
    println!();

    let finish = {
        let _raw = RawMode::enable()?;
        let mut events = EventStream::new();
        let mut last_status = link.status();

        loop {
            tokio::select! {
                maybe_event = events.next() => {
                    let key = match maybe_event {
                        Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => key,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => break Finish::Abandon,
                    };
                    match classify(&key) {
                        KeyAction::Submit => break Finish::Submit,
                        KeyAction::Abandon => break Finish::Abandon,
                        KeyAction::Ignore => continue,
                        KeyAction::Insert(c) => {
                            form.type_answer(c.encode_utf8(&mut [0; 4]));
                            echo(c.encode_utf8(&mut [0; 4]))?;
                        }
                        KeyAction::Newline => {
                            form.type_answer("\n");
                            echo("\r\n")?;
                        }
                        KeyAction::Backspace => {
                            form.backspace();
                            echo("\x08 \x08")?;
                        }
                    }
                    link.keystroke(clock.now_ms());
                }
                event = link.next_event() => {
                    event?.into_result()?;
                }
            }

            if link.status() != last_status {
                last_status = link.status();
                echo(&format!("\r\n{}\r\n", status_badge(last_status)))?;
            }
        }
    };
    println!();

    let stats = link.stats();
    link.unmount().await;
    log::info!(
        "keystrokes {} sent {} dropped {} (disconnected) {} (non-positive)",
        stats.keystrokes,
        stats.sent,
        stats.dropped_disconnected,
        stats.dropped_non_positive
    );

    match finish {
        Finish::Abandon => {
            println!("Answer discarded.");
            Ok(())
        }
        Finish::Submit => {
            let submission = form.into_submission(&principal, clock.now_ms());
            let result = submit_exam(ctx.session.transport(), &submission).await?;
            println!("{}", result.summary());
            Ok(())
        }
    }
}
