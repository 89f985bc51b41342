use crate::session::{Session, SessionError, Transcript};
use std::io::Write;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

/// Input that ends the session, compared case-insensitively.
pub const EXIT_COMMAND: &str = "exit";

const PROMPT: &str = "You: ";

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The user typed the exit command; the farewell was printed.
    Farewell,
    /// Input closed before an exit command.
    EndOfInput,
    Cancelled,
}

pub fn is_exit_command(input: &str) -> bool {
    input.to_lowercase() == EXIT_COMMAND
}

/// Read a line, generate a reply, print it; repeat until the exit command,
/// end of input or cancellation.
///
/// A generation error ends the loop and is returned as-is: nothing is printed
/// for that turn and it is not retried.
pub async fn run<R, W>(
    session: &mut Session,
    input: R,
    out: &mut W,
    cancel: &CancellationToken,
) -> Result<LoopExit, SessionError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let speaker = session.profile().speaker;
    let trim_input = session.profile().trim_input;

    writeln!(out, "{}", session.profile().banner)?;

    let mut lines = input.lines();
    let mut turn = 0_usize;

    let exit = loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => break LoopExit::Cancelled,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            writeln!(out)?;
            break LoopExit::EndOfInput;
        };
        let line = if trim_input {
            line.trim().to_string()
        } else {
            line
        };

        if is_exit_command(&line) {
            writeln!(out, "{}", session.profile().farewell)?;
            break LoopExit::Farewell;
        }

        turn += 1;
        let started = Instant::now();
        let reply = tokio::select! {
            biased;
            () = cancel.cancelled() => break LoopExit::Cancelled,
            reply = session.generate(&line) => reply,
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(turn, "generation failed: {e}");
                session.fail();
                return Err(e);
            }
        };

        writeln!(out, "{speaker}: {reply}\n")?;
        out.flush()?;
        session.record_turn(&line, &reply);

        tracing::info!(
            turn,
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            reply_chars = reply.chars().count(),
            "turn complete"
        );
    };

    out.flush()?;
    session.terminate();
    tracing::debug!(
        turns = turn,
        recorded = ?session.transcript().map(Transcript::turns),
        exit = ?exit,
        "chat loop finished"
    );
    Ok(exit)
}

/// Answer a single message without the banner or prompt.
pub async fn run_single<W: Write>(
    session: &mut Session,
    message: &str,
    out: &mut W,
) -> Result<(), SessionError> {
    let message = if session.profile().trim_input {
        message.trim()
    } else {
        message
    };
    let reply = match session.generate(message).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!("generation failed: {e}");
            session.fail();
            return Err(e);
        }
    };
    writeln!(out, "{}: {reply}", session.profile().speaker)?;
    out.flush()?;
    session.record_turn(message, &reply);
    session.terminate();
    Ok(())
}
