//! The interactive operator: shows the conflict, asks `fix, quit, skip?`,
//! and on `fix` drops the user into a shell inside the result repository.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::Command;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use braid::replay::{ConflictPrompt, Directive, Operator, OperatorError};
use tracing::debug;

use crate::telemetry;

/// An answer typed at the prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Answer {
    Fix,
    Quit,
    Skip,
}

fn parse_answer(line: &str) -> Option<Answer> {
    match line.trim().to_lowercase().as_str() {
        "fix" | "f" => Some(Answer::Fix),
        "quit" | "q" => Some(Answer::Quit),
        "skip" | "s" => Some(Answer::Skip),
        _ => None,
    }
}

/// Operator backed by the controlling terminal.
pub struct TerminalOperator {
    workdir: PathBuf,
    shell: String,
    timeout: Option<Duration>,
}

impl TerminalOperator {
    /// `shell` falls back to `$SHELL`, then `sh`.
    pub fn new(
        workdir: impl Into<PathBuf>,
        shell: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        let shell = shell
            .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "sh".to_owned());
        Self {
            workdir: workdir.into(),
            shell,
            timeout,
        }
    }

    /// Read one line from stdin, giving up after the timeout.
    ///
    /// The read happens on a helper thread so the wait can be bounded. Only
    /// one line is read per call, so nothing competes with the fix shell for
    /// input.
    fn read_line(&self) -> Result<String, OperatorError> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut line = String::new();
            let read = io::stdin().lock().read_line(&mut line).map(|n| (n, line));
            let _ = tx.send(read);
        });

        let received = match self.timeout {
            Some(timeout) => rx.recv_timeout(timeout).map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => OperatorError::TimedOut(timeout),
                mpsc::RecvTimeoutError::Disconnected => OperatorError::InputClosed,
            })?,
            None => rx.recv().map_err(|_| OperatorError::InputClosed)?,
        };
        match received? {
            (0, _) => Err(OperatorError::InputClosed),
            (_, line) => Ok(line),
        }
    }

    fn spawn_shell(&self) -> Result<(), OperatorError> {
        let mut command = Command::new(&self.shell);
        command.current_dir(&self.workdir);
        if let Some(traceparent) = telemetry::current_traceparent() {
            command.env("TRACEPARENT", traceparent);
        }
        let status = command.status()?;
        debug!(shell = %self.shell, %status, "fix shell exited");
        Ok(())
    }
}

impl Operator for TerminalOperator {
    fn decide(&mut self, prompt: &ConflictPrompt<'_>) -> Result<Directive, OperatorError> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", prompt.details.diff)?;
        writeln!(out, "conflict in {}:", prompt.commit)?;
        for path in prompt.details.paths() {
            writeln!(out, "  {path}")?;
        }
        drop(out);

        loop {
            print!("fix, quit, skip? ");
            io::stdout().flush()?;
            let line = self.read_line()?;
            match parse_answer(&line) {
                Some(Answer::Fix) => {
                    println!("resolve and stage the conflicts, then exit the shell");
                    self.spawn_shell()?;
                    return Ok(Directive::Fix);
                }
                Some(Answer::Quit) => return Ok(Directive::Quit),
                Some(Answer::Skip) => return Ok(Directive::Skip),
                None => println!("answer fix, quit or skip"),
            }
        }
    }

    fn fix_failed(&mut self, _prompt: &ConflictPrompt<'_>) {
        println!("Couldn't continue, did something go wrong?");
    }
}
