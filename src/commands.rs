use std::io::BufRead;
use std::sync::mpsc::{self, Receiver};
use std::thread;

/// Operator requests, applied between frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Export the most recent frame
    Save,
    /// Forget the learned background, e.g. after the camera moved
    Reset,
    /// Stop after the current frame
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "s" | "save" => Some(Command::Save),
            "r" | "reset" => Some(Command::Reset),
            "q" | "quit" | "exit" | "esc" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Non-blocking view of commands typed on stdin
pub struct CommandChannel {
    rx: Receiver<Command>,
}

impl CommandChannel {
    /// Spawn a reader thread over stdin
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match Command::parse(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => tracing::warn!("Unknown command {:?} (use s, r, q)", line.trim()),
                }
            }
            tracing::debug!("Command reader finished");
        });
        Self { rx }
    }

    /// A channel fed by the caller instead of stdin
    #[cfg(test)]
    pub fn from_receiver(rx: Receiver<Command>) -> Self {
        Self { rx }
    }

    /// All commands received since the last call
    pub fn drain(&self) -> Vec<Command> {
        self.rx.try_iter().collect()
    }
}
