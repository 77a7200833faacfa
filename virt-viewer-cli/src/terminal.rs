//! Terminal stand-ins for the credential and error dialogs

use std::io::{self, BufRead, Write};

use secrecy::SecretString;
use virt_viewer_core::app::Notifier;
use virt_viewer_core::credentials::{
    Cancelled, CredentialCollector, CredentialRequest, Credentials,
};

/// Reads one line from stdin after printing `prompt` to stderr
///
/// Returns `None` on end of input or a read error.
pub fn read_line(prompt: &str) -> Option<String> {
    eprint!("{prompt}");
    io::stderr().flush().ok()?;
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

/// Whether a yes/no answer means yes
#[must_use]
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Asks for credentials on the terminal
///
/// End of input cancels the prompt.
#[derive(Debug, Default)]
pub struct TerminalCollector;

impl CredentialCollector for TerminalCollector {
    fn collect(&mut self, request: &CredentialRequest) -> Result<Credentials, Cancelled> {
        eprintln!("{}", request.prompt());
        let username = if request.need_username {
            Some(read_line("Username: ").ok_or(Cancelled)?)
        } else {
            None
        };
        let password = if request.need_password {
            let password = rpassword::prompt_password("Password: ").map_err(|e| {
                tracing::debug!(error = %e, "Password prompt failed");
                Cancelled
            })?;
            Some(SecretString::from(password))
        } else {
            None
        };
        Ok(Credentials { username, password })
    }
}

/// Prints dialogs and status changes to stderr
#[derive(Debug, Default)]
pub struct TerminalNotifier {
    last_status: String,
}

impl Notifier for TerminalNotifier {
    fn error(&mut self, message: &str) {
        eprintln!("Error: {message}");
    }

    fn ask_retry(&mut self, message: &str) -> bool {
        eprintln!("{message}");
        read_line("[y/N] ").is_some_and(|answer| is_yes(&answer))
    }

    fn status(&mut self, message: &str) {
        if message.is_empty() || message == self.last_status {
            self.last_status = message.to_string();
            return;
        }
        eprintln!("{message}");
        self.last_status = message.to_string();
    }

    fn bell(&mut self) {
        eprint!("\x07");
    }

    fn cut_text(&mut self, text: &str) {
        tracing::debug!(len = text.len(), "Guest clipboard changed");
    }
}
