//! Terminal caller: prompts on stdout, answers from stdin.

use std::fmt::Display;

use cipherise_client::Interaction;
use cipherise_core::{Decision, Notice, Prompt};
use cipherise_proto::PayloadRequest;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

/// Answers prompts from the terminal.
///
/// `ContinuePolling` is always accepted; interrupt the process to stop.
pub struct Terminal {
    lines: Lines<BufReader<Stdin>>,
    assume_yes: bool,
    payload: PayloadRequest,
}

impl Terminal {
    /// Terminal that sends `payload` when asked for one.
    pub fn new(assume_yes: bool, payload: PayloadRequest) -> Self {
        Self { lines: BufReader::new(tokio::io::stdin()).lines(), assume_yes, payload }
    }

    async fn confirm(&mut self, question: &str) -> Decision {
        if self.assume_yes {
            say(format_args!("{question} [y/N] y"));
            return Decision::Accept;
        }

        say(format_args!("{question} [y/N]"));
        match self.lines.next_line().await {
            Ok(Some(answer)) => match answer.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => Decision::Accept,
                _ => Decision::Decline,
            },
            Ok(None) => Decision::Decline,
            Err(err) => {
                debug!(error = %err, "stdin closed, declining");
                Decision::Decline
            },
        }
    }
}

/// Write one line for the user.
#[allow(clippy::print_stdout)]
pub fn say(line: impl Display) {
    println!("{line}");
}

impl Interaction for Terminal {
    fn notify(&mut self, notice: Notice) {
        match notice {
            Notice::WaitingForApp => say("Waiting for the app..."),
            Notice::AppIdentifiedUser { username } => {
                say(format_args!("Device identified user '{username}'"));
            },
            Notice::Timeout => say("Request expired"),
            Notice::Error { message } => say(format_args!("Device error: {message}")),
        }
    }

    async fn decide(&mut self, prompt: Prompt) -> Decision {
        match prompt {
            Prompt::ShowScanCode { url } => {
                say(format_args!("Scan code: {url}"));
                self.confirm("Is the code on display?").await
            },
            Prompt::ShowDirectUrl { url } => {
                say(format_args!("Same-device link: {url}"));
                self.confirm("Continue?").await
            },
            Prompt::ShowIdenticon { url } => {
                say(format_args!("Identicon: {url}"));
                self.confirm("Does it match the identicon on the device?").await
            },
            Prompt::ContinuePolling => Decision::Accept,
            Prompt::PayloadToSend => Decision::Payload(self.payload.clone()),
            Prompt::PayloadReceived { values } => {
                for (key, value) in &values {
                    say(format_args!("  {key} = {value}"));
                }
                self.confirm("Accept the device's payload?").await
            },
        }
    }
}
