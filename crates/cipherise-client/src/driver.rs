//! Async driver for Sans-IO flows.
//!
//! Executes the actions a [`Flow`] returns and feeds the results back:
//!
//! | Action   | Executed as                  | Answered with                  |
//! |----------|------------------------------|--------------------------------|
//! | `Send`   | [`Transport::request`]       | `Response` / `TransportFailed` |
//! | `Sleep`  | [`Environment::sleep`]       | `Woke`                         |
//! | `Notify` | [`Interaction::notify`]      | nothing                        |
//! | `Prompt` | [`Interaction::decide`]      | `Decided`                      |
//! | `Finish` | returned to the caller       | nothing                        |

use cipherise_core::{CipheriseError, Environment, Flow, FlowAction, FlowEvent, Result};
use tracing::{debug, trace, warn};

use crate::{interaction::Interaction, transport::Transport};

/// Drive `flow` from `Start` until it finishes or fails.
///
/// # Errors
///
/// Whatever the flow returns. Transport failures are handed to the flow,
/// which decides whether they end it.
pub async fn run<F, T, I, E>(
    flow: &mut F,
    transport: &T,
    interaction: &mut I,
    env: &E,
) -> Result<F::Output>
where
    F: Flow + Send,
    T: Transport,
    I: Interaction,
    E: Environment,
{
    let mut event = FlowEvent::Start;

    loop {
        let mut next = None;

        for action in flow.handle(event)? {
            match action {
                FlowAction::Notify(notice) => {
                    trace!(?notice, "notice");
                    interaction.notify(notice);
                },
                FlowAction::Send(request) => {
                    debug!(method = ?request.method, url = %request.url, "sending");
                    next = Some(match transport.request(request).await {
                        Ok(response) => FlowEvent::Response(response),
                        Err(err) => {
                            warn!(error = %err, "request failed");
                            FlowEvent::TransportFailed(err.to_string())
                        },
                    });
                },
                FlowAction::Sleep(duration) => {
                    env.sleep(duration).await;
                    next = Some(FlowEvent::Woke);
                },
                FlowAction::Prompt(prompt) => {
                    trace!(?prompt, "prompt");
                    next = Some(FlowEvent::Decided(interaction.decide(prompt).await));
                },
                FlowAction::Finish(output) => return Ok(output),
            }
        }

        event = next.ok_or(CipheriseError::InvalidState {
            state: "Stalled",
            operation: "drive flow without a pending action",
        })?;
    }
}
