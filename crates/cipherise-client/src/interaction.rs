//! Caller side of a flow run.

use std::future::Future;

use cipherise_core::{Decision, Notice, Prompt};

/// Receives notices and answers prompts for one flow run.
///
/// `decide` may take as long as the caller likes, e.g. while a user looks
/// at a scan code. The flow does not advance until it returns.
pub trait Interaction: Send {
    /// Observe a progress notice.
    fn notify(&mut self, notice: Notice);

    /// Answer a prompt.
    fn decide(&mut self, prompt: Prompt) -> impl Future<Output = Decision> + Send;
}
