//! Run an invocation on a background task and talk to it over channels.
//!
//! The caller never blocks on a child process: it receives
//! [`InvocationEvent`]s, answers at most one input request through the
//! attached [`InputReply`], and finally gets the [`FinalResult`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::sandbox::{CompileRequest, InputProvider, Sandbox};
use crate::verdict::FinalResult;

/// Messages from a running invocation to its caller.
#[derive(Debug)]
pub enum InvocationEvent {
    /// The program seems to be waiting for input. Answer through the reply;
    /// dropping it counts as declining.
    InputRequested(InputReply),
    /// Terminal event: the invocation is over and its workspace is gone.
    Finished(FinalResult),
}

/// One-shot answer to an input request.
#[derive(Debug)]
pub struct InputReply(oneshot::Sender<Option<String>>);

impl InputReply {
    pub fn provide(self, text: String) {
        if self.0.send(Some(text)).is_err() {
            debug!("Invocation ended before input arrived");
        }
    }

    pub fn decline(self) {
        if self.0.send(None).is_err() {
            debug!("Invocation ended before input was declined");
        }
    }
}

/// Receiving side of a background invocation.
#[derive(Debug)]
pub struct InvocationHandle {
    events: mpsc::Receiver<InvocationEvent>,
}

impl InvocationHandle {
    /// Next event, or `None` once the invocation task is gone.
    pub async fn next_event(&mut self) -> Option<InvocationEvent> {
        self.events.recv().await
    }

    /// Drive the invocation to completion, answering input requests
    /// from `provider`.
    pub async fn finish_with(mut self, provider: &dyn InputProvider) -> FinalResult {
        while let Some(event) = self.next_event().await {
            match event {
                InvocationEvent::InputRequested(reply) => match provider.request_input().await {
                    Some(text) => reply.provide(text),
                    None => reply.decline(),
                },
                InvocationEvent::Finished(result) => return result,
            }
        }
        FinalResult::ExecutionError("invocation ended without a result".into())
    }
}

/// Forwards input requests to the caller over the event channel.
struct ChannelInput {
    events: mpsc::Sender<InvocationEvent>,
}

#[async_trait]
impl InputProvider for ChannelInput {
    async fn request_input(&self) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        if self
            .events
            .send(InvocationEvent::InputRequested(InputReply(tx)))
            .await
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }
}

/// Start `request` on its own task.
///
/// A panic inside the pipeline is reported as an execution error; the
/// workspace and any child processes are still cleaned up on unwind.
pub fn spawn_invocation(sandbox: Arc<Sandbox>, request: CompileRequest) -> InvocationHandle {
    let (tx, rx) = mpsc::channel(4);

    let provider = ChannelInput { events: tx.clone() };
    tokio::spawn(async move {
        let worker =
            tokio::spawn(async move { sandbox.compile_and_run(&request, &provider).await });

        let result = match worker.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Invocation task failed");
                FinalResult::ExecutionError(format!("internal error: {e}"))
            }
        };

        if tx.send(InvocationEvent::Finished(result)).await.is_err() {
            debug!("Caller dropped the invocation handle");
        }
    });

    InvocationHandle { events: rx }
}
