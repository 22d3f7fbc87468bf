//! A background task feeding engine events into the scheduler.
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ImportScheduler;
use crate::{
    engine::{EventReceiver, FetchEngine},
    SchedulerError,
};

/// Controls a listener started with [`ImportScheduler::spawn_listener`].
#[derive(Debug)]
pub struct ListenerHandle {
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stop listening and wait for the task to exit.
    ///
    /// Events still queued in the channel are not handled.
    pub async fn graceful_shutdown(mut self) -> Result<(), SchedulerError> {
        self.cancellation_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|_| SchedulerError::GracefulShutdownFailed)?;
        }
        Ok(())
    }
}

impl<E> ImportScheduler<E>
where
    E: FetchEngine + 'static,
{
    /// Spawn a task handling every event received on `events`.
    ///
    /// The task runs until the handle is shut down or every sender of the channel is dropped.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn spawn_listener(self: &Arc<Self>, mut events: EventReceiver) -> ListenerHandle {
        let cancellation_token = CancellationToken::new();
        let handle = tokio::spawn({
            let scheduler = self.clone();
            let cancellation_token = cancellation_token.clone();
            async move {
                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Some(event) => {
                                if let Err(err) = scheduler.handle_event(event) {
                                    tracing::error!(?err, "Failed to handle fetch engine event");
                                }
                            }
                            None => {
                                tracing::debug!("Fetch engine event channel closed");
                                break;
                            }
                        },
                        _ = cancellation_token.cancelled() => {
                            tracing::debug!("Shutting down the fetch engine listener");
                            break;
                        }
                    }
                }
            }
        });
        ListenerHandle {
            cancellation_token,
            handle: Some(handle),
        }
    }
}
