use std::future::Future;

use tokio::task::JoinHandle;

use crate::error::{PipelineError, PipelineResult};

/// Handle to the background write behind an optimistic change.
///
/// The local state is already updated when a store hands one of these back.
/// Awaiting [`Confirmation::wait`] reports whether the server accepted it; on
/// failure the store has rolled back by the time the error surfaces.
#[derive(Debug)]
pub struct Confirmation {
    handle: Option<JoinHandle<PipelineResult<()>>>,
}

impl Confirmation {
    /// Nothing was written (e.g. a move onto the current stage).
    pub fn settled() -> Self {
        Self { handle: None }
    }

    pub(crate) fn spawn<F>(write: F) -> Self
    where
        F: Future<Output = PipelineResult<()>> + Send + 'static,
    {
        Self {
            handle: Some(tokio::spawn(write)),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.handle.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub async fn wait(self) -> PipelineResult<()> {
        match self.handle {
            None => Ok(()),
            Some(handle) => handle
                .await
                .map_err(|err| PipelineError::Aborted(err.to_string()))?,
        }
    }
}
