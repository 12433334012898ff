//! Close-once ownership of collaborator connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::audio::Connection;
use crate::error::Collaborator;

/// Owns a collaborator connection and closes it exactly once.
///
/// Normal and failure paths call [`ConnectionGuard::close`] explicitly. If
/// the guard is dropped unclosed (the consuming stream was cancelled), close
/// is spawned onto the current runtime. Either way the close itself runs on
/// its own task, so cancelling the caller cannot interrupt it halfway. Close
/// errors are logged and swallowed.
pub struct ConnectionGuard<C: Connection + ?Sized + 'static> {
    collaborator: Collaborator,
    connection: Arc<C>,
    closed: AtomicBool,
}

impl<C: Connection + ?Sized + 'static> ConnectionGuard<C> {
    pub fn new(collaborator: Collaborator, connection: Arc<C>) -> Self {
        Self {
            collaborator,
            connection,
            closed: AtomicBool::new(false),
        }
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the connection unless already closed, waiting for it to finish.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(collaborator = %self.collaborator, "closing connection");
        let task = tokio::spawn(close_connection(
            self.collaborator,
            Arc::clone(&self.connection),
        ));
        if let Err(error) = task.await {
            warn!(collaborator = %self.collaborator, %error, "connection close task failed");
        }
    }
}

impl<C: Connection + ?Sized + 'static> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let collaborator = self.collaborator;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(%collaborator, "closing cancelled connection");
                handle.spawn(close_connection(collaborator, Arc::clone(&self.connection)));
            }
            Err(_) => {
                warn!(%collaborator, "no runtime available, connection left open");
            }
        }
    }
}

async fn close_connection<C: Connection + ?Sized + 'static>(
    collaborator: Collaborator,
    connection: Arc<C>,
) {
    if let Err(error) = connection.close().await {
        warn!(%collaborator, %error, "connection close failed");
    }
}

/// Aborts a spawned task when dropped.
pub(crate) struct AbortOnDrop(pub(crate) tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
