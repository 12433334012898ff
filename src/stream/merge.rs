//! Fan-in of independently paced event sources.
//!
//! One producer task per source writes into a shared bounded channel; the
//! merged stream reads until every producer reports done. Items appear in
//! arrival order, no source has priority.

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, VoxlineError};

/// A fallible, lazily produced sequence.
pub type SourceStream<T> = BoxStream<'static, Result<T>>;

/// Tuning for [`merge_streams_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Hand-off channel capacity shared by all producers.
    pub capacity: usize,
    /// How long cancelled sources get to wind down before being aborted.
    pub shutdown_grace: Duration,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            capacity: 64,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Merge `sources` with default options.
pub fn merge_streams<T: Send + 'static>(sources: Vec<SourceStream<T>>) -> SourceStream<T> {
    merge_streams_with(sources, MergeOptions::default())
}

/// Merge `sources` into one stream.
///
/// - Ends only after every source has ended.
/// - The first source error is yielded as-is and ends the merged stream; all
///   other sources are cancelled and awaited (bounded by `shutdown_grace`)
///   before the error is surfaced. Items they had already buffered are
///   discarded.
/// - A source that panics fails the merged stream with a stream error, after
///   the same sibling shutdown.
/// - Dropping the merged stream cancels every source. Each source stream is
///   dropped by its producer, which runs the source's own cleanup.
pub fn merge_streams_with<T: Send + 'static>(
    sources: Vec<SourceStream<T>>,
    options: MergeOptions,
) -> SourceStream<T> {
    let stream = async_stream::stream! {
        let total = sources.len();
        let (tx, mut rx) = mpsc::channel(options.capacity.max(1));
        let mut producers = Producers::new(options.shutdown_grace);
        for (index, source) in sources.into_iter().enumerate() {
            let cancel = producers.cancel.child_token();
            producers.tasks.spawn(produce(index, source, tx.clone(), cancel));
        }
        drop(tx);

        let mut finished = 0;
        while finished < total {
            // A producer that panics never reports, so watch the tasks too.
            let step = tokio::select! {
                biased;
                signal = rx.recv() => Step::Signal(signal),
                Some(joined) = producers.tasks.join_next(), if !producers.tasks.is_empty() => {
                    Step::Joined(joined)
                }
            };
            let signal = match step {
                Step::Signal(signal) => signal,
                Step::Joined(Ok(())) => continue,
                Step::Joined(Err(error)) => {
                    warn!(%error, "fan-in producer task failed, cancelling siblings");
                    producers.shutdown().await;
                    yield Err(VoxlineError::Stream(format!("fan-in source task failed: {error}")));
                    return;
                }
            };
            match signal {
                Some(Signal::Item(item)) => yield Ok(item),
                Some(Signal::Done) => finished += 1,
                Some(Signal::Failed { index, error }) => {
                    debug!(source = index, %error, "fan-in source failed, cancelling siblings");
                    producers.shutdown().await;
                    yield Err(error);
                    return;
                }
                None => {
                    producers.shutdown().await;
                    yield Err(VoxlineError::Stream(
                        "fan-in source terminated without completing".into(),
                    ));
                    return;
                }
            }
        }
        producers.shutdown().await;
    };
    Box::pin(stream)
}

enum Step<T> {
    Signal(Option<Signal<T>>),
    Joined(std::result::Result<(), JoinError>),
}

enum Signal<T> {
    Item(T),
    Failed { index: usize, error: VoxlineError },
    Done,
}

async fn produce<T>(
    index: usize,
    mut source: SourceStream<T>,
    tx: mpsc::Sender<Signal<T>>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            next = source.next() => next,
        };
        let (signal, last) = match next {
            Some(Ok(item)) => (Signal::Item(item), false),
            Some(Err(error)) => (Signal::Failed { index, error }, true),
            None => (Signal::Done, true),
        };
        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            sent = tx.send(signal) => sent.is_ok(),
        };
        if !sent || last {
            return;
        }
    }
}

struct Producers {
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    grace: Duration,
}

impl Producers {
    fn new(grace: Duration) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
            grace,
        }
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(error) = joined {
                    if error.is_panic() {
                        warn!(%error, "fan-in producer panicked");
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                grace_ms = self.grace.as_millis() as u64,
                "fan-in sources ignored cancellation, aborting"
            );
            self.tasks.abort_all();
        }
    }
}

impl Drop for Producers {
    fn drop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        self.cancel.cancel();
        let mut tasks = std::mem::replace(&mut self.tasks, JoinSet::new());
        let grace = self.grace;
        // Without a runtime the JoinSet drop below aborts everything.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let drained = tokio::time::timeout(grace, async {
                    while tasks.join_next().await.is_some() {}
                })
                .await;
                if drained.is_err() {
                    tasks.abort_all();
                }
            });
        }
    }
}
