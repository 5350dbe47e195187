use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::BatchError;

/// A batching strategy: turns one accumulated batch of requests into one
/// result per request.
///
/// `dispatch` receives every request accumulated during one batching window
/// and must return exactly one result per request, in request order. Whether
/// the whole batch shares a single store call or each request runs its own
/// is up to the strategy; the dispatch loop only fans the results back out.
pub(crate) trait Strategy: Send + Sync + 'static {
    /// The request accumulated into batches.
    type Request: Send + 'static;

    /// The per-request result value.
    type Response: Send + 'static;

    fn dispatch(
        &self,
        requests: Vec<Self::Request>,
    ) -> impl Future<Output = Vec<Result<Self::Response, BatchError>>> + Send;
}

/// One enqueued request plus the channel its result goes back on.
pub(crate) struct Submission<Y: Strategy> {
    pub(crate) request: Y::Request,
    pub(crate) result_tx: oneshot::Sender<Result<Y::Response, BatchError>>,
}

/// Batching window controls. The facade builder owns the public knobs; every
/// loader spawned under one facade shares the same options.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DispatchOptions {
    pub(crate) delay_duration: tokio::time::Duration,
    pub(crate) eager_batch_size: Option<usize>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions {
            delay_duration: tokio::time::Duration::from_millis(10),
            eager_batch_size: Some(100),
        }
    }
}

/// Owns one loader's dispatch task.
///
/// Submissions accumulate inside the task until the batching window closes
/// (enough requests arrived, or the delay elapsed), then the whole batch
/// runs through the strategy exactly once and every submission hears back on
/// its own channel. Submissions arriving while a batch is mid-dispatch queue
/// up for the next cycle; a group submitted together always lands in a
/// single batch. Cloning is shallow and clones feed the same task.
pub(crate) struct Dispatcher<Y: Strategy> {
    label: Cow<'static, str>,
    submit_tx: mpsc::UnboundedSender<Vec<Submission<Y>>>,
    _dispatch_task: Arc<tokio::task::JoinHandle<()>>,
}

impl<Y: Strategy> Dispatcher<Y> {
    /// Spawn the dispatch task for `strategy`. Must be called within a Tokio
    /// runtime.
    pub(crate) fn spawn(
        strategy: Y,
        label: impl Into<Cow<'static, str>>,
        options: DispatchOptions,
    ) -> Self {
        let label = label.into();
        let (submit_tx, mut submit_rx) = mpsc::unbounded_channel::<Vec<Submission<Y>>>();

        let dispatch_task = tokio::spawn({
            let label = label.clone();
            async move {
                'task: loop {
                    // Wait for some requests to come in
                    let mut batch: Vec<Submission<Y>> = vec![];

                    tracing::trace!(loader = %label, "waiting for requests to dispatch...");
                    match submit_rx.recv().await {
                        Some(submissions) => {
                            tracing::trace!(
                                loader = %label,
                                num_submitted = submissions.len(),
                                "received initial requests",
                            );
                            batch.extend(submissions);
                        }
                        None => {
                            // Submission queue closed, so we're done
                            break 'task;
                        }
                    };

                    // Wait for more requests
                    'wait_for_more: loop {
                        let should_dispatch_now = match options.eager_batch_size {
                            Some(eager_batch_size) => batch.len() >= eager_batch_size,
                            None => false,
                        };
                        if should_dispatch_now {
                            // We have enough requests already, so don't wait for more
                            tracing::trace!(
                                loader = %label,
                                num_pending = batch.len(),
                                eager_batch_size = ?options.eager_batch_size,
                                "batch filled up, ready to dispatch now",
                            );

                            break 'wait_for_more;
                        }

                        let delay = tokio::time::sleep(options.delay_duration);
                        tokio::pin!(delay);

                        tokio::select! {
                            submissions = submit_rx.recv() => {
                                match submissions {
                                    Some(submissions) => {
                                        tracing::trace!(
                                            loader = %label,
                                            num_submitted = submissions.len(),
                                            "received additional requests",
                                        );
                                        batch.extend(submissions);
                                    }
                                    None => {
                                        // Submission queue closed, so we're done waiting
                                        tracing::debug!(
                                            loader = %label,
                                            num_pending = batch.len(),
                                            "submission channel closed",
                                        );
                                        break 'wait_for_more;
                                    }
                                }
                            }
                            _ = &mut delay => {
                                // Reached delay, so we're done waiting for requests
                                tracing::trace!(
                                    loader = %label,
                                    num_pending = batch.len(),
                                    "delay reached while waiting for more requests",
                                );
                                break 'wait_for_more;
                            }
                        };
                    }

                    tracing::trace!(loader = %label, num_pending = batch.len(), "dispatching batch");
                    let (requests, result_txs): (Vec<_>, Vec<_>) = batch
                        .into_iter()
                        .map(|submission| (submission.request, submission.result_tx))
                        .unzip();
                    let results = strategy.dispatch(requests).await;
                    debug_assert_eq!(
                        results.len(),
                        result_txs.len(),
                        "strategy did not return one result per request",
                    );

                    for (result_tx, result) in result_txs.into_iter().zip(results) {
                        // Ignore error if receiver was already closed
                        let _ = result_tx.send(result);
                    }
                }
            }
        });

        Dispatcher {
            label,
            submit_tx,
            _dispatch_task: Arc::new(dispatch_task),
        }
    }

    /// Hand a group of submissions to the dispatch task. The group joins the
    /// accumulating batch whole; it is never split across two batches.
    pub(crate) fn submit(&self, submissions: Vec<Submission<Y>>) -> Result<(), BatchError> {
        self.submit_tx
            .send(submissions)
            .map_err(|_| BatchError::SendError)
    }

    /// Submit one request and wait for its result.
    pub(crate) async fn execute(&self, request: Y::Request) -> Result<Y::Response, BatchError> {
        let (result_tx, result_rx) = oneshot::channel();
        self.submit(vec![Submission { request, result_tx }])?;

        match result_rx.await {
            Ok(result) => result,
            Err(recv_error) => {
                panic!(
                    "Batch result channel for loader {} hung up with error: {recv_error}",
                    self.label,
                );
            }
        }
    }
}

impl<Y: Strategy> Clone for Dispatcher<Y> {
    fn clone(&self) -> Self {
        Dispatcher {
            label: self.label.clone(),
            submit_tx: self.submit_tx.clone(),
            _dispatch_task: self._dispatch_task.clone(),
        }
    }
}
