/// Error indicating that a batched request could not be completed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BatchError {
    /// The store call for the batch failed. The message is the error
    /// reported by the [`DocumentStore`](crate::DocumentStore), stringified
    /// so every caller waiting on the batch can receive it.
    #[error("error dispatching batch to store: {0}")]
    Store(String),

    /// The request could not be handed to the loader's dispatch task. This
    /// usually means the task was shut down.
    #[error("error sending batch request")]
    SendError,
}
