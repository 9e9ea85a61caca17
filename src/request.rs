//! One-shot async requests polled from the UI tick.
//!
//! Writes do not go through the query cache: a view starts the request,
//! keeps rendering, and picks up the outcome on a later tick.
//!
//! ```ignore
//! let pipeline = session.mutations.clone();
//! self.save.start(async move { pipeline.submit(id, patch).await });
//!
//! // In tick
//! if self.save.poll() {
//!     match self.save.state() { ... }
//! }
//! ```

use std::future::Future;

use tokio::sync::oneshot;
use tracing::warn;

/// The state of a request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState<T, E> {
  /// Not started, or reset
  Idle,
  Pending,
  Success(T),
  Failed(E),
}

pub struct Request<T, E> {
  state: RequestState<T, E>,
  receiver: Option<oneshot::Receiver<Result<T, E>>>,
}

impl<T, E> Default for Request<T, E> {
  fn default() -> Self {
    Self {
      state: RequestState::Idle,
      receiver: None,
    }
  }
}

impl<T: Send + 'static, E: Send + 'static> Request<T, E> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> &RequestState<T, E> {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.state, RequestState::Pending)
  }

  /// Spawn `future` unless a request is already pending.
  ///
  /// Returns whether the request was started.
  pub fn start<F>(&mut self, future: F) -> bool
  where
    F: Future<Output = Result<T, E>> + Send + 'static,
  {
    if self.is_pending() {
      return false;
    }
    let (tx, rx) = oneshot::channel();
    self.receiver = Some(rx);
    self.state = RequestState::Pending;
    tokio::spawn(async move {
      // The receiver may have been dropped with the view
      let _ = tx.send(future.await);
    });
    true
  }

  /// Pick up the outcome of a pending request.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = self.receiver.as_mut() else {
      return false;
    };
    match receiver.try_recv() {
      Ok(Ok(value)) => self.state = RequestState::Success(value),
      Ok(Err(error)) => self.state = RequestState::Failed(error),
      Err(oneshot::error::TryRecvError::Empty) => return false,
      Err(oneshot::error::TryRecvError::Closed) => {
        warn!("request task ended without a result");
        self.state = RequestState::Idle;
      }
    }
    self.receiver = None;
    true
  }

  /// Forget the outcome and go back to idle
  pub fn reset(&mut self) {
    self.state = RequestState::Idle;
    self.receiver = None;
  }
}
