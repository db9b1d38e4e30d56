// Blocking primitives for the EMOS process core
pub mod condvar;

pub use condvar::CondVar;

/// Thread parking as provided by the scheduler.
///
/// A `wake` delivered before the matching `block` must make that `block`
/// return immediately. `block` may also return without any `wake`.
pub trait Parker {
    /// Handle that identifies a parked thread
    type Waker: Clone + Send + 'static;

    /// Handle for the calling thread
    fn current_waker(&self) -> Self::Waker;

    /// Park the calling thread until woken
    fn block(&self);

    /// Make the thread behind `waker` runnable again
    fn wake(&self, waker: &Self::Waker);
}
