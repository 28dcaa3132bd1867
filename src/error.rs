use thiserror::Error;

/// The conditions a handle operation can report instead of panicking.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum HandleError {
    /// Promotion of a weak reference failed: the handle is null or the object
    /// has already been destroyed.
    #[error("stale weak reference: the object has already been destroyed")]
    StaleReference,
    /// A self-reference was requested from an object that was never placed
    /// under shared ownership.
    #[error("object is not owned by any shared handle")]
    NoOwningBlock,
}
