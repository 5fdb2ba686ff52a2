pub mod gc;
pub mod lifecycle;
pub mod reconciler;
pub mod sync;

pub use reconciler::{Outcome, ReconcileError, Reconciler};
