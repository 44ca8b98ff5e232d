//! Shared service state types.

/// Lifecycle state of the maintenance scheduler.
///
/// There is no failed state: a failed pass is logged and the scheduler
/// returns to `Idle` for the next tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServiceState {
    #[default]
    Idle,
    Running,
}
