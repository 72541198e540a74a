//! Transfer tracking
//!
//! Local mirror of the engine's transfer queue: the job table, the task that
//! keeps it reconciled, folder grouping and the user commands.

pub mod actions;
pub mod grouper;
pub mod reconcile;
pub mod reconciler;
pub mod registry;
pub mod types;

pub use actions::TransferActions;
pub use grouper::{GroupCache, GroupStatus, GroupedView, JobGroup, JobGrouper, TransferRow};
pub use reconcile::{admit_push, merge_progress, plan_poll, PollPlan, Visibility};
pub use reconciler::{EventReconciler, ReconcilerHandle};
pub use registry::{ChangeKind, RegistryChange, TransferRegistry};
pub use types::{JobProgress, TransferJob, TransferKind, TransferPatch, TransferStatus};
