pub mod config;

mod events;
mod manager;
mod reconcile;
mod scheduler;
#[cfg(test)]
pub(crate) mod testing;

pub use config::{SchedulerConfig, SyncMode, SyncResult};
pub use events::{Listener, LayoutEvent, LayoutEventKind, LayoutEvents, ListenerId};
pub use manager::{LayoutError, LayoutManager};
pub use reconcile::{compute_sync_operations, SyncOperation};
pub use scheduler::{start_sync_scheduler, SyncScheduler, SyncSchedulerMessage};
