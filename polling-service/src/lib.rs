pub mod config;
pub mod coordinator;
pub mod http_api;
pub mod metrics_server;
pub mod observability;
pub mod projection;
pub mod sensors;
pub mod setup;

pub use coordinator::{CoordinatorStatus, PollingCoordinator, SnapshotListener, Subscription};
pub use setup::{AccountContext, AccountRegistry, SetupError};
