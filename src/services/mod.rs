pub mod container_service;
pub mod depot_service;
pub mod import_service;
pub mod lease_service;
pub mod scheduler;
pub mod search_service;

pub use container_service::*;
pub use depot_service::*;
pub use import_service::*;
pub use lease_service::*;
pub use scheduler::{BillingScheduler, SweepJob, TickOutcome};
pub use search_service::*;
