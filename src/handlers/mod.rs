pub mod billing;
pub mod containers;
pub mod depots;
pub mod imports;
pub mod leases;
pub mod search;

pub use billing::*;
pub use containers::*;
pub use depots::*;
pub use imports::*;
pub use leases::*;
pub use search::*;
