pub mod database;
pub mod maintenance;

pub use database::*;
pub use maintenance::{LockMaintenanceService, SweepOptions};
