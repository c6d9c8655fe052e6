pub mod components;
pub mod distributor;

pub use components::{claim_routes, ClaimState, ControlPlaneClient, HeartbeatManager};
pub use distributor::WorkDistributor;
