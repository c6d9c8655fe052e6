pub mod claim_server;
pub mod control_plane_client;
pub mod heartbeat_manager;

pub use claim_server::{claim_routes, ClaimState};
pub use control_plane_client::ControlPlaneClient;
pub use heartbeat_manager::HeartbeatManager;
