pub mod health;
pub mod jobs;
pub mod locks;
pub mod workers;
