pub mod app;
pub mod cleanup;
pub mod common;
pub mod shutdown;
