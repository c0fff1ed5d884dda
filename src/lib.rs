pub mod api;
pub mod app;
pub mod attribute_names;
pub mod config;
pub mod lifecycle;
pub mod outputs;
pub mod sandbox;
pub mod shared;
pub mod terraform;
pub mod variables;
