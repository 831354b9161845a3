pub mod config;
pub mod job;
pub mod node;
pub mod resources;
pub mod sock;
