pub mod clock;
pub mod config;
pub mod crypto;
pub mod ids;
