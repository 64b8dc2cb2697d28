pub mod messages;
pub mod signing;

pub use messages::*;
