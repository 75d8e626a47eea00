pub mod config;
pub mod logging;

pub mod client;
pub mod dispatch;
pub mod error;
pub mod halt;
pub mod retry;
pub mod scheduler;
pub mod stats;
pub mod transport;

#[cfg(test)]
#[allow(dead_code)]
#[path = "../tests/common/scripted.rs"]
mod scripted;
