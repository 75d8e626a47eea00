#![allow(dead_code)]

use bloater_core::transport;

pub mod scripted;
pub mod status_server;
