//! CLI command modules.

pub mod display;
pub mod history;
pub mod http;
pub mod receive;
pub mod send;
pub mod status;
