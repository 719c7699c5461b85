pub mod config;
pub mod serve;
pub mod tail;
pub mod trigger;
