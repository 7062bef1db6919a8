#[macro_use]
extern crate quick_error;

pub mod cameras;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod server;
pub mod services;
