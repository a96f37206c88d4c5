//! Library surface for the relay proxy binary and its integration tests.

pub mod config;
pub mod correlation;
pub mod cursor;
pub mod error;
pub mod frame;
pub mod interceptor;
pub mod listener;
pub mod pipeline;
pub mod schema;
