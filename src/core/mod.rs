//! Core configuration and error types shared across the protocol.

pub mod config;
pub mod error;
