//! Middleware for the scan API.

pub mod access_log;
