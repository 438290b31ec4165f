//! API endpoint handlers.

pub mod diseases;
pub mod health;
pub mod images;
pub mod scans;
