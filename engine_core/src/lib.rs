//! Shared engine services (logging).
#![forbid(unsafe_code)]

pub mod logging;
