//! # FIPS fleet control library
//!
//! Core functionality for the FIPS-compliance fleet control plane. The
//! binaries produced by this crate (controller, agent, gateway, self-test
//! CLI) all consume this library.

pub mod agent;
pub mod backend;
pub mod build_info;
pub mod checker;
pub mod event;
pub mod fleet;
pub mod http;
pub mod logging;
pub mod proxy;
pub mod selftest;
pub mod utils;
