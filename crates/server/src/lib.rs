//! Stratus lambda server library.
//!
//! Configuration loading, role-based bootstrap and shutdown handling for the
//! `stratus-server` binary.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod shutdown;
