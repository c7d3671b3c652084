//! Velador - In-process async handle leak reporter with call-site attribution
//!
//! This library answers "why won't my process exit?" by correlating a
//! runtime's outstanding handles (sockets, timers, child processes, generic
//! streams) back to the call sites that created them, using stack traces
//! captured at creation time.

pub mod classify;
pub mod error;
pub mod handle;
pub mod provenance;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod stack;
