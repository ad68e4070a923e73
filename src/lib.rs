//! Per-space preference toggling for macOS.
//!
//! A daemon watches which space (virtual desktop) is showing and keeps one
//! system preference in the state the user chose for that space. The
//! command-line client talks to it over a local socket.

pub mod actor;
pub mod common;
pub mod daemon;
pub mod ipc;
pub mod model;
pub mod sys;
