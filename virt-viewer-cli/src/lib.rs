//! `virt-viewer` and `remote-viewer` front-ends
//!
//! Argument parsing, the terminal stand-ins for the credential and error
//! dialogs, and the loop that drives the core [`App`](virt_viewer_core::App).

pub mod cli;
pub mod commands;
pub mod error;
pub mod runner;
pub mod terminal;
pub mod util;
