//! Command-line interface components
//!
//! This module contains CLI-specific code for the ISO Fetcher application:
//! argument parsing and the handlers that drive the archive service.

pub mod args;
pub mod commands;

pub use args::{
    CheckArgs, Cli, Commands, DeleteArgs, DiscoverArgs, DownloadArgs, GlobalArgs, ListArgs,
    VerifyArgs,
};
pub use commands::{
    handle_check, handle_delete, handle_discover, handle_download, handle_list, handle_verify,
};
