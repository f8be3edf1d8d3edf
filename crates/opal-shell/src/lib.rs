//! Opal shell bridge.
//!
//! This crate is linked into the embedded-browser host process that
//! renders the desktop chrome. It owns the shell side of the
//! compositor socket and the two surfaces the host wires up:
//!
//! - [`bridge::handle_query`]: the web view's native query handler.
//!   Takes the JSON array the shell's JavaScript sends, turns it into
//!   protocol requests, and returns pending compositor replies as the
//!   JSON query result.
//! - [`scheme::SchemeHandler`]: the `opal://shell/...` resource
//!   handler serving shell assets from the user's config directory and
//!   registering each served file for hot reload.
//!
//! On startup the host calls
//! [`ipc::ShellEndpoint::announce_base_window`] with its own X window
//! so the compositor can pin it behind every client as the desktop
//! surface.

pub mod bridge;
pub mod ipc;
pub mod scheme;

pub use bridge::{handle_query, BridgeError};
pub use ipc::ShellEndpoint;
pub use scheme::{SchemeHandler, SchemeResponse};
