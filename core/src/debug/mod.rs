//! Breakpoint debugging of compiled flows.
//!
//! The runtime side ([`server`]) serves the wire protocol from inside a
//! `robotflow run --inspect` process; the host side ([`adapter`]) spawns that
//! process and speaks for the editor. [`linemap`] converts between editor
//! steps and generated lines for both.

pub mod adapter;
pub mod linemap;
pub mod protocol;
pub mod server;

pub use adapter::{AdapterOptions, AdapterState, DebugAdapter, EditorEvent};
pub use linemap::BreakpointMap;
pub use protocol::{Location, Message, Notification, Paused, Property, Request};
pub use server::DebugServer;
