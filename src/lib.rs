//! Layout storage with optional sharing through a remote layout server.
//!
//! [`sync::LayoutManager`] is the entry point. It keeps every layout in a local
//! [`storage::LayoutStorage`] and, when a [`remote::RemoteLayoutStorage`] is
//! configured, mirrors shared layouts to it.

pub mod config;
pub mod remote;
pub mod storage;
pub mod sync;
