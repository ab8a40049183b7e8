mod backend;
mod client;
mod models;

pub use backend::RemoteLayoutStorage;
pub use client::{HttpLayoutClient, RemoteError};
pub use models::{NewRemoteLayout, RemoteLayout, RemoteLayoutUpdate, RemoteUpdateResult};
