//! HTTP operator surface.

pub mod routes;
pub mod server;

pub use server::{AppState, serve};
