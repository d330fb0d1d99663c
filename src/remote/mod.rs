//! Hosted database access over PostgREST
//!
//! Both live collaborators (content store and audit sink) talk to the same
//! project, so they share one client.

pub mod client;

pub use client::{eq, in_list, PostgrestClient};
