// src/net/mod.rs
// =============================================================================
// Everything that talks to remote servers.
//
// Submodules:
// - client: Transport trait, reqwest transport, timed + validated GETs
// - schema: typed response shapes and the validation step
// =============================================================================

mod client;
mod schema;

#[cfg(test)]
pub mod testing;

pub use client::{HttpTransport, ProtocolClient, RequestError, Transport};
pub use schema::{FederatedInstances, NodeInfo, PeerLink, SiteAlpha, SiteV3};
