// src/net/schema.rs
// =============================================================================
// Typed shapes for every JSON endpoint the crawler reads.
//
// Endpoints:
// - /nodeinfo/2.1                    -> NodeInfo
// - /api/v3/federated_instances      -> FederatedInstances
// - /api/v1/federated_instances      -> FederatedInstances (same shape)
// - /api/v3/site                     -> SiteV3
// - /api/alpha/site                  -> SiteAlpha
//
// Validation is a separate step from transport: the client hands us a
// serde_json::Value and we either turn it into one of these structs or
// return a SchemaError that names the shape that did not match.
//
// Only the fields we actually use are declared. serde ignores the rest, so
// servers are free to send extra data.
// =============================================================================

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

// A JSON body that did not have the structure we expected
#[derive(Debug, Error)]
#[error("expected {shape}: {detail}")]
pub struct SchemaError {
    /// Name of the shape we tried to read
    pub shape: &'static str,
    /// serde's description of what was wrong (missing field, wrong type, ...)
    pub detail: String,
}

/// A response body the protocol client knows how to validate.
pub trait Shape: DeserializeOwned {
    /// Human readable name used in error messages and logs.
    const NAME: &'static str;
}

// Turns an untyped JSON value into a typed shape
//
// Returns SchemaError (never panics) when a required field is missing or has
// the wrong type.
pub fn validate<S: Shape>(body: Value) -> Result<S, SchemaError> {
    serde_json::from_value(body).map_err(|e| SchemaError {
        shape: S::NAME,
        detail: e.to_string(),
    })
}

// -----------------------------------------------------------------------------
// nodeinfo
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub software: NodeSoftware,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSoftware {
    pub name: String,
    pub version: String,
}

impl Shape for NodeInfo {
    const NAME: &'static str = "nodeinfo";
}

// -----------------------------------------------------------------------------
// federated_instances (v3 and v1 share this shape)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FederatedInstances {
    pub federated_instances: PeerListing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerListing {
    pub linked: Vec<PeerLink>,
}

/// One entry of a server's linked peers. Consumed by the discovery filter
/// and thrown away.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerLink {
    pub domain: String,
    #[serde(default)]
    pub software: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

impl Shape for FederatedInstances {
    const NAME: &'static str = "federated instances";
}

// -----------------------------------------------------------------------------
// /api/v3/site
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SiteV3 {
    pub site_view: SiteView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteView {
    pub site: SiteInfo,
    pub local_site: LocalSite,
    pub counts: SiteCounts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteInfo {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalSite {
    pub registration_mode: String,
    pub private_instance: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteCounts {
    pub users_active_month: u64,
}

impl Shape for SiteV3 {
    const NAME: &'static str = "v3 site";
}

// -----------------------------------------------------------------------------
// /api/alpha/site (piefed, no privacy flag and no user counts)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SiteAlpha {
    pub site: AlphaSite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlphaSite {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    pub registration_mode: String,
}

impl Shape for SiteAlpha {
    const NAME: &'static str = "alpha site";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nodeinfo_ignores_extra_fields() {
        let body = json!({
            "version": "2.1",
            "software": { "name": "lemmy", "version": "0.19.5", "repository": "x" },
            "openRegistrations": true
        });
        let node: NodeInfo = validate(body).unwrap();
        assert_eq!(node.software.name, "lemmy");
        assert_eq!(node.software.version, "0.19.5");
    }

    #[test]
    fn test_nodeinfo_missing_version_is_schema_error() {
        let err = validate::<NodeInfo>(json!({ "software": { "name": "lemmy" } })).unwrap_err();
        assert_eq!(err.shape, "nodeinfo");
        assert!(err.detail.contains("version"), "detail: {}", err.detail);
    }

    #[test]
    fn test_peer_links_with_optional_fields() {
        let body = json!({
            "federated_instances": {
                "linked": [
                    { "domain": "a.example", "software": "lemmy", "updated": "2024-05-01T00:00:00Z" },
                    { "domain": "b.example" }
                ],
                "allowed": [],
                "blocked": []
            }
        });
        let peers: FederatedInstances = validate(body).unwrap();
        let linked = peers.federated_instances.linked;
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[0].software.as_deref(), Some("lemmy"));
        assert!(linked[1].software.is_none());
        assert!(linked[1].published.is_none());
    }

    #[test]
    fn test_peer_link_without_domain_is_rejected() {
        let body = json!({ "federated_instances": { "linked": [ { "software": "lemmy" } ] } });
        assert!(validate::<FederatedInstances>(body).is_err());
    }

    #[test]
    fn test_site_v3_requires_counts() {
        let body = json!({
            "site_view": {
                "site": { "description": "hi" },
                "local_site": { "registration_mode": "Open", "private_instance": false }
            }
        });
        let err = validate::<SiteV3>(body).unwrap_err();
        assert_eq!(err.shape, "v3 site");
    }

    #[test]
    fn test_site_alpha() {
        let body = json!({ "site": { "icon": "https://p.example/i.png", "registration_mode": "Closed" } });
        let site: SiteAlpha = validate(body).unwrap();
        assert_eq!(site.site.registration_mode, "Closed");
        assert!(site.site.description.is_none());
    }
}
