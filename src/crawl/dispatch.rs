// src/crawl/dispatch.rs
// =============================================================================
// Per-server processing: what to fetch, in what order, for which software.
//
// Steps for one address:
// 1. GET /nodeinfo/2.1 to learn the software name and version
// 2. Pick a route:
//      unknown software   -> stop (not an error)
//      lemmy 1.x          -> stop (no endpoint set is implemented for it)
//      lemmy, any other   -> v3 endpoints
//      piefed             -> v3 endpoints, falling back to v1/alpha
// 3. Fetch the peer list and the site document of that endpoint set
//    concurrently
// 4. Push recently active, supported peers into the frontier
// 5. Write the server to the result store if it qualifies
//
// A RequestError ends this address only. It comes back as
// Outcome::Failed for logging and is never propagated further.
// =============================================================================

use super::address::Address;
use super::filters::{Activity, DiscoveryFilter, Qualification, Software};
use super::frontier::Frontier;
use super::store::{Instance, ResultStore};
use crate::net::{
    FederatedInstances, NodeInfo, PeerLink, ProtocolClient, RequestError, SiteAlpha, SiteV3,
    Transport,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

const NODEINFO_PATH: &str = "/nodeinfo/2.1";

// Where an address goes after nodeinfo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Software we do not crawl
    Unsupported(String),
    /// lemmy 1.x, visited but never explored
    LemmyLegacy,
    /// lemmy on the v3 API
    LemmyV3,
    /// piefed, either endpoint variant
    Piefed,
}

// Chooses a route from the nodeinfo software block
//
// Examples:
//   ("lemmy", "0.19.3") -> LemmyV3
//   ("lemmy", "1.4.0")  -> LemmyLegacy
//   ("lemmy", "2.0.0")  -> LemmyV3
//   ("piefed", "1.0")   -> Piefed
//   ("mastodon", "4.2") -> Unsupported
pub fn route(name: &str, version: &str) -> Route {
    match Software::from_name(name) {
        Some(Software::Lemmy) if major_version(version) == Some(1) => Route::LemmyLegacy,
        Some(Software::Lemmy) => Route::LemmyV3,
        Some(Software::Piefed) => Route::Piefed,
        None => Route::Unsupported(name.to_string()),
    }
}

fn major_version(version: &str) -> Option<u64> {
    version
        .trim()
        .trim_start_matches(['v', 'V'])
        .split('.')
        .next()?
        .parse()
        .ok()
}

// The two endpoint families servers expose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointSet {
    // /api/v3/federated_instances + /api/v3/site
    V3,
    // /api/v1/federated_instances + /api/alpha/site (piefed)
    Alpha,
}

impl EndpointSet {
    fn peers_path(self) -> &'static str {
        match self {
            EndpointSet::V3 => "/api/v3/federated_instances",
            EndpointSet::Alpha => "/api/v1/federated_instances",
        }
    }
}

// Site facts common to both site endpoints
#[derive(Debug, Clone)]
struct SiteMetadata {
    description: Option<String>,
    icon: Option<String>,
    registration_mode: String,
    // Only the v3 site endpoint reports MAU and the private flag
    activity: Option<Activity>,
}

impl From<SiteV3> for SiteMetadata {
    fn from(body: SiteV3) -> Self {
        let view = body.site_view;
        Self {
            description: view.site.description,
            icon: view.site.icon,
            registration_mode: view.local_site.registration_mode,
            activity: Some(Activity {
                users_active_month: view.counts.users_active_month,
                private: view.local_site.private_instance,
            }),
        }
    }
}

impl From<SiteAlpha> for SiteMetadata {
    fn from(body: SiteAlpha) -> Self {
        Self {
            description: body.site.description,
            icon: body.site.icon,
            registration_mode: body.site.registration_mode,
            activity: None,
        }
    }
}

// What happened to one address
#[derive(Debug)]
pub enum Outcome {
    Unsupported { software: String },
    LemmyLegacy,
    Crawled { discovered: usize, qualified: bool },
    Failed(RequestError),
}

pub struct Dispatcher<T> {
    client: ProtocolClient<T>,
    frontier: Arc<Frontier>,
    store: Arc<ResultStore>,
    discovery: DiscoveryFilter,
    qualification: Qualification,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(
        client: ProtocolClient<T>,
        frontier: Arc<Frontier>,
        store: Arc<ResultStore>,
        discovery: DiscoveryFilter,
        qualification: Qualification,
    ) -> Self {
        Self {
            client,
            frontier,
            store,
            discovery,
            qualification,
        }
    }

    pub async fn process(&self, address: &Address) -> Outcome {
        let node: NodeInfo = match self.client.get(&address.endpoint(NODEINFO_PATH)).await {
            Ok(node) => node,
            Err(e) => return Outcome::Failed(e),
        };

        let result = match route(&node.software.name, &node.software.version) {
            Route::Unsupported(software) => return Outcome::Unsupported { software },
            Route::LemmyLegacy => return Outcome::LemmyLegacy,
            Route::LemmyV3 => self.crawl(address, Software::Lemmy, EndpointSet::V3).await,
            Route::Piefed => match self.crawl(address, Software::Piefed, EndpointSet::V3).await {
                Err(e) if e.is_endpoint_mismatch() => {
                    debug!(%address, error = %e, "piefed v3 endpoints unavailable, trying alpha");
                    self.crawl(address, Software::Piefed, EndpointSet::Alpha)
                        .await
                }
                other => other,
            },
        };

        match result {
            Ok((discovered, qualified)) => Outcome::Crawled {
                discovered,
                qualified,
            },
            Err(e) => Outcome::Failed(e),
        }
    }

    // Runs discovery and qualification against one endpoint set
    //
    // Returns: (peers newly enqueued, whether the server was stored)
    async fn crawl(
        &self,
        address: &Address,
        software: Software,
        endpoints: EndpointSet,
    ) -> Result<(usize, bool), RequestError> {
        let peers_url = address.endpoint(endpoints.peers_path());
        let peers = self.client.get::<FederatedInstances>(&peers_url);
        let (peers, site) = futures::future::try_join(peers, self.fetch_site(address, endpoints)).await?;

        let discovered = self.discover(&peers.federated_instances.linked);
        let qualified = self.qualify(address, software, site);
        Ok((discovered, qualified))
    }

    async fn fetch_site(
        &self,
        address: &Address,
        endpoints: EndpointSet,
    ) -> Result<SiteMetadata, RequestError> {
        match endpoints {
            EndpointSet::V3 => self
                .client
                .get::<SiteV3>(&address.endpoint("/api/v3/site"))
                .await
                .map(SiteMetadata::from),
            EndpointSet::Alpha => self
                .client
                .get::<SiteAlpha>(&address.endpoint("/api/alpha/site"))
                .await
                .map(SiteMetadata::from),
        }
    }

    // Feeds admitted peers to the frontier; returns how many were new
    fn discover(&self, linked: &[PeerLink]) -> usize {
        let now = Utc::now();
        linked
            .iter()
            .filter(|link| self.discovery.admits(link, now))
            .filter(|link| self.frontier.try_enqueue(Address::normalize(&link.domain)))
            .count()
    }

    fn qualify(&self, address: &Address, software: Software, site: SiteMetadata) -> bool {
        if !self.qualification.admits(site.activity) {
            return false;
        }

        let instance = Instance::new(
            address,
            software,
            site.description,
            site.icon,
            site.registration_mode,
        );
        info!(host = %instance.host, %software, "instance qualified");
        if !self.store.upsert(instance) {
            debug!(%address, "replaced an existing record for this host");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testing::{Reply, StaticTransport};
    use rstest::rstest;
    use serde_json::json;
    use std::time::Duration;

    const A: &str = "https://a.example";

    struct Harness {
        transport: Arc<StaticTransport>,
        frontier: Arc<Frontier>,
        store: Arc<ResultStore>,
        dispatcher: Dispatcher<Arc<StaticTransport>>,
    }

    fn harness() -> Harness {
        let transport = Arc::new(StaticTransport::new());
        let frontier = Arc::new(Frontier::new());
        let store = Arc::new(ResultStore::new());
        let dispatcher = Dispatcher::new(
            ProtocolClient::new(Arc::clone(&transport), Duration::from_secs(5)),
            Arc::clone(&frontier),
            Arc::clone(&store),
            DiscoveryFilter::new(30),
            Qualification::new(20),
        );
        Harness {
            transport,
            frontier,
            store,
            dispatcher,
        }
    }

    fn queued(frontier: &Arc<Frontier>) -> Vec<String> {
        std::iter::from_fn(|| frontier.claim().map(|c| c.address().to_string())).collect()
    }

    fn today() -> String {
        Utc::now().to_rfc3339()
    }

    #[rstest]
    #[case("lemmy", "1.4.0", Route::LemmyLegacy)]
    #[case("lemmy", "2.0.0", Route::LemmyV3)]
    #[case("lemmy", "0.19.5", Route::LemmyV3)]
    #[case("Lemmy", "v1.0.0-beta", Route::LemmyLegacy)]
    #[case("lemmy", "unknown", Route::LemmyV3)]
    #[case("piefed", "1.2.0", Route::Piefed)]
    #[case("mastodon", "4.2.0", Route::Unsupported("mastodon".to_string()))]
    fn test_route(#[case] name: &str, #[case] version: &str, #[case] expected: Route) {
        assert_eq!(route(name, version), expected);
    }

    #[tokio::test]
    async fn test_lemmy_v3_discovers_and_qualifies() {
        let h = harness();
        h.transport
            .node(A, "lemmy", "0.19.3")
            .peers(
                A,
                "/api/v3/federated_instances",
                json!([
                    { "domain": "b.example", "software": "lemmy", "updated": today() },
                    { "domain": "c.example", "software": "mastodon", "updated": today() },
                    { "domain": "d.example", "software": "piefed", "published": "2001-01-01T00:00:00Z" },
                    { "domain": "e.example", "software": "piefed", "published": today() }
                ]),
            )
            .site_v3(A, 50, false);

        let outcome = h.dispatcher.process(&Address::normalize(A)).await;

        assert!(matches!(outcome, Outcome::Crawled { discovered: 2, qualified: true }), "{outcome:?}");
        assert_eq!(queued(&h.frontier), ["https://b.example", "https://e.example"]);

        let rows = h.store.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].host, "a.example");
        assert_eq!(rows[0].software, Software::Lemmy);
    }

    #[tokio::test]
    async fn test_lemmy_legacy_is_a_no_op() {
        let h = harness();
        h.transport.node(A, "lemmy", "1.4.0").site_v3(A, 500, false);

        let outcome = h.dispatcher.process(&Address::normalize(A)).await;

        assert!(matches!(outcome, Outcome::LemmyLegacy));
        assert_eq!(h.transport.hits(&format!("{A}/api/v3/site")), 0);
        assert!(h.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_software_is_dropped() {
        let h = harness();
        h.transport.node(A, "mbin", "1.0.0");

        let outcome = h.dispatcher.process(&Address::normalize(A)).await;

        assert!(matches!(outcome, Outcome::Unsupported { ref software } if software == "mbin"));
        assert!(h.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_private_or_small_instances_are_not_stored() {
        let h = harness();
        h.transport
            .node(A, "lemmy", "0.19.3")
            .peers(A, "/api/v3/federated_instances", json!([]))
            .site_v3(A, 10_000, true);

        let outcome = h.dispatcher.process(&Address::normalize(A)).await;

        assert!(matches!(outcome, Outcome::Crawled { qualified: false, .. }));
        assert!(h.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_piefed_uses_v3_when_available() {
        let h = harness();
        h.transport
            .node(A, "piefed", "1.0.1")
            .peers(A, "/api/v3/federated_instances", json!([]))
            .site_v3(A, 25, false);

        let outcome = h.dispatcher.process(&Address::normalize(A)).await;

        assert!(matches!(outcome, Outcome::Crawled { qualified: true, .. }), "{outcome:?}");
        assert_eq!(h.store.snapshot()[0].software, Software::Piefed);
        assert_eq!(h.transport.hits(&format!("{A}/api/alpha/site")), 0);
    }

    #[tokio::test]
    async fn test_piefed_falls_back_to_alpha() {
        let h = harness();
        h.transport
            .node(A, "piefed", "0.9.0")
            .peers(
                A,
                "/api/v1/federated_instances",
                json!([{ "domain": "b.example", "software": "lemmy", "updated": today() }]),
            )
            .json(
                &format!("{A}/api/alpha/site"),
                json!({ "site": { "description": "pf", "registration_mode": "Open" } }),
            );

        let outcome = h.dispatcher.process(&Address::normalize(A)).await;

        // Alpha discovers peers but has no MAU or privacy data to qualify on
        assert!(matches!(outcome, Outcome::Crawled { discovered: 1, qualified: false }), "{outcome:?}");
        assert!(h.store.snapshot().is_empty());
        assert_eq!(h.transport.hits(&format!("{A}/api/v3/federated_instances")), 1);
    }

    #[tokio::test]
    async fn test_piefed_does_not_fall_back_on_server_error() {
        let h = harness();
        h.transport
            .node(A, "piefed", "1.0.0")
            .route(&format!("{A}/api/v3/federated_instances"), Reply::Status(503))
            .site_v3(A, 25, false);

        let outcome = h.dispatcher.process(&Address::normalize(A)).await;

        assert!(matches!(outcome, Outcome::Failed(RequestError::Status { status: 503, .. })));
        assert_eq!(h.transport.hits(&format!("{A}/api/v1/federated_instances")), 0);
    }

    #[tokio::test]
    async fn test_request_error_drops_the_address() {
        let h = harness();
        h.transport
            .node(A, "lemmy", "0.19.3")
            .peers(
                A,
                "/api/v3/federated_instances",
                json!([{ "domain": "b.example", "software": "lemmy", "updated": today() }]),
            )
            .json(&format!("{A}/api/v3/site"), json!({ "site_view": {} }));

        let outcome = h.dispatcher.process(&Address::normalize(A)).await;

        assert!(matches!(outcome, Outcome::Failed(RequestError::Schema { .. })));
        // Discovery only runs once both documents validated
        assert!(queued(&h.frontier).is_empty());
        assert!(h.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_nodeinfo_failure() {
        let h = harness();
        let outcome = h.dispatcher.process(&Address::normalize(A)).await;
        assert!(matches!(outcome, Outcome::Failed(RequestError::Status { status: 404, .. })));
    }
}
