// src/crawl/address.rs
// =============================================================================
// Canonical form for server addresses.
//
// Peer lists give us bare domains ("lemmy.world"), seeds may be full URLs
// ("https://lemmy.world/"), and either can carry stray whitespace. Every
// address goes through `Address::normalize` before it touches the frontier,
// so two spellings of the same server compare equal.
//
// Rules:
// - trim whitespace
// - keep an explicit scheme, otherwise prefix https://
// - lowercase the scheme and the host (paths keep their case)
// - drop the port when it is the scheme's default (:443, :80)
// - strip trailing slashes
//
// Applying the rules twice gives the same result as applying them once.
// Malformed input is passed through best-effort, never rejected.
// =============================================================================

use std::fmt;
use url::Url;

const DEFAULT_SCHEME: &str = "https";

// The port a scheme implies, which the canonical form leaves out
fn default_port(scheme: &str) -> Option<&'static str> {
    match scheme {
        "https" => Some(":443"),
        "http" => Some(":80"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() => (scheme.to_ascii_lowercase(), rest),
            _ => (DEFAULT_SCHEME.to_string(), trimmed.trim_start_matches("://")),
        };

        // Authority is everything up to the first '/', the path keeps its case
        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        let mut authority = authority.to_ascii_lowercase();
        if let Some(port) = default_port(&scheme) {
            authority = authority.trim_end_matches(port).to_string();
        }

        let tail = format!("{}{}", authority, path);
        Address(format!("{}://{}", scheme, tail.trim_end_matches('/')))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Host (plus port, when one is given) used as the store key
    //
    // Falls back to the whole address when it does not parse as a URL, which
    // keeps distinct garbage inputs distinct.
    pub fn host(&self) -> String {
        match Url::parse(&self.0) {
            Ok(url) => match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => format!("{}:{}", host, port),
                (Some(host), None) => host.to_string(),
                (None, _) => self.0.clone(),
            },
            Err(_) => self.0.clone(),
        }
    }

    // Absolute URL of an API path on this server
    //
    // Example: Address("https://a.example").endpoint("/api/v3/site")
    //          -> "https://a.example/api/v3/site"
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.as_str(), path)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("lemmy.world", "https://lemmy.world")]
    #[case("  lemmy.world/  ", "https://lemmy.world")]
    #[case("https://lemmy.world///", "https://lemmy.world")]
    #[case("http://localhost:8536/", "http://localhost:8536")]
    #[case("HTTPS://Lemmy.World/Path/", "https://lemmy.world/Path")]
    #[case("piefed.social/sub/dir", "https://piefed.social/sub/dir")]
    #[case("", "https://")]
    #[case("a.example:443", "https://a.example")]
    #[case("HTTP://A.example:80/", "http://a.example")]
    #[case("https://a.example:443/path", "https://a.example/path")]
    #[case("https://a.example:80", "https://a.example:80")]
    #[case("http://a.example:443", "http://a.example:443")]
    #[case("a.example:4430", "https://a.example:4430")]
    fn test_normalize(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(Address::normalize(raw).as_str(), expected);
    }

    #[rstest]
    #[case("lemmy.world")]
    #[case("https://lemmy.world/")]
    #[case(" HTTP://Feddit.DE// ")]
    #[case("://odd.example")]
    #[case("not a domain at all/")]
    #[case("")]
    #[case("https://a.example:443:443")]
    fn test_normalize_is_idempotent(#[case] raw: &str) {
        let once = Address::normalize(raw);
        let twice = Address::normalize(once.as_str());
        assert_eq!(once, twice);
        assert!(once.as_str().contains("://"));
        assert!(!once.as_str().ends_with('/') || once.as_str().ends_with("://"));
    }

    #[rstest]
    #[case("lemmy.world", "lemmy.world")]
    #[case("http://127.0.0.1:8080", "127.0.0.1:8080")]
    #[case("https://a.example/some/path", "a.example")]
    fn test_host(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(Address::normalize(raw).host(), expected);
    }

    #[test]
    fn test_endpoint() {
        let addr = Address::normalize("a.example/");
        assert_eq!(addr.endpoint("/nodeinfo/2.1"), "https://a.example/nodeinfo/2.1");
    }
}
