// src/crawl/filters.rs
// =============================================================================
// The two yes/no decisions of the crawl.
//
// - Discovery (recency + support): should a peer from someone's peer list
//   be crawled? Only recognised software that was active recently.
// - Qualification: should a crawled server be written to the directory?
//   Only public servers with enough monthly active users.
//
// Both filters are pure functions of their inputs. Wall-clock "now" is
// passed in so tests can pin it.
// =============================================================================

use crate::net::PeerLink;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// Server software this crawler understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Software {
    Lemmy,
    Piefed,
}

impl Software {
    // Case-insensitive lookup; anything else is unsupported
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lemmy" => Some(Software::Lemmy),
            "piefed" => Some(Software::Piefed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Software::Lemmy => "lemmy",
            Software::Piefed => "piefed",
        }
    }
}

impl fmt::Display for Software {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Parses the timestamps servers put in their peer lists
//
// Accepts RFC 3339 ("2024-05-01T10:00:00Z", "...+02:00") and the naive form
// older lemmy versions emit ("2024-05-01T10:00:00.123456"), read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Decides which peers are worth crawling.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryFilter {
    window: Duration,
}

impl DiscoveryFilter {
    pub fn new(recency_days: u32) -> Self {
        Self {
            window: Duration::days(i64::from(recency_days)),
        }
    }

    // Parameters:
    //   link: one entry of a peer list
    //   now:  the wall clock at evaluation time
    //
    // Returns: true when the peer runs supported software AND its
    // `updated` (or, failing that, `published`) time is inside the window
    pub fn admits(&self, link: &PeerLink, now: DateTime<Utc>) -> bool {
        let supported = link
            .software
            .as_deref()
            .and_then(Software::from_name)
            .is_some();
        if !supported {
            return false;
        }

        let last_seen = link
            .updated
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| link.published.as_deref().and_then(parse_timestamp));

        match last_seen {
            Some(ts) => ts >= now - self.window,
            None => false,
        }
    }
}

/// Site facts the qualification rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    pub users_active_month: u64,
    pub private: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Qualification {
    min_active_users: u64,
}

impl Qualification {
    pub fn new(min_active_users: u64) -> Self {
        Self { min_active_users }
    }

    // `None` means the endpoint did not report activity at all, which can
    // never qualify
    pub fn admits(&self, activity: Option<Activity>) -> bool {
        match activity {
            Some(a) => !a.private && a.users_active_month >= self.min_active_users,
            None => false,
        }
    }
}
