//! Shared types at the boundary to the crawl collaborator

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The crawl handler that produced a capture.
///
/// Detail captures decompose into the subject and its child entities;
/// listing captures decompose into history records only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Detail,
    Listing,
}

impl HandlerKind {
    pub fn as_str(&self) -> &str {
        match self {
            HandlerKind::Detail => "detail",
            HandlerKind::Listing => "listing",
        }
    }
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One fetched document as handed over by the external crawler.
///
/// The crawler guarantees that its "unprocessed events" query returns each
/// event at most once per logical run and is resumable across runs; nothing
/// in this crate refetches or retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureEvent {
    /// Source URL the content was fetched from
    pub url: String,
    /// Capture time, seconds since the Unix epoch
    pub timestamp: i64,
    /// Raw captured content (HTML page or JSON API response)
    pub content: Vec<u8>,
    /// The handler that produced this capture
    pub kind: HandlerKind,
}

impl CaptureEvent {
    pub fn new(
        url: impl Into<String>,
        timestamp: i64,
        content: impl Into<Vec<u8>>,
        kind: HandlerKind,
    ) -> Self {
        Self {
            url: url.into(),
            timestamp,
            content: content.into(),
            kind,
        }
    }

    /// Capture time as a UTC datetime. Out-of-range timestamps fall back to
    /// the epoch rather than panicking; the crawler stamps these itself so
    /// this is a theoretical case.
    pub fn recorded_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_kind_display() {
        assert_eq!(HandlerKind::Detail.to_string(), "detail");
        assert_eq!(HandlerKind::Listing.to_string(), "listing");
    }

    #[test]
    fn test_recorded_at() {
        let event = CaptureEvent::new(
            "https://ingatlan.com/34567890",
            1_700_000_000,
            b"{}".to_vec(),
            HandlerKind::Detail,
        );
        assert_eq!(event.recorded_at().timestamp(), 1_700_000_000);
    }
}
