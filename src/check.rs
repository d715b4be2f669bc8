//! Named response assertions.
//!
//! A failing check never aborts an iteration; it only moves the pass rate.
//! Use [`crate::Thresholds`] to turn a poor pass rate into a failed run.

use crate::client::Response;
use crate::duration::human_serde;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Predicate applied to every completed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    StatusEquals { status: u16 },
    /// Inclusive range.
    StatusIn { min: u16, max: u16 },
    BodyContains { text: String },
    MaxDuration {
        #[serde(with = "human_serde")]
        limit: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    #[serde(flatten)]
    pub kind: CheckKind,
}

impl Check {
    pub fn new(name: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn status(name: impl Into<String>, status: u16) -> Self {
        Self::new(name, CheckKind::StatusEquals { status })
    }

    pub fn status_in(name: impl Into<String>, min: u16, max: u16) -> Self {
        Self::new(name, CheckKind::StatusIn { min, max })
    }

    pub fn body_contains(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, CheckKind::BodyContains { text: text.into() })
    }

    pub fn max_duration(name: impl Into<String>, limit: Duration) -> Self {
        Self::new(name, CheckKind::MaxDuration { limit })
    }

    pub fn evaluate(&self, response: &Response) -> bool {
        match &self.kind {
            CheckKind::StatusEquals { status } => response.status == *status,
            CheckKind::StatusIn { min, max } => (*min..=*max).contains(&response.status),
            CheckKind::BodyContains { text } => contains(&response.body, text.as_bytes()),
            CheckKind::MaxDuration { limit } => response.duration <= *limit,
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// The `is status 200` check.
pub fn default_checks() -> Vec<Check> {
    vec![Check::status("is status 200", 200)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn response(status: u16, body: &'static str, millis: u64) -> Response {
        Response {
            status,
            body: Bytes::from_static(body.as_bytes()),
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn should_pass_status_check_only_on_exact_match() {
        let check = &default_checks()[0];
        assert_eq!(check.name, "is status 200");
        assert!(check.evaluate(&response(200, "", 1)));
        assert!(!check.evaluate(&response(201, "", 1)));
        assert!(!check.evaluate(&response(500, "", 1)));
    }

    #[test]
    fn should_evaluate_range_body_and_duration_checks() {
        assert!(Check::status_in("2xx", 200, 299).evaluate(&response(204, "", 1)));
        assert!(!Check::status_in("2xx", 200, 299).evaluate(&response(302, "", 1)));

        let body = Check::body_contains("has id", "\"id\"");
        assert!(body.evaluate(&response(200, r#"{"id":1}"#, 1)));
        assert!(!body.evaluate(&response(200, "{}", 1)));

        let fast = Check::max_duration("fast", Duration::from_millis(100));
        assert!(fast.evaluate(&response(200, "", 100)));
        assert!(!fast.evaluate(&response(200, "", 101)));
    }

    #[test]
    fn should_deserialize_tagged_checks() {
        let json = r#"[
            {"name": "is status 200", "type": "status_equals", "status": 200},
            {"name": "fast", "type": "max_duration", "limit": "250ms"}
        ]"#;
        let checks: Vec<Check> = serde_json::from_str(json).unwrap();
        assert_eq!(checks[0], Check::status("is status 200", 200));
        assert_eq!(checks[1], Check::max_duration("fast", Duration::from_millis(250)));
    }
}
