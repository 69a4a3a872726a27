//! Session identity and intro answers

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::FormError;

const SESSION_PREFIX: &str = "session-";

/// Identity for one form run. Created once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Session {
    /// External member identity, absent for anonymous visitors
    pub user_id: Option<String>,
    /// Generated when the intro is submitted
    pub session_id: String,
    /// Backend workflow selector
    pub process_name: String,
}

impl Session {
    pub fn new(user_id: Option<String>, process_name: impl Into<String>) -> Self {
        Self {
            user_id,
            session_id: generate_session_id(),
            process_name: process_name.into(),
        }
    }
}

/// Answers captured before the first step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IntroResponse {
    pub sector: String,
    pub company: Option<String>,
}

impl IntroResponse {
    /// Validate and normalize the intro inputs.
    ///
    /// Both values are trimmed; a blank company becomes `None`.
    pub fn new(sector: &str, company: Option<&str>) -> Result<Self, FormError> {
        let sector = sector.trim();
        if sector.is_empty() {
            return Err(FormError::validation("Please enter a sector."));
        }

        let company = company
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(Self {
            sector: sector.to_string(),
            company,
        })
    }
}

/// Generate a session id from the strongest source the target offers.
pub fn generate_session_id() -> String {
    #[cfg(not(all(target_arch = "wasm32", target_os = "unknown")))]
    {
        format!("{SESSION_PREFIX}{}", uuid::Uuid::new_v4())
    }

    #[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
    {
        fallback_session_id()
    }
}

/// Timestamp plus pseudo-random suffix. Uniqueness is best-effort.
pub fn fallback_session_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let millis = Utc::now().timestamp_millis().unsigned_abs();
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(millis);
    hasher.write_u64(COUNTER.fetch_add(1, Ordering::Relaxed));
    let random = to_base36(hasher.finish());
    let suffix: String = random.chars().take(9).collect();

    format!("{SESSION_PREFIX}{}-{suffix}", to_base36(millis))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intro_requires_sector() {
        let err = IntroResponse::new("", Some("Acme")).unwrap_err();
        assert!(err.is_validation());

        let err = IntroResponse::new("   ", None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_intro_blank_company_is_none() {
        let intro = IntroResponse::new(" tech ", Some("  ")).unwrap();
        assert_eq!(intro.sector, "tech");
        assert_eq!(intro.company, None);

        let intro = IntroResponse::new("tech", Some(" Acme ")).unwrap();
        assert_eq!(intro.company.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_session_ids_are_prefixed_and_distinct() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert!(a.starts_with("session-"));
        assert!(a.len() > SESSION_PREFIX.len());
        assert_ne!(a, b);
    }

    #[test]
    fn test_fallback_session_id_shape() {
        let id = fallback_session_id();
        let rest = id.strip_prefix("session-").unwrap();
        let (timestamp, suffix) = rest.split_once('-').unwrap();
        assert!(!timestamp.is_empty());
        assert!(!suffix.is_empty() && suffix.len() <= 9);
        assert!(rest
            .chars()
            .all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(fallback_session_id(), fallback_session_id());
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_session_keeps_identity() {
        let session = Session::new(Some("mem_1".into()), "gtmstrategy");
        assert_eq!(session.user_id.as_deref(), Some("mem_1"));
        assert_eq!(session.process_name, "gtmstrategy");
        assert!(session.session_id.starts_with("session-"));
    }
}
