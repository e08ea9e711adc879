//! Pure policy evaluator
//!
//! A deterministic, side-effect-free decision function over the current
//! policy snapshot. First matching rule wins; the order is fixed:
//! disabled, localhost, lock, block set, required keyword, disallowed
//! keywords, allow set, default deny. Unparsable navigation URLs fail open
//! (they cannot be a web policy violation).

use crate::engine::store::PolicySnapshot;
use crate::engine::types::{DenyReason, Verdict, EDUCATIONAL_KEYWORDS};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Evaluate a navigation against the policy.
///
/// `url` is the absolute navigated URL; `title` may be empty.
pub fn evaluate(policy: &PolicySnapshot, url: &str, title: &str) -> Verdict {
    if !policy.enabled {
        return Verdict::Allow;
    }

    // Fail open: what cannot be classified is never blocked
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return Verdict::Allow,
    };
    let host = match parsed.host_str() {
        Some(host) => normalize_host(host),
        None => return Verdict::Allow,
    };

    if host == "localhost" || host == "127.0.0.1" {
        return Verdict::Allow;
    }

    if let Some(ref lock) = policy.lock {
        match lock_verdict(lock, &parsed, &host) {
            Some(verdict) => return verdict,
            // Unparsable lock target: treat as unlocked for this decision
            None => {}
        }
    }

    if policy.block_set.iter().any(|d| domain_matches(&host, d)) {
        return Verdict::Deny(DenyReason::Blocked);
    }

    let haystack = format!("{} {}", title, url).to_lowercase();

    if let Some(ref keyword) = policy.required_keyword {
        if !keyword.is_empty() && !haystack.contains(&keyword.to_lowercase()) {
            return Verdict::Deny(DenyReason::MissingRequiredKeyword);
        }
    }

    if is_youtube_family(&host) && !policy.disallowed_keywords.is_empty() {
        let mut searchable = haystack.clone();
        for (key, value) in parsed.query_pairs() {
            if key == "search_query" || key == "q" {
                searchable.push(' ');
                searchable.push_str(&value.to_lowercase());
            }
        }
        for keyword in &policy.disallowed_keywords {
            if !keyword.is_empty() && searchable.contains(&keyword.to_lowercase()) {
                return Verdict::Deny(DenyReason::DisallowedKeyword);
            }
        }
    }

    if let Some(entry) = policy
        .allow_set
        .iter()
        .find(|d| domain_matches(&host, d))
    {
        // Membership alone is not enough for youtube.com; the content has
        // to look educational
        if normalize_host(entry) == "youtube.com" && !is_educational(&haystack) {
            return Verdict::Deny(DenyReason::NotEducational);
        }
        return Verdict::Allow;
    }

    Verdict::Deny(DenyReason::NotAllowed)
}

/// Lowercase a host and strip a leading `www.`
pub fn normalize_host(host: &str) -> String {
    let host = host.to_lowercase();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

/// Whether `host` equals `domain` or is a subdomain of it
pub fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = normalize_host(domain);
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Whether the host belongs to the YouTube domain family
pub fn is_youtube_family(host: &str) -> bool {
    host == "youtu.be" || domain_matches(host, "youtube.com")
}

/// Extract a normalized video identity from a URL, when one exists.
///
/// `youtu.be/<id>`, `*.youtube.com/watch?v=<id>` and
/// `*.youtube.com/embed/<id>` all yield the same identity for the same
/// video. Absence of an identity is treated as unequal to everything.
pub fn video_identity(url: &Url) -> Option<String> {
    let host = normalize_host(url.host_str()?);

    if host == "youtu.be" {
        let id = url.path().trim_start_matches('/');
        if id.is_empty() {
            return None;
        }
        return Some(id.to_string());
    }

    if domain_matches(&host, "youtube.com") {
        if url.path() == "/watch" {
            return url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned())
                .filter(|v| !v.is_empty());
        }
        if let Some(captures) = embed_pattern().captures(url.path()) {
            return Some(captures[1].to_string());
        }
    }

    None
}

fn embed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^/embed/([A-Za-z0-9_-]{6,})").expect("embed pattern is valid")
    })
}

/// Decide a lock rule.
///
/// Returns `None` when the lock target itself does not parse, in which case
/// evaluation falls through to the normal rules.
fn lock_verdict(
    lock: &crate::engine::store::LockState,
    current: &Url,
    current_host: &str,
) -> Option<Verdict> {
    let locked_url = match lock.locked_url {
        Some(ref raw) => match Url::parse(raw) {
            Ok(parsed) => Some(parsed),
            Err(_) => return None,
        },
        None => None,
    };

    match locked_url {
        Some(locked) => {
            // Equivalent representations of the same video are one resource
            if let (Some(locked_id), Some(current_id)) =
                (video_identity(&locked), video_identity(current))
            {
                if locked_id == current_id {
                    return Some(Verdict::Allow);
                }
            }

            let locked_host = locked.host_str().map(normalize_host);
            if locked_host.as_deref() == Some(current_host)
                && current.as_str().starts_with(locked.as_str())
            {
                return Some(Verdict::Allow);
            }

            Some(Verdict::Deny(DenyReason::LockViolation))
        }
        None => {
            if domain_matches(current_host, &lock.locked_domain) {
                Some(Verdict::Allow)
            } else {
                Some(Verdict::Deny(DenyReason::LockViolation))
            }
        }
    }
}

fn is_educational(haystack: &str) -> bool {
    EDUCATIONAL_KEYWORDS.iter().any(|k| haystack.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::LockState;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn set_of(domains: &[&str]) -> BTreeSet<String> {
        domains.iter().map(|d| d.to_string()).collect()
    }

    fn policy_with_allow(domains: &[&str]) -> PolicySnapshot {
        PolicySnapshot {
            allow_set: set_of(domains),
            ..Default::default()
        }
    }

    fn url_lock(url: &str) -> LockState {
        let domain = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(normalize_host))
            .unwrap_or_default();
        LockState {
            locked_url: Some(url.to_string()),
            locked_domain: domain,
            previous_allow: BTreeSet::new(),
            locked_at: Utc::now(),
        }
    }

    #[test]
    fn test_disabled_allows_everything() {
        let policy = PolicySnapshot {
            enabled: false,
            block_set: set_of(&["instagram.com"]),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&policy, "https://instagram.com/reels", ""),
            Verdict::Allow
        );
        assert_eq!(evaluate(&policy, "not a url", ""), Verdict::Allow);
    }

    #[test]
    fn test_localhost_always_allowed() {
        let policy = PolicySnapshot {
            block_set: set_of(&["localhost"]),
            lock: Some(url_lock("https://khanacademy.org/math")),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&policy, "http://localhost:3000/dashboard", ""),
            Verdict::Allow
        );
        assert_eq!(
            evaluate(&policy, "http://127.0.0.1:5000/api", ""),
            Verdict::Allow
        );
        assert_eq!(
            evaluate(&policy, "http://www.localhost/", ""),
            Verdict::Allow
        );
    }

    #[test]
    fn test_unparsable_url_fails_open() {
        let policy = policy_with_allow(&[]);
        assert_eq!(evaluate(&policy, "::: not a url :::", ""), Verdict::Allow);
        // No host either
        assert_eq!(evaluate(&policy, "mailto:a@b.c", ""), Verdict::Allow);
    }

    #[test]
    fn test_block_wins_over_allow() {
        let policy = PolicySnapshot {
            allow_set: set_of(&["instagram.com"]),
            block_set: set_of(&["instagram.com"]),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&policy, "https://www.instagram.com/", ""),
            Verdict::Deny(DenyReason::Blocked)
        );
    }

    #[test]
    fn test_parent_domain_blocking() {
        let policy = PolicySnapshot {
            block_set: set_of(&["reddit.com"]),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&policy, "https://old.reddit.com/r/all", ""),
            Verdict::Deny(DenyReason::Blocked)
        );
    }

    #[test]
    fn test_allow_subdomain_match() {
        let policy = policy_with_allow(&["wikipedia.org"]);
        assert_eq!(
            evaluate(&policy, "https://en.wikipedia.org/wiki/Calculus", ""),
            Verdict::Allow
        );
        assert_eq!(
            evaluate(&policy, "https://notwikipedia.org/", ""),
            Verdict::Deny(DenyReason::NotAllowed)
        );
    }

    #[test]
    fn test_default_deny() {
        let policy = policy_with_allow(&["wikipedia.org"]);
        assert_eq!(
            evaluate(&policy, "https://news.ycombinator.com/", ""),
            Verdict::Deny(DenyReason::NotAllowed)
        );
    }

    #[test]
    fn test_required_keyword() {
        let policy = PolicySnapshot {
            allow_set: set_of(&["wikipedia.org"]),
            required_keyword: Some("calculus".to_string()),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&policy, "https://en.wikipedia.org/wiki/Calculus", ""),
            Verdict::Allow,
            "keyword may appear in the URL"
        );
        assert_eq!(
            evaluate(
                &policy,
                "https://en.wikipedia.org/wiki/Cooking",
                "Calculus of variations"
            ),
            Verdict::Allow,
            "keyword may appear in the title, case-insensitive"
        );
        assert_eq!(
            evaluate(&policy, "https://en.wikipedia.org/wiki/Cooking", "Cooking"),
            Verdict::Deny(DenyReason::MissingRequiredKeyword)
        );
    }

    #[test]
    fn test_youtube_educational_heuristic() {
        let policy = policy_with_allow(&["youtube.com"]);
        assert_eq!(
            evaluate(
                &policy,
                "https://www.youtube.com/watch?v=abcdef123",
                "Intro to Algorithms Lecture 3"
            ),
            Verdict::Allow
        );
        assert_eq!(
            evaluate(
                &policy,
                "https://www.youtube.com/watch?v=abcdef123",
                "Funny Cat Compilation"
            ),
            Verdict::Deny(DenyReason::NotEducational)
        );
    }

    #[test]
    fn test_non_youtube_allow_needs_no_heuristic() {
        let policy = policy_with_allow(&["github.com"]);
        assert_eq!(
            evaluate(&policy, "https://github.com/rust-lang/rust", ""),
            Verdict::Allow
        );
    }

    #[test]
    fn test_disallowed_keyword_beats_educational_heuristic() {
        let policy = PolicySnapshot {
            allow_set: set_of(&["youtube.com"]),
            disallowed_keywords: vec!["cat".to_string()],
            ..Default::default()
        };
        // Fires on the search_query parameter before the allow-set check
        assert_eq!(
            evaluate(
                &policy,
                "https://youtube.com/results?search_query=funny+cat+videos",
                "Search results"
            ),
            Verdict::Deny(DenyReason::DisallowedKeyword)
        );
        // And on the title
        assert_eq!(
            evaluate(
                &policy,
                "https://www.youtube.com/watch?v=abcdef123",
                "Cat physics lecture"
            ),
            Verdict::Deny(DenyReason::DisallowedKeyword)
        );
    }

    #[test]
    fn test_disallowed_keywords_only_apply_to_youtube_family() {
        let policy = PolicySnapshot {
            allow_set: set_of(&["catacademy.org"]),
            disallowed_keywords: vec!["cat".to_string()],
            ..Default::default()
        };
        assert_eq!(
            evaluate(&policy, "https://catacademy.org/courses", "Cat Academy"),
            Verdict::Allow
        );
    }

    #[test]
    fn test_lock_allows_same_video_in_all_forms() {
        let policy = PolicySnapshot {
            lock: Some(url_lock("https://www.youtube.com/watch?v=ABC123")),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&policy, "https://youtu.be/ABC123", ""),
            Verdict::Allow
        );
        assert_eq!(
            evaluate(&policy, "https://www.youtube.com/embed/ABC123", ""),
            Verdict::Allow
        );
        assert_eq!(
            evaluate(&policy, "https://www.youtube.com/watch?v=XYZ999", ""),
            Verdict::Deny(DenyReason::LockViolation)
        );
    }

    #[test]
    fn test_lock_prefix_match_on_same_host() {
        let policy = PolicySnapshot {
            lock: Some(url_lock("https://docs.rs/tokio/latest/tokio/")),
            ..Default::default()
        };
        assert_eq!(
            evaluate(
                &policy,
                "https://docs.rs/tokio/latest/tokio/sync/index.html",
                ""
            ),
            Verdict::Allow
        );
        assert_eq!(
            evaluate(&policy, "https://docs.rs/serde/latest/serde/", ""),
            Verdict::Deny(DenyReason::LockViolation)
        );
        assert_eq!(
            evaluate(&policy, "https://crates.io/crates/tokio", ""),
            Verdict::Deny(DenyReason::LockViolation)
        );
    }

    #[test]
    fn test_domain_lock() {
        let policy = PolicySnapshot {
            lock: Some(LockState {
                locked_url: None,
                locked_domain: "khanacademy.org".to_string(),
                previous_allow: BTreeSet::new(),
                locked_at: Utc::now(),
            }),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&policy, "https://www.khanacademy.org/math/algebra", ""),
            Verdict::Allow
        );
        assert_eq!(
            evaluate(&policy, "https://www.youtube.com/", ""),
            Verdict::Deny(DenyReason::LockViolation)
        );
    }

    #[test]
    fn test_lock_overrides_allow_and_block() {
        let policy = PolicySnapshot {
            allow_set: set_of(&["github.com"]),
            block_set: set_of(&["khanacademy.org"]),
            lock: Some(LockState {
                locked_url: None,
                locked_domain: "khanacademy.org".to_string(),
                previous_allow: BTreeSet::new(),
                locked_at: Utc::now(),
            }),
            ..Default::default()
        };
        // Only the lock rule applies while locked
        assert_eq!(
            evaluate(&policy, "https://khanacademy.org/", ""),
            Verdict::Allow
        );
        assert_eq!(
            evaluate(&policy, "https://github.com/", ""),
            Verdict::Deny(DenyReason::LockViolation)
        );
    }

    #[test]
    fn test_unparsable_lock_target_falls_through() {
        let policy = PolicySnapshot {
            allow_set: set_of(&["github.com"]),
            lock: Some(LockState {
                locked_url: Some("not a url".to_string()),
                locked_domain: String::new(),
                previous_allow: BTreeSet::new(),
                locked_at: Utc::now(),
            }),
            ..Default::default()
        };
        assert_eq!(evaluate(&policy, "https://github.com/", ""), Verdict::Allow);
        assert_eq!(
            evaluate(&policy, "https://example.com/", ""),
            Verdict::Deny(DenyReason::NotAllowed)
        );
    }

    #[test]
    fn test_video_identity_extraction() {
        let id = |s: &str| video_identity(&Url::parse(s).unwrap());

        assert_eq!(
            id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        // Embed segment below the minimum length is not an identity
        assert_eq!(id("https://www.youtube.com/embed/abc"), None);
        assert_eq!(id("https://www.youtube.com/feed/subscriptions"), None);
        assert_eq!(id("https://www.youtube.com/watch"), None);
        assert_eq!(id("https://example.com/watch?v=abcdef"), None);
    }

    #[test]
    fn test_host_normalization() {
        assert_eq!(normalize_host("WWW.YouTube.COM"), "youtube.com");
        assert_eq!(normalize_host("en.wikipedia.org"), "en.wikipedia.org");
        assert!(domain_matches("music.youtube.com", "youtube.com"));
        assert!(!domain_matches("youtube.com.evil.com", "youtube.com"));
    }
}
