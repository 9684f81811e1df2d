/// Grouping-key extraction for tab URLs
use regex::Regex;
use std::sync::OnceLock;
use url::{Host, Url};

use crate::storage::Settings;

/// Pages the host renders itself; they never join a domain group
const NEW_TAB_PAGES: [&str; 2] = ["chrome://newtab/", "chrome://new-tab-page/"];

/// Derive the grouping key for a URL
///
/// Algorithm:
/// 1. Browser-internal pages (`chrome:`, `chrome-extension:`, new tab,
///    `about:blank`) and empty or unparseable URLs have no key
/// 2. Parse the hostname; a URL without one has no key
/// 3. A hostname matching an excluded pattern has no key
/// 4. With subdomain grouping the key is the full hostname, otherwise
///    the root domain (see [`root_domain`])
///
/// Examples (subdomain grouping off):
/// - https://www.google.com/search → google.com
/// - https://a.b.example.com → example.com
/// - http://192.168.0.1:8080 → 192.168.0.1
pub fn grouping_key(url: &str, settings: &Settings) -> Option<String> {
    let hostname = extract_hostname(url)?;

    if is_excluded(&hostname, &settings.excluded_domains) {
        return None;
    }

    if settings.use_subdomain_grouping {
        Some(hostname)
    } else {
        Some(root_domain(&hostname))
    }
}

/// Extract the hostname of a groupable URL
pub fn extract_hostname(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() || url == "about:blank" || NEW_TAB_PAGES.iter().any(|page| url.starts_with(page)) {
        return None;
    }

    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::debug!("Invalid URL {:?}: {}", url, e);
            return None;
        }
    };

    if matches!(parsed.scheme(), "chrome" | "chrome-extension") {
        return None;
    }

    match parsed.host() {
        // Fully qualified names end in a dot; `a.com.` is `a.com`
        Some(Host::Domain(domain)) if !domain.trim_end_matches('.').is_empty() => {
            Some(domain.strip_suffix('.').unwrap_or(domain).to_lowercase())
        }
        Some(Host::Ipv4(addr)) => Some(addr.to_string()),
        Some(Host::Ipv6(addr)) => Some(format!("[{}]", addr)),
        _ => {
            log::debug!("URL without hostname: {}", url);
            None
        }
    }
}

/// Reduce a hostname to its root domain
///
/// IP literals and `localhost` names are kept as they are. Otherwise the
/// last two labels are kept, which is a heuristic rather than a public
/// suffix lookup: `mail.example.co.uk` becomes `co.uk`.
pub fn root_domain(hostname: &str) -> String {
    if hostname == "localhost" || hostname.ends_with(".localhost") || is_ip_address(hostname) {
        return hostname.to_string();
    }

    let parts: Vec<&str> = hostname.split('.').collect();
    if parts.len() <= 2 {
        return hostname.to_string();
    }

    parts[parts.len() - 2..].join(".")
}

/// Check if a string looks like an IP address
fn is_ip_address(s: &str) -> bool {
    s.starts_with('[')
        || (s.chars().next().is_some_and(|c| c.is_ascii_digit())
            && s.chars().all(|c| c.is_ascii_digit() || c == '.'))
}

/// Match a hostname against one exclusion pattern
///
/// A pattern is either an exact hostname or `*.suffix`, which matches any
/// hostname ending with `.suffix`.
pub fn matches_pattern(hostname: &str, pattern: &str) -> bool {
    if hostname == pattern {
        return true;
    }
    match pattern.strip_prefix('*') {
        Some(suffix) if pattern.starts_with("*.") => hostname.ends_with(suffix),
        _ => false,
    }
}

pub fn is_excluded(hostname: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| matches_pattern(hostname, pattern))
}

/// Validate a domain or `*.domain` pattern entered by the user
pub fn is_valid_domain_pattern(pattern: &str) -> bool {
    static DOMAIN_RE: OnceLock<Regex> = OnceLock::new();
    let re = DOMAIN_RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
            .expect("domain pattern regex is valid")
    });

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);
    re.is_match(domain)
}

/// Normalize user input before validation: trimmed and lowercased
pub fn normalize_pattern(pattern: &str) -> String {
    pattern.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str) -> Option<String> {
        grouping_key(url, &Settings::default())
    }

    fn settings_excluding(patterns: &[&str]) -> Settings {
        Settings {
            excluded_domains: patterns.iter().map(|p| p.to_string()).collect(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_grouping_key_basic() {
        assert_eq!(key("https://www.google.com"), Some("google.com".to_string()));
        assert_eq!(key("https://google.com"), Some("google.com".to_string()));
        assert_eq!(key("http://google.com/search?q=rust"), Some("google.com".to_string()));
        assert_eq!(key("https://GitHub.com/rust-lang/rust"), Some("github.com".to_string()));
    }

    #[test]
    fn test_grouping_key_subdomains() {
        assert_eq!(key("https://a.b.example.com"), Some("example.com".to_string()));
        assert_eq!(key("https://docs.microsoft.com"), Some("microsoft.com".to_string()));

        let settings = Settings {
            use_subdomain_grouping: true,
            ..Settings::default()
        };
        assert_eq!(
            grouping_key("https://docs.microsoft.com/x", &settings),
            Some("docs.microsoft.com".to_string())
        );
    }

    #[test]
    fn test_grouping_key_two_label_suffix_limitation() {
        // Multi-part public suffixes are not recognized
        assert_eq!(key("https://mail.example.co.uk"), Some("co.uk".to_string()));
        assert_eq!(key("https://shop.example.com.au"), Some("com.au".to_string()));
    }

    #[test]
    fn test_grouping_key_special_hosts() {
        assert_eq!(key("http://192.168.0.1"), Some("192.168.0.1".to_string()));
        assert_eq!(key("http://127.0.0.1:8080/x"), Some("127.0.0.1".to_string()));
        assert_eq!(key("http://localhost:3000"), Some("localhost".to_string()));
        assert_eq!(key("http://sub.localhost"), Some("sub.localhost".to_string()));
        assert_eq!(key("http://a.b.localhost"), Some("a.b.localhost".to_string()));
        assert_eq!(key("http://[::1]:8000/"), Some("[::1]".to_string()));
    }

    #[test]
    fn test_grouping_key_internal_pages() {
        assert_eq!(key("chrome://newtab/"), None);
        assert_eq!(key("chrome://new-tab-page/"), None);
        assert_eq!(key("chrome://settings"), None);
        assert_eq!(key("chrome-extension://abcdef/popup.html"), None);
        assert_eq!(key("about:blank"), None);
    }

    #[test]
    fn test_grouping_key_edge_cases() {
        assert_eq!(key(""), None);
        assert_eq!(key("   "), None);
        assert_eq!(key("not-a-url"), None);
        assert_eq!(key("https://"), None);
        assert_eq!(key("file:///home/user/notes.txt"), None);
    }

    #[test]
    fn test_grouping_key_fully_qualified_host() {
        assert_eq!(key("https://a.com./"), Some("a.com".to_string()));
        assert_eq!(key("https://www.a.com./x"), Some("a.com".to_string()));
        assert_eq!(key("https://Mail.Example.co.uk./page"), Some("co.uk".to_string()));
    }

    #[test]
    fn test_exclusion_exact() {
        let settings = settings_excluding(&["mail.google.com"]);
        assert_eq!(grouping_key("https://mail.google.com/inbox", &settings), None);
        assert_eq!(
            grouping_key("https://www.google.com", &settings),
            Some("google.com".to_string())
        );
    }

    #[test]
    fn test_exclusion_wildcard() {
        let settings = settings_excluding(&["*.example.com"]);
        assert_eq!(grouping_key("https://a.example.com", &settings), None);
        assert_eq!(grouping_key("https://x.y.example.com", &settings), None);
        // The bare domain does not end with ".example.com"
        assert_eq!(
            grouping_key("https://example.com", &settings),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("a.com", "a.com"));
        assert!(matches_pattern("www.a.com", "*.a.com"));
        assert!(!matches_pattern("wwwa.com", "*.a.com"));
        assert!(!matches_pattern("a.com", "b.com"));
        assert!(!matches_pattern("xa.com", "*a.com"));
    }

    #[test]
    fn test_is_valid_domain_pattern() {
        assert!(is_valid_domain_pattern("example.com"));
        assert!(is_valid_domain_pattern("*.example.com"));
        assert!(is_valid_domain_pattern("my-site.co.uk"));
        assert!(is_valid_domain_pattern("localhost"));
        assert!(!is_valid_domain_pattern(""));
        assert!(!is_valid_domain_pattern("-bad.com"));
        assert!(!is_valid_domain_pattern("bad..com"));
        assert!(!is_valid_domain_pattern("https://example.com"));
        assert!(!is_valid_domain_pattern("*example.com"));
    }
}
