//! Signature-based attack detection: SQL injection, XSS, path traversal, SSRF.
//!
//! Pattern tables are compiled once via `once_cell::sync::Lazy`, mirroring
//! the `Lazy`-built rule tables in the teacher's rule engine.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

fn build(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|e| panic!("invalid detector pattern {:?}: {}", p, e))
        })
        .collect()
}

static SQL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    build(&[
        r"\bunion\s+select\b",
        r"\bor\s+\d+\s*=\s*\d+",
        r"\band\s+\d+\s*=\s*\d+",
        r"\bdrop\s+table\b",
        r"\bdelete\s+from\b",
        r"\binsert\s+into\b",
        r"\bupdate\s+.*\bset\b",
        r"\bexec\s+xp_",
        r"\bwaitfor\s+delay\b",
        r"\bbenchmark\s*\(",
        r"\bsleep\s*\(",
        r"\bpg_sleep\s*\(",
        r"\bselect\s+.*\bfrom\s+information_schema",
        r"\bselect\s+.*\bfrom\s+sys\.",
        r"\bselect\s+.*\bfrom\s+mysql\.",
        r"\bselect\s+.*\bfrom\s+pg_",
        r"'\s*or\s+1\s*=\s*1\s*--",
        r"'\s*or\s+1\s*=\s*1\s*#",
        r"'\s*or\s+'[^']*'\s*=\s*'[^']*",
        r"'\s*and\s+1\s*=\s*2\s*--",
        r"'\s*union\s+select",
        r"%27\s*or\s+1%3d1",
        r"%27\s*union\s+select",
        r"\|\|\s*'[^']*'\s*=\s*'[^']*'",
    ])
});

static XSS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    build(&[
        r"<script[^>]*>.*?</script[^>]*>",
        r"<script[^>]*>",
        r"javascript\s*:",
        r#"on\w+\s*=\s*["'][^"']*["']"#,
        r"on\w+\s*=\s*[^>\s]+",
        r"<iframe[^>]*>",
        r"<object[^>]*>",
        r"<embed[^>]*>",
        r"<applet[^>]*>",
        r"expression\s*\(",
        r"vbscript\s*:",
        r"<img[^>]*onerror[^>]*>",
        r"<svg[^>]*onload[^>]*>",
        r"alert\s*\(",
        r"confirm\s*\(",
        r"prompt\s*\(",
        r"document\.cookie",
        r"document\.write",
        r"eval\s*\(",
        r"<\s*\w+[^>]*on\w+[^>]*>",
    ])
});

static PATH_TRAVERSAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"\.\.[\\/]|%2e%2e|etc[\\/]passwd|windows[\\/]system32|boot\.ini|win\.ini")
        .case_insensitive(true)
        .build()
        .expect("valid path traversal pattern")
});

/// Candidate-URL extraction patterns for the SSRF check. Each one finds
/// substrings in the request that *might* be a forwarding target; every
/// match is handed to the private-target resolver.
static SSRF_URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    build(&[
        r#"https?://[^\s"'<>]+"#,
        r#"url\s*=\s*["']?([^"'\s<>]+)["']?"#,
        r#"target\s*=\s*["']?([^"'\s<>]+)["']?"#,
        r#"host\s*=\s*["']?([^"'\s<>]+)["']?"#,
        r#"server\s*=\s*["']?([^"'\s<>]+)["']?"#,
    ])
});

pub fn is_sql_injection(data: &str) -> bool {
    SQL_PATTERNS.iter().any(|p| p.is_match(data))
}

pub fn is_xss(data: &str) -> bool {
    XSS_PATTERNS.iter().any(|p| p.is_match(data))
}

pub fn is_path_traversal(path: &str) -> bool {
    PATH_TRAVERSAL_PATTERN.is_match(path)
}

/// Extracts SSRF candidate targets (the capture group if the pattern has
/// one, otherwise the whole match) out of `data`, in pattern order.
pub fn ssrf_candidates(data: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    for pattern in SSRF_URL_PATTERNS.iter() {
        for caps in pattern.captures_iter(data) {
            let candidate = caps
                .get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string());
            if let Some(c) = candidate {
                if !c.is_empty() {
                    candidates.push(c);
                }
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_union_select() {
        assert!(is_sql_injection("id=1 UNION SELECT username,password FROM users"));
    }

    #[test]
    fn detects_classic_tautology() {
        assert!(is_sql_injection("id=1' OR 1=1--"));
    }

    #[test]
    fn detects_sleep_based_blind_sqli() {
        assert!(is_sql_injection("id=1; SELECT SLEEP(5)"));
    }

    #[test]
    fn detects_url_encoded_tautology() {
        assert!(is_sql_injection("id=1%27 or 1%3d1"));
    }

    #[test]
    fn benign_query_is_not_flagged() {
        assert!(!is_sql_injection("search=rust+programming+book"));
    }

    #[test]
    fn detects_script_tag() {
        assert!(is_xss("<script>alert('xss')</script>"));
    }

    #[test]
    fn detects_event_handler_injection() {
        assert!(is_xss(r#"<img src=x onerror="alert(1)">"#));
    }

    #[test]
    fn detects_javascript_uri() {
        assert!(is_xss("href=javascript:alert(1)"));
    }

    #[test]
    fn benign_html_is_not_flagged() {
        assert!(!is_xss("<p>hello world</p>"));
    }

    #[test]
    fn detects_dotdot_slash() {
        assert!(is_path_traversal("/files/../../etc/passwd"));
    }

    #[test]
    fn detects_encoded_traversal() {
        assert!(is_path_traversal("/files/%2e%2e/%2e%2e/etc/passwd"));
    }

    #[test]
    fn detects_windows_system32() {
        assert!(is_path_traversal(r"C:\windows\system32\config"));
    }

    #[test]
    fn benign_path_is_not_flagged() {
        assert!(!is_path_traversal("/api/v1/users/42"));
    }

    #[test]
    fn extracts_bare_url_candidate() {
        let candidates = ssrf_candidates("fetch=http://169.254.169.254/latest/meta-data");
        assert!(candidates
            .iter()
            .any(|c| c.contains("169.254.169.254")));
    }

    #[test]
    fn extracts_url_param_candidate() {
        let candidates = ssrf_candidates("url=internal.local&foo=bar");
        assert!(candidates.iter().any(|c| c == "internal.local"));
    }

    #[test]
    fn no_candidates_in_plain_text() {
        assert!(ssrf_candidates("just a normal comment, nothing here").is_empty());
    }
}
