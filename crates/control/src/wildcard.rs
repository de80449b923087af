//! Glob-style name patterns.
//!
//! `*` matches any run of characters (including none) and `?` exactly one
//! character. Matching is anchored at both ends and case-sensitive; there is
//! no escape for a literal `*` or `?`.

fn is_wildcard(c: char) -> bool {
    c == '*' || c == '?'
}

/// Returns `true` if `s` contains `*` or `?`.
pub fn contains_wildcard(s: &str) -> bool {
    s.contains(is_wildcard)
}

/// Longest leading part of `s` free of wildcards.
pub fn non_wildcard_prefix(s: &str) -> &str {
    match s.find(is_wildcard) {
        Some(i) => &s[..i],
        None => s,
    }
}

/// Matches `s` against `pattern`.
///
/// Backtracks only to the most recent `*`, so the cost is linear in the
/// common case and `O(len(s) * len(pattern))` in the worst case.
pub fn is_match(s: &str, pattern: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = s.chars().collect();
    let mut pi = 0usize;
    let mut ti = 0usize;
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            pi += 1;
            resume = ti;
        } else if let Some(star_at) = star {
            pi = star_at + 1;
            resume += 1;
            ti = resume;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// A user-supplied name pattern split into its server-side and client-side
/// halves.
///
/// Listing APIs only filter by prefix, so a wildcard pattern sends its
/// literal prefix to the server and matches the rest locally. A plain
/// pattern is a prefix filter and needs no local matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFilter {
    server_prefix: Option<String>,
    pattern: Option<String>,
}

impl NameFilter {
    /// Builds the filter for `pattern`; `None` or an empty pattern lists
    /// everything.
    pub fn new(pattern: Option<&str>) -> Self {
        match pattern.filter(|p| !p.is_empty()) {
            None => Self {
                server_prefix: None,
                pattern: None,
            },
            Some(p) if contains_wildcard(p) => {
                let prefix = non_wildcard_prefix(p);
                Self {
                    server_prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
                    pattern: Some(p.to_string()),
                }
            }
            Some(p) => Self {
                server_prefix: Some(p.to_string()),
                pattern: None,
            },
        }
    }

    /// Prefix to pass to the listing call.
    pub fn server_prefix(&self) -> Option<&str> {
        self.server_prefix.as_deref()
    }

    /// Wildcard pattern applied client-side, if any.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Whether an item named `name` passes the client-side half.
    pub fn accepts(&self, name: &str) -> bool {
        match &self.pattern {
            Some(p) => is_match(name, p),
            None => true,
        }
    }
}
