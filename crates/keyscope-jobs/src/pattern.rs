//! `SCAN MATCH` pattern synthesis

const GLOB_CHARS: [char; 4] = ['*', '?', '[', ']'];

/// Build the glob handed to `SCAN ... MATCH` from a free-text query and a
/// key prefix. Empty strings count as absent.
///
/// - neither: `*`
/// - prefix only: `prefix*` (a prefix already ending in `*` is kept)
/// - query only: used as-is when it contains glob characters, otherwise
///   wrapped as `*query*`
/// - both: the prefix with trailing `*` removed, followed by the query's
///   wrapped form
pub fn build_scan_match_pattern(query: Option<&str>, prefix: Option<&str>) -> String {
    let query = query.filter(|q| !q.is_empty());
    let prefix = prefix.filter(|p| !p.is_empty());

    match (query, prefix) {
        (None, None) => "*".to_string(),
        (None, Some(prefix)) if prefix.ends_with('*') => prefix.to_string(),
        (None, Some(prefix)) => format!("{}*", prefix),
        (Some(query), None) => wrap_query(query),
        (Some(query), Some(prefix)) => {
            format!("{}{}", prefix.trim_end_matches('*'), wrap_query(query))
        }
    }
}

fn wrap_query(query: &str) -> String {
    if query.contains(&GLOB_CHARS[..]) {
        query.to_string()
    } else {
        format!("*{}*", query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, None, "*")]
    #[case(Some(""), Some(""), "*")]
    #[case(Some("users"), None, "*users*")]
    #[case(Some("users:*"), None, "users:*")]
    #[case(Some("user?"), None, "user?")]
    #[case(Some("[ab]cd"), None, "[ab]cd")]
    #[case(None, Some("service:payments"), "service:payments*")]
    #[case(None, Some("service:*"), "service:*")]
    #[case(Some("invoice"), Some("service:payments"), "service:payments*invoice*")]
    #[case(Some("invoice"), Some("service:payments**"), "service:payments*invoice*")]
    #[case(Some("inv*"), Some("svc:"), "svc:inv*")]
    #[case(Some(""), Some("svc:"), "svc:*")]
    fn test_build_scan_match_pattern(
        #[case] query: Option<&str>,
        #[case] prefix: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(build_scan_match_pattern(query, prefix), expected);
    }
}
