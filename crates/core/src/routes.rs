//! Glob-style route pattern matching for trigger routes.

/// Match `value` against `pattern`, where `*` matches any run of characters
/// (including `/` and the empty run). Every other character is literal.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == value {
        return true;
    }

    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();

    let (mut pi, mut vi) = (0usize, 0usize);
    // Position of the last `*` seen and the value index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while vi < v.len() {
        if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, vi));
            pi += 1;
        } else if pi < p.len() && p[pi] == v[vi] {
            pi += 1;
            vi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            vi = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

/// True when any pattern in `patterns` matches `route`.
pub fn matches_any<S: AsRef<str>>(patterns: &[S], route: &str) -> bool {
    patterns.iter().any(|p| glob_match(p.as_ref(), route))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(glob_match("admin", "admin"));
        assert!(!glob_match("admin", "admins"));
        assert!(!glob_match("admin", "settings"));
    }

    #[test]
    fn test_trailing_wildcard() {
        assert!(glob_match("profile/*", "profile/edit"));
        assert!(glob_match("profile/*", "profile/edit/avatar"));
        assert!(glob_match("profile/*", "profile/"));
        assert!(!glob_match("profile/*", "profile"));
        assert!(!glob_match("profile/*", "settings/profile/edit"));
    }

    #[test]
    fn test_inner_and_multiple_wildcards() {
        assert!(glob_match("shop/*/checkout", "shop/cart-7/checkout"));
        assert!(!glob_match("shop/*/checkout", "shop/cart-7/review"));
        assert!(glob_match("*.show", "products.show"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn test_pattern_list() {
        let patterns = vec!["profile/*".to_string(), "admin".to_string()];
        assert!(matches_any(&patterns, "profile/edit"));
        assert!(matches_any(&patterns, "admin"));
        assert!(!matches_any(&patterns, "settings"));
        assert!(!matches_any::<String>(&[], "admin"));
    }
}
