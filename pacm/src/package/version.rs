//! Version string comparison.
//!
//! Package and asset versions are dotted strings such as `1.2.3`. Components
//! are compared numerically when both sides parse as unsigned integers and
//! lexicographically otherwise, so `1.10.0` orders above `1.9.0` while
//! pre-release tails like `3-beta` still get a stable ordering. Missing
//! components count as zero, making `1.2` and `1.2.0` equal.

use std::cmp::Ordering;

/// Compare two dotted version strings.
///
/// Returns the ordering of `a` relative to `b`. The comparison is total:
/// every pair of strings yields exactly one of `Less`, `Equal`, `Greater`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.split('.').collect();
    let right: Vec<&str> = b.split('.').collect();
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or("0");
        let r = right.get(i).copied().unwrap_or("0");
        let ord = compare_components(l, r);
        if ord != Ordering::Equal {
            return ord;
        }
    }

    Ordering::Equal
}

/// Returns true if `a` is strictly greater than `b`.
///
/// This is the relation used for "is this asset newer than the installed
/// version": strict, so equal versions are never considered an upgrade.
pub fn version_gt(a: &str, b: &str) -> bool {
    compare_versions(a, b) == Ordering::Greater
}

fn compare_components(l: &str, r: &str) -> Ordering {
    match (l.parse::<u64>(), r.parse::<u64>()) {
        (Ok(ln), Ok(rn)) => ln.cmp(&rn),
        _ => l.cmp(r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_components_compare_numerically() {
        assert!(version_gt("1.10.0", "1.9.0"));
        assert!(version_gt("2.0.0", "1.99.99"));
        assert!(!version_gt("1.9.0", "1.10.0"));
    }

    #[test]
    fn test_equal_versions_are_not_greater() {
        assert!(!version_gt("1.2.3", "1.2.3"));
        assert_eq!(compare_versions("1.2.3", "1.2.3"), Ordering::Equal);
    }

    #[test]
    fn test_missing_components_count_as_zero() {
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert!(version_gt("1.2.1", "1.2"));
        assert!(!version_gt("1.2", "1.2.1"));
    }

    #[test]
    fn test_non_numeric_tail_compares_lexicographically() {
        assert!(version_gt("1.2.3-rc2", "1.2.3-rc1"));
        assert!(version_gt("1.2.b", "1.2.a"));
    }

    #[test]
    fn test_antisymmetric() {
        let pairs = [
            ("1.0.0", "1.0.1"),
            ("0.9", "1.0"),
            ("1.2.3-beta", "1.2.3-alpha"),
            ("3", "3.0.0"),
        ];
        for (a, b) in pairs {
            assert!(
                !(version_gt(a, b) && version_gt(b, a)),
                "both {} > {} and {} > {}",
                a,
                b,
                b,
                a
            );
        }
    }

    #[test]
    fn test_longer_numeric_wins() {
        assert!(version_gt("1.0.0.1", "1.0.0"));
    }
}
