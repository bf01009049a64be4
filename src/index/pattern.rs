//! Three-way comparison of reversed-domain token lists, used to locate
//! the clusters that could contain a URL pattern's pages.

use std::cmp::Ordering;

/// Compares `query` (the user-supplied pattern) against `other` (a
/// cluster's domain tokens), component-wise, lexicographically.
///
/// A prefix of the other list sorts equal to it (so `["hu"]` compares
/// equal to `["hu", "elte"]`): the rule from spec §4.A step 1, "a
/// prefix of b sorts before b" collapsed to 0 for the subdomain case,
/// since the resolver only needs to know less/greater-or-prefix.
pub fn compare_inverse_surt_lists(query: &[&str], other: &[&str]) -> Ordering {
    for (q, o) in query.iter().zip(other.iter()) {
        match q.cmp(o) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    if query.len() > other.len() {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_pattern_matches_prefix_of_subdomain() {
        assert_eq!(
            compare_inverse_surt_lists(&["hu"], &["hu", "elte"]),
            Ordering::Equal
        );
    }

    #[test]
    fn longer_query_than_other_is_greater() {
        assert_eq!(
            compare_inverse_surt_lists(&["hu", "elte"], &["hu"]),
            Ordering::Greater
        );
    }

    #[test]
    fn differing_component_decides_order() {
        assert_eq!(
            compare_inverse_surt_lists(&["hu"], &["id"]),
            Ordering::Less
        );
        assert_eq!(
            compare_inverse_surt_lists(&["id"], &["hu"]),
            Ordering::Greater
        );
    }
}
