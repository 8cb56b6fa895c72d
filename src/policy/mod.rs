//! Policy Resolver (C2): longest-prefix match of an index name to a named
//! policy bucket within a policy sub-record (§4.2).
//!
//! The algorithm is identical across every policy family — families differ
//! only in the value shape stored behind each bucket name — so this module
//! is generic over the value type instead of duplicating the resolver once
//! per family the way the source did.

use std::collections::HashMap;

pub const GLOBAL_BUCKET: &str = "global";

/// Resolves `index_name` against `buckets`, returning the bucket name.
///
/// Candidates other than `global` are sorted by key length descending;
/// the first whose name is a prefix of `index_name` wins. Ties in length
/// are broken by the stable sort's natural (lexical) order. Falls back to
/// `global` if no other bucket matches, and `global` is returned even when
/// absent from the map (callers substitute a family default in that case).
pub fn resolve_bucket_name<V>(index_name: &str, buckets: &HashMap<String, V>) -> String {
    let mut candidates: Vec<&String> = buckets.keys().filter(|k| k.as_str() != GLOBAL_BUCKET).collect();
    candidates.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    candidates
        .into_iter()
        .find(|name| index_name.starts_with(name.as_str()))
        .cloned()
        .unwrap_or_else(|| GLOBAL_BUCKET.to_string())
}

/// Resolves and returns a reference to the bucket's value, falling back to
/// an owned `default` value when the resolved bucket (almost always
/// `global`) is absent from the map. §3's invariant: "every sub-record
/// contains `global`; if absent, the engine substitutes a family-specific
/// default."
pub fn resolve<'a, V>(index_name: &'a str, buckets: &'a HashMap<String, V>, default: &'a V) -> &'a V {
    let bucket = resolve_bucket_name(index_name, buckets);
    buckets.get(&bucket).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn longest_prefix_wins() {
        let buckets = map(&[("global", 30), ("logstash", 14), ("logstash-iis", 7)]);
        assert_eq!(resolve_bucket_name("logstash-iis-2024.01.02", &buckets), "logstash-iis");
        assert_eq!(resolve_bucket_name("logstash-suricata-2024.01.02", &buckets), "logstash");
        assert_eq!(resolve_bucket_name("winlogbeat-000001", &buckets), "global");
    }

    #[test]
    fn falls_back_to_global_when_absent() {
        let buckets = map(&[("logstash", 14)]);
        let default = 30u32;
        assert_eq!(*resolve("winlogbeat-000001", &buckets, &default), 30);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    proptest! {
        #[test]
        fn resolve_always_returns_a_key_of_the_record(
            index_name in "[a-z][a-z0-9\\-]{0,20}",
            bucket_names in prop::collection::hash_set("[a-z]{1,8}", 0..6),
        ) {
            let mut buckets: HashMap<String, u32> = bucket_names.into_iter().map(|k| (k, 1)).collect();
            buckets.insert(GLOBAL_BUCKET.to_string(), 0);
            let resolved = resolve_bucket_name(&index_name, &buckets);
            prop_assert!(buckets.contains_key(&resolved));

            let longest_matching = buckets
                .keys()
                .filter(|k| k.as_str() != GLOBAL_BUCKET && index_name.starts_with(k.as_str()))
                .map(|k| k.len())
                .max();
            match longest_matching {
                Some(len) => prop_assert_eq!(resolved.len(), len),
                None => prop_assert_eq!(resolved, GLOBAL_BUCKET.to_string()),
            }
        }
    }
}
