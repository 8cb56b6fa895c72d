//! Index Classifier (C3): group extraction, special-index detection, and
//! write-index detection for aliases and data streams (§4.3).

use crate::cluster::types::{AliasMember, DataStream, IndexRecord};
use regex::Regex;
use std::sync::OnceLock;

fn trailing_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-\d{4}[.\-_:]\d{2}[.\-_:]\d{2}$").expect("static regex"))
}

fn embedded_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}[.\-_:]\d{2}[.\-_:]\d{2}-").expect("static regex"))
}

fn trailing_ordinal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-\d{1,6}$").expect("static regex"))
}

fn remove_first_match(re: &Regex, s: &str) -> String {
    match re.find(s) {
        Some(m) => format!("{}{}", &s[..m.start()], &s[m.end()..]),
        None => s.to_string(),
    }
}

/// Strip a leading `.ds-` marker, a date token (trailing-with-leading-hyphen,
/// or embedded-with-trailing-hyphen), and a trailing ordinal suffix, in that
/// order. §4.3 step 1-4.
pub fn group(index_name: &str) -> String {
    let name = index_name.strip_prefix(".ds-").unwrap_or(index_name);

    let after_trailing_date = remove_first_match(trailing_date_re(), name);
    let after_embedded_date = remove_first_match(embedded_date_re(), &after_trailing_date);
    remove_first_match(trailing_ordinal_re(), &after_embedded_date)
}

const SPECIAL_PREFIXES: &[&str] = &[
    "accounting",
    "elastic-ilm",
    "elastastalert",
    "elastalert",
    "readonlyrest",
    ".readonlyrest",
    "reflex-",
    "ilm",
];

/// §4.3: an index is special if it begins with any enumerated prefix, or
/// begins with `.` but is neither `.monitoring` nor `.ds-` (i.e. every
/// system index except monitoring and data streams).
pub fn is_special(name: &str) -> bool {
    if SPECIAL_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return true;
    }
    if name.starts_with('.') && !name.starts_with(".monitoring") && !name.starts_with(".ds-") {
        return true;
    }
    false
}

/// Trailing ordinal suffix of a data-stream backing index name, as a
/// number (`.ds-logs-app-2024.01.02-000028` -> `Some(28)`). Mirrors
/// `original_source/shards.py`'s `index_name.endswith(str(generation))`
/// check, compared numerically rather than by string suffix so zero
/// padding doesn't matter.
fn trailing_ordinal(index_name: &str) -> Option<u32> {
    trailing_ordinal_re().find(index_name).and_then(|m| {
        index_name[m.start() + 1..m.end()].parse().ok()
    })
}

/// Synthesizes `AliasMember` triples for data streams. §4.3: "the
/// write-index is the one whose ordinal suffix equals the data stream's
/// zero-padded `generation`" -- retention/rollover routinely deletes old
/// generations, so the write member is not necessarily the last array
/// entry; it must be found by ordinal, not position.
pub fn synthesize_data_stream_members(data_streams: &[DataStream]) -> Vec<AliasMember> {
    let mut out = Vec::new();
    for ds in data_streams {
        for member in &ds.indices {
            let is_write_index = trailing_ordinal(&member.index_name) == Some(ds.generation);
            out.push(AliasMember {
                alias: ds.name.clone(),
                index: member.index_name.clone(),
                is_write_index,
            });
        }
    }
    out
}

/// Applies write-index flags from the combined alias/data-stream membership
/// list onto a set of freshly-fetched index records.
pub fn annotate_write_indices(indices: &mut [IndexRecord], members: &[AliasMember]) {
    for idx in indices.iter_mut() {
        idx.is_write_index = members
            .iter()
            .any(|m| m.index == idx.name && m.is_write_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::DataStreamIndex;

    #[test]
    fn group_strips_ds_prefix_date_and_ordinal() {
        assert_eq!(group(".ds-logs-app-2024.01.02-000028"), "logs-app");
    }

    #[test]
    fn data_stream_write_index_found_by_ordinal_not_position() {
        // generation=28 but old generations were already deleted by
        // retention, so the backing-index array has fewer than 28 entries
        // and the write member is not the last one by position.
        let ds = DataStream {
            name: "logs-app".to_string(),
            generation: 28,
            indices: vec![
                DataStreamIndex {
                    index_name: ".ds-logs-app-2024.01.02-000025".to_string(),
                },
                DataStreamIndex {
                    index_name: ".ds-logs-app-2024.01.03-000026".to_string(),
                },
                DataStreamIndex {
                    index_name: ".ds-logs-app-2024.01.04-000027".to_string(),
                },
                DataStreamIndex {
                    index_name: ".ds-logs-app-2024.01.05-000028".to_string(),
                },
            ],
        };
        let members = synthesize_data_stream_members(&[ds]);
        let write_members: Vec<&str> = members
            .iter()
            .filter(|m| m.is_write_index)
            .map(|m| m.index.as_str())
            .collect();
        assert_eq!(write_members, vec![".ds-logs-app-2024.01.05-000028"]);
    }

    #[test]
    fn group_strips_trailing_date_only() {
        assert_eq!(group("logstash-iis-2024.01.02"), "logstash-iis");
    }

    #[test]
    fn group_strips_leading_date() {
        assert_eq!(group("2024.01.02-logstash-iis"), "logstash-iis");
    }

    #[test]
    fn group_is_stable_with_no_suffixes() {
        assert_eq!(group("winlogbeat"), "winlogbeat");
    }

    #[test]
    fn special_prefixes_match() {
        for name in [
            "accounting-foo",
            "elastic-ilm-jobs",
            "elastalert_status",
            ".readonlyrest",
            "reflex-intel",
            "ilm-history-1",
            ".kibana_task_manager",
        ] {
            assert!(is_special(name), "{name} should be special");
        }
    }

    #[test]
    fn monitoring_and_ds_prefixes_are_not_special() {
        assert!(!is_special(".monitoring-es-7-2024.01.01"));
        assert!(!is_special(".ds-logs-app-2024.01.02-000028"));
    }

    #[test]
    fn ordinary_index_is_not_special() {
        assert!(!is_special("logstash-iis-2024.01.02"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn base_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{2,10}(-[a-z0-9]{2,8}){0,2}"
    }

    fn date_token() -> impl Strategy<Value = String> {
        (2015..2026i32, 1..13u32, 1..29u32).prop_map(|(y, m, d)| format!("{y:04}.{m:02}.{d:02}"))
    }

    proptest! {
        #[test]
        fn group_invariant_under_date_and_ordinal_suffix(
            base in base_name(),
            date in date_token(),
            ordinal in 0u32..999_999,
        ) {
            let decorated = format!("{base}-{date}-{ordinal:06}");
            prop_assert_eq!(group(&decorated), group(&base));
        }

        #[test]
        fn special_is_false_for_monitoring_and_data_stream_prefixes(suffix in "[a-z0-9.\\-]{0,20}") {
            prop_assert!(!is_special(&format!(".monitoring{suffix}")));
            prop_assert!(!is_special(&format!(".ds-{suffix}")));
        }
    }
}
