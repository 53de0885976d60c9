//! Metric key encoding
//!
//! A metric name and its ordered tag list are folded into one string so the
//! pair can be used as a map key. Key format: `<name>` when there are no tags,
//! `<name>[<tag>,<tag>,...]` otherwise.
//!
//! Examples:
//! - `http.requests`
//! - `http.requests[env:prod,host:web01]`
//!
//! Tag order is significant. `["a", "b"]` and `["b", "a"]` produce two
//! distinct keys and are aggregated separately. Callers are expected to pass
//! tags in a consistent order.

use once_cell::sync::Lazy;
use regex::Regex;

/// A non-empty name with no `[`, optionally followed by a bracketed tag list at
/// the very end.
static KEY_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\[]+)(?:\[([^\]]*)\])?$").expect("key grammar must compile"));

/// Encode `metric` and `tags` into a single key
///
/// Absent and empty tag lists both encode to the bare metric name.
#[must_use]
pub fn encode(metric: &str, tags: Option<&[&str]>) -> String {
    match tags {
        Some(tags) if !tags.is_empty() => {
            let mut key = String::with_capacity(
                metric.len() + 2 + tags.iter().map(|t| t.len() + 1).sum::<usize>(),
            );
            key.push_str(metric);
            key.push('[');
            for (i, tag) in tags.iter().enumerate() {
                if i > 0 {
                    key.push(',');
                }
                key.push_str(tag);
            }
            key.push(']');
            key
        }
        _ => metric.to_string(),
    }
}

/// A metric name paired with its ordered tag list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    /// The metric name
    pub name: String,
    /// The tag list, `None` when there are no tags
    pub tags: Option<Vec<String>>,
}

impl MetricKey {
    /// Create a new `MetricKey`. An empty tag list is stored as `None`.
    #[must_use]
    pub fn new(name: &str, tags: Option<&[&str]>) -> Self {
        Self {
            name: name.to_string(),
            tags: tags
                .filter(|t| !t.is_empty())
                .map(|t| t.iter().map(ToString::to_string).collect()),
        }
    }

    /// Encode this key, see [`encode`]
    #[must_use]
    pub fn encode(&self) -> String {
        match &self.tags {
            Some(tags) => {
                let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
                encode(&self.name, Some(tags.as_slice()))
            }
            None => self.name.clone(),
        }
    }

    /// Decode a key produced by [`encode`]
    ///
    /// Returns `None` if the key is empty or does not match the key grammar,
    /// for instance when the name contains a stray `[`. An empty bracket
    /// decodes to absent tags.
    #[must_use]
    pub fn decode(key: &str) -> Option<Self> {
        let captures = KEY_GRAMMAR.captures(key)?;
        let name = captures.get(1)?.as_str().to_string();
        let tags = captures
            .get(2)
            .map(|m| m.as_str())
            .filter(|t| !t.is_empty())
            .map(|t| t.split(',').map(ToString::to_string).collect());

        Some(Self { name, tags })
    }

    /// Whether [`MetricKey::decode`] accepts the encoding of this key at all.
    ///
    /// The name must be non-empty and free of `[`, and no tag may contain `]`.
    /// A decodable key may still come back with different tags, see
    /// [`MetricKey::round_trips`].
    #[must_use]
    pub fn is_decodable(&self) -> bool {
        !self.name.is_empty()
            && !self.name.contains('[')
            && self
                .tags
                .as_ref()
                .is_none_or(|tags| !tags.iter().any(|t| t.contains(']')))
    }

    /// Whether [`MetricKey::decode`] recovers exactly this key from its
    /// encoding.
    ///
    /// On top of [`MetricKey::is_decodable`], tags must be free of `,` and a
    /// lone empty tag decodes to no tags.
    #[must_use]
    pub fn round_trips(&self) -> bool {
        if !self.is_decodable() {
            return false;
        }
        match &self.tags {
            None => true,
            Some(tags) if tags.len() == 1 && tags[0].is_empty() => false,
            Some(tags) => !tags.iter().any(|t| t.contains(',')),
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::{collection, prelude::*};

    use super::{MetricKey, encode};

    #[test]
    fn untagged_key_is_the_name() {
        assert_eq!(encode("test.metric", None), "test.metric");
        assert_eq!(encode("test.metric", Some(&[])), "test.metric");
    }

    #[test]
    fn tagged_key_brackets_tags_in_order() {
        assert_eq!(
            encode("test.metric", Some(&["tag:first", "tag:second"])),
            "test.metric[tag:first,tag:second]"
        );
        assert_ne!(
            encode("m", Some(&["a", "b"])),
            encode("m", Some(&["b", "a"]))
        );
    }

    #[test]
    fn decode_recovers_name_and_tags() {
        let key = MetricKey::decode("test.metric[tag:first,tag:second]").expect("decodes");
        assert_eq!(key.name, "test.metric");
        assert_eq!(
            key.tags,
            Some(vec!["tag:first".to_string(), "tag:second".to_string()])
        );

        let key = MetricKey::decode("test.metric").expect("decodes");
        assert_eq!(key, MetricKey::new("test.metric", None));
    }

    #[test]
    fn empty_bracket_decodes_to_absent_tags() {
        let key = MetricKey::decode("test.metric[]").expect("decodes");
        assert_eq!(key.tags, None);
    }

    #[test]
    fn empty_tags_between_commas_survive() {
        let key = MetricKey::decode("m[a,,b]").expect("decodes");
        assert_eq!(
            key.tags,
            Some(vec!["a".to_string(), String::new(), "b".to_string()])
        );
    }

    #[test]
    fn decode_rejects_pathological_keys() {
        assert!(MetricKey::decode("").is_none());
        assert!(MetricKey::decode("[a,b]").is_none());
        assert!(MetricKey::decode("m[a]trailing").is_none());
        assert!(MetricKey::decode("m[a]]").is_none());
        assert!(MetricKey::decode("m[a").is_none());
    }

    #[test]
    fn bracket_inside_tag_list_is_tag_content() {
        assert_eq!(
            MetricKey::decode("m[[a]"),
            Some(MetricKey {
                name: "m".to_string(),
                tags: Some(vec!["[a".to_string()]),
            })
        );
    }

    #[test]
    fn is_decodable_flags_keys_decode_refuses() {
        assert!(MetricKey::new("m", Some(&["a,b"])).is_decodable());
        assert!(MetricKey::new("m", Some(&[""])).is_decodable());
        assert!(MetricKey::new("m", Some(&["[a"])).is_decodable());
        assert!(!MetricKey::new("", None).is_decodable());
        assert!(!MetricKey::new("m[0]", None).is_decodable());
        assert!(!MetricKey::new("m", Some(&["a]"])).is_decodable());
    }

    #[test]
    fn lossy_tags_decode_the_way_they_encode() {
        let key = MetricKey::new("n", Some(&["a,b"]));
        assert_eq!(
            MetricKey::decode(&key.encode()),
            Some(MetricKey::new("n", Some(&["a", "b"])))
        );
        let key = MetricKey::new("m", Some(&[""]));
        assert_eq!(
            MetricKey::decode(&key.encode()),
            Some(MetricKey::new("m", None))
        );
    }

    #[test]
    fn round_trips_flags_unrepresentable_keys() {
        assert!(MetricKey::new("m", Some(&["a", "b"])).round_trips());
        assert!(MetricKey::new("m", Some(&["", "b"])).round_trips());
        assert!(!MetricKey::new("", None).round_trips());
        assert!(!MetricKey::new("m[0]", None).round_trips());
        assert!(!MetricKey::new("m", Some(&["a,b"])).round_trips());
        assert!(!MetricKey::new("m", Some(&["a]"])).round_trips());
        assert!(!MetricKey::new("m", Some(&[""])).round_trips());
    }

    fn metric_key() -> impl Strategy<Value = MetricKey> {
        (
            "[a-z0-9._:\\]-]{1,24}",
            collection::vec("[a-z0-9._:\\[-]{0,16}", 0..6),
        )
            .prop_map(|(name, tags)| {
                let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
                MetricKey::new(&name, Some(tags.as_slice()))
            })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(key in metric_key()) {
            prop_assume!(key.round_trips());
            prop_assert_eq!(MetricKey::decode(&key.encode()), Some(key));
        }

        #[test]
        fn decodable_keys_decode(name in ".*", tags in collection::vec(".*", 0..4)) {
            let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
            let key = MetricKey::new(&name, Some(tags.as_slice()));
            let decoded = MetricKey::decode(&key.encode());
            prop_assert_eq!(decoded.is_some(), key.is_decodable());
        }
    }
}
