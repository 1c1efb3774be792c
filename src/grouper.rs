//! Prefix grouping of a flat key listing.
//!
//! Keys are sorted, then walked once. Neighbouring keys that share a separator aligned
//! prefix (`user:1`, `user:2`, ...) are collapsed into one [`DisplayGroup`] labelled by that
//! prefix; keys with nothing in common with their neighbours become singleton groups.
use serde::Serialize;

use crate::key::KeyDescriptor;

/// characters that end a meaningful segment of a key name
pub const SEPARATORS: [char; 4] = ['-', '_', ':', '.'];

/// A cluster of keys shown together
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayGroup {
    /// the shared prefix, or the full key name for a singleton
    pub prefix: String,
    /// members, sorted by name
    pub members: Vec<KeyDescriptor>,
    /// whether the group starts out unfolded
    pub expanded: bool,
}

impl DisplayGroup {
    fn close(members: Vec<KeyDescriptor>, prefix: String) -> DisplayGroup {
        if members.len() == 1 {
            DisplayGroup {
                prefix: members[0].name.clone(),
                members,
                expanded: true,
            }
        } else {
            DisplayGroup {
                prefix,
                members,
                expanded: false,
            }
        }
    }

    /// true if the group holds exactly one key
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// partitions `keys` into display groups.
///
/// Every key ends up in exactly one group, groups come out in name order, and duplicate
/// names are kept as separate members.
pub fn group(mut keys: Vec<KeyDescriptor>) -> Vec<DisplayGroup> {
    // String ordering is byte-wise, which is what makes shared prefixes adjacent
    keys.sort_by(|a, b| a.name.cmp(&b.name));

    let mut groups = Vec::new();
    let mut cluster: Vec<KeyDescriptor> = Vec::new();
    let mut prefix = String::new();

    let mut iter = keys.into_iter().peekable();
    while let Some(key) = iter.next() {
        if !cluster.is_empty() {
            let candidate = shared_prefix(&prefix, &key.name);
            if !candidate.is_empty() && candidate.len() >= prefix.len() {
                prefix = candidate;
                cluster.push(key);
                continue;
            }
            groups.push(DisplayGroup::close(std::mem::take(&mut cluster), prefix));
        }
        // seed the new cluster from the next key so a pair is recognised immediately
        prefix = match iter.peek() {
            Some(next) => shared_prefix(&key.name, &next.name),
            None => String::new(),
        };
        cluster.push(key);
    }

    if !cluster.is_empty() {
        groups.push(DisplayGroup::close(cluster, prefix));
    }
    groups
}

/// keeps the keys whose name contains `term`, ignoring case. An empty term keeps everything.
pub fn filter(keys: &[KeyDescriptor], term: &str) -> Vec<KeyDescriptor> {
    if term.is_empty() {
        return keys.to_vec();
    }
    let needle = term.to_lowercase();
    keys.iter()
        .filter(|key| key.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// filters, then groups
pub fn group_filtered(keys: &[KeyDescriptor], term: &str) -> Vec<DisplayGroup> {
    group(filter(keys, term))
}

/// the longest common leading substring of `a` and `b`, cut back to end just after its last
/// separator. Without any separator the raw common substring is returned.
pub fn shared_prefix(a: &str, b: &str) -> String {
    let common = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map(|((i, _), _)| &a[..i])
        .unwrap_or_else(|| if a.len() <= b.len() { a } else { b });

    match common.rfind(|c| SEPARATORS.contains(&c)) {
        // every separator is a single byte
        Some(i) => common[..=i].to_string(),
        None => common.to_string(),
    }
}
