//! Browse session state.
//!
//! A [`BrowserState`] is an immutable snapshot of what a front end shows: the loaded keys,
//! the search term, the resulting groups and the selected key. Every change goes through
//! [`update`], which returns a new snapshot and leaves the old one untouched.
use crate::grouper::{group_filtered, DisplayGroup};
use crate::key::{KeyDescriptor, KeyValue};

/// text shown in place of a value whose describe call failed
pub const LOAD_FAILED_VALUE: &str = "[error loading value]";

/// Snapshot of a browse session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowserState {
    keys: Vec<KeyDescriptor>,
    search: String,
    groups: Vec<DisplayGroup>,
    selected: Option<String>,
    error: Option<String>,
}

/// Everything that can happen to a browse session
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// a fresh key listing arrived
    KeysLoaded(Vec<KeyDescriptor>),
    /// the key listing failed
    LoadFailed(String),
    /// the search term changed
    Search(String),
    /// the user folded or unfolded the group at this index
    ToggleGroup(usize),
    /// the user picked a key
    Select(String),
    /// the selection was cleared
    Deselect,
    /// a describe call for one key finished
    ValueLoaded(KeyDescriptor),
    /// a describe call for the named key failed
    ValueFailed(String),
}

impl BrowserState {
    /// every loaded key, unfiltered
    pub fn keys(&self) -> &[KeyDescriptor] {
        &self.keys
    }

    /// the active search term
    pub fn search(&self) -> &str {
        &self.search
    }

    /// the groups to display, after filtering
    pub fn groups(&self) -> &[DisplayGroup] {
        &self.groups
    }

    /// number of keys that survive the filter
    pub fn visible_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }

    /// the selected key, if it is still loaded
    pub fn selected(&self) -> Option<&KeyDescriptor> {
        let name = self.selected.as_deref()?;
        self.keys.iter().find(|k| k.name == name)
    }

    /// the last listing error
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// convenience for `update(&self, action)`
    pub fn apply(&self, action: Action) -> BrowserState {
        update(self, action)
    }

    fn regrouped(mut self) -> BrowserState {
        self.groups = group_filtered(&self.keys, &self.search);
        self
    }

    fn with_key(mut self, name: &str, f: impl Fn(&mut KeyDescriptor)) -> BrowserState {
        self.keys.iter_mut().filter(|k| k.name == name).for_each(&f);
        self.groups
            .iter_mut()
            .flat_map(|g| g.members.iter_mut())
            .filter(|k| k.name == name)
            .for_each(&f);
        self
    }
}

/// computes the snapshot that follows `state` once `action` happened
pub fn update(state: &BrowserState, action: Action) -> BrowserState {
    let next = state.clone();
    match action {
        Action::KeysLoaded(keys) => {
            let mut next = next;
            next.selected = next
                .selected
                .take()
                .filter(|name| keys.iter().any(|k| k.name == *name));
            next.keys = keys;
            next.error = None;
            next.regrouped()
        }
        Action::LoadFailed(message) => BrowserState {
            error: Some(message),
            ..next
        },
        Action::Search(search) => BrowserState { search, ..next }.regrouped(),
        Action::ToggleGroup(index) => {
            let mut next = next;
            if let Some(group) = next.groups.get_mut(index) {
                group.expanded = !group.expanded;
            }
            next
        }
        Action::Select(name) => {
            if next.keys.iter().any(|k| k.name == name) {
                BrowserState {
                    selected: Some(name),
                    ..next
                }
            } else {
                next
            }
        }
        Action::Deselect => BrowserState {
            selected: None,
            ..next
        },
        // a value arriving does not change the key set, so groups and their fold state stay
        Action::ValueLoaded(described) => {
            let name = described.name.clone();
            next.with_key(&name, |k| *k = described.clone())
        }
        Action::ValueFailed(name) => next.with_key(&name, |k| {
            k.value = Some(KeyValue::Placeholder(LOAD_FAILED_VALUE.to_string()))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ValueType;

    fn loaded(names: &[&str]) -> BrowserState {
        let keys = names.iter().map(|n| KeyDescriptor::named(*n)).collect();
        BrowserState::default().apply(Action::KeysLoaded(keys))
    }

    #[test]
    fn loading_groups_keys() {
        let state = loaded(&["user:2", "user:1", "solo"]);
        assert_eq!(state.groups().len(), 2);
        assert_eq!(state.visible_count(), 3);
        assert_eq!(state.groups()[1].prefix, "user:");
    }

    #[test]
    fn search_regroups_and_keeps_old_snapshot() {
        let before = loaded(&["user:1", "user:2", "video:1"]);
        let after = before.apply(Action::Search("VIDEO".into()));
        assert_eq!(after.visible_count(), 1);
        assert_eq!(after.groups()[0].prefix, "video:1");
        assert_eq!(before.visible_count(), 3);
        assert_eq!(before.search(), "");
    }

    #[test]
    fn toggle_flips_one_group() {
        let state = loaded(&["user:1", "user:2", "video:1"]);
        let toggled = state.apply(Action::ToggleGroup(0));
        assert!(toggled.groups()[0].expanded);
        assert!(toggled.groups()[1].expanded);
        let same = toggled.apply(Action::ToggleGroup(99));
        assert_eq!(same, toggled);
    }

    #[test]
    fn value_load_keeps_fold_state() {
        let state = loaded(&["user:1", "user:2"]).apply(Action::ToggleGroup(0));
        let described =
            KeyDescriptor::described("user:1", ValueType::Scalar, -1, KeyValue::Scalar("ana".into()));
        let next = state.apply(Action::ValueLoaded(described.clone()));
        assert!(next.groups()[0].expanded);
        assert_eq!(next.groups()[0].members[0], described);
        assert_eq!(next.keys()[0], described);
    }

    #[test]
    fn failed_value_gets_placeholder() {
        let state = loaded(&["k"]).apply(Action::ValueFailed("k".into()));
        assert_eq!(
            state.keys()[0].value,
            Some(KeyValue::Placeholder(LOAD_FAILED_VALUE.into()))
        );
    }

    #[test]
    fn selection_follows_key_set() {
        let state = loaded(&["a", "b"]).apply(Action::Select("b".into()));
        assert_eq!(state.selected().map(|k| k.name.as_str()), Some("b"));
        assert!(state.apply(Action::Select("zzz".into())).selected().is_some());

        let reloaded = state.apply(Action::KeysLoaded(vec![KeyDescriptor::named("a")]));
        assert!(reloaded.selected().is_none());
        assert!(state.apply(Action::Deselect).selected().is_none());
    }

    #[test]
    fn load_failure_is_cleared_by_next_load() {
        let failed = BrowserState::default().apply(Action::LoadFailed("boom".into()));
        assert_eq!(failed.error(), Some("boom"));
        let ok = failed.apply(Action::KeysLoaded(vec![]));
        assert_eq!(ok.error(), None);
        assert!(ok.groups().is_empty());
    }
}
