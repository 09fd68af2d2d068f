//! Property-based tests for the data-model invariants.

use proptest::prelude::*;

use crate::changeset::{resolve_changeset, RemoteFileChange};
use crate::fetch::parse_size_hint;
use crate::preserve::PreservedPaths;

fn arb_path() -> impl Strategy<Value = String> {
    // small alphabet so paths collide often, which is the interesting case
    prop::collection::vec("[a-c]{1,3}", 1..3).prop_map(|parts| parts.join("/"))
}

fn arb_status() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("added".to_string()),
        Just("modified".to_string()),
        Just("removed".to_string()),
        Just("renamed".to_string()),
        Just("changed".to_string()),
    ]
}

fn arb_change() -> impl Strategy<Value = RemoteFileChange> {
    (arb_path(), arb_status(), prop::option::of(arb_path())).prop_map(
        |(path, status, previous_path)| RemoteFileChange {
            path,
            status,
            previous_path,
        },
    )
}

proptest! {
    /// No path ever lands in more than one changeset bucket.
    #[test]
    fn changeset_buckets_are_disjoint(entries in prop::collection::vec(arb_change(), 0..20)) {
        let changeset = resolve_changeset(entries);

        for path in &changeset.added {
            prop_assert!(!changeset.modified.contains(path));
            prop_assert!(!changeset.removed.contains(path));
        }
        for path in &changeset.modified {
            prop_assert!(!changeset.removed.contains(path));
        }
    }

    /// A lone rename always yields exactly its removal and its addition.
    #[test]
    fn rename_decomposes_into_both_halves(
        old in arb_path(),
        new in arb_path(),
    ) {
        prop_assume!(old != new);
        let changeset = resolve_changeset(vec![RemoteFileChange {
            path: new.clone(),
            status: "renamed".to_string(),
            previous_path: Some(old.clone()),
        }]);

        prop_assert!(changeset.added.contains(&new));
        prop_assert!(changeset.removed.contains(&old));
        prop_assert_eq!(changeset.len(), 2);
    }

    /// Filtering preserved paths never invents entries and never keeps a
    /// preserved one.
    #[test]
    fn preserved_filter_is_a_subset(
        entries in prop::collection::vec(arb_change(), 0..20),
        prefix in "[a-c]{1,3}",
    ) {
        let preserved = PreservedPaths::new(vec![prefix]);
        let changeset = resolve_changeset(entries);
        let filtered = changeset.without_preserved(&preserved);

        prop_assert!(filtered.len() <= changeset.len());
        for path in filtered
            .added
            .iter()
            .chain(filtered.modified.iter())
            .chain(filtered.removed.iter())
        {
            prop_assert!(!preserved.is_preserved(path));
            prop_assert!(
                changeset.added.contains(path)
                    || changeset.modified.contains(path)
                    || changeset.removed.contains(path)
            );
        }
    }

    /// Preservation matches whole components only: a sibling directory with
    /// the prefix as a name prefix is untouched.
    #[test]
    fn preservation_is_component_wise(prefix in "[a-z]{1,8}", rest in "[a-z]{1,8}") {
        let preserved = PreservedPaths::new(vec![prefix.clone()]);
        let inside = format!("{}/{}", prefix, rest);
        let sibling = format!("{}{}x/{}", prefix, rest, rest);
        prop_assert!(preserved.is_preserved(&inside));
        prop_assert!(!preserved.is_preserved(&sibling));
    }

    /// Size hints parse for every supported suffix.
    #[test]
    fn size_hint_parses_supported_suffixes(n in 0u64..10_000) {
        prop_assert_eq!(parse_size_hint(&format!("{n}kb")), Some(n * 1024));
        prop_assert_eq!(parse_size_hint(&format!("{n}MB")), Some(n * 1024 * 1024));
        prop_assert_eq!(parse_size_hint(&format!("{n}gb")), Some(n * 1024 * 1024 * 1024));
        prop_assert_eq!(parse_size_hint(&format!("{n}")), Some(n));
    }
}
