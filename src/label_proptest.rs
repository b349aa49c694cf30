//! Property-based tests for patch label derivation.
//!
//! Labels end up in file names, so these check that every subject yields a
//! safe, stable, non-empty label.

#[cfg(test)]
mod proptest_tests {
    use crate::phases::materialize::commit_label;
    use crate::types::CommitId;
    use proptest::prelude::*;

    fn id() -> CommitId {
        CommitId::from("0123456789abcdef0123456789abcdef01234567")
    }

    proptest! {
        /// Property: labels only contain `[A-Za-z0-9._-]`
        #[test]
        fn commit_label_is_filesystem_safe(subject in ".*") {
            let label = commit_label(&subject, &id());
            prop_assert!(
                label.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')),
                "unsafe label {:?} from subject {:?}",
                label,
                subject
            );
        }

        /// Property: labels are never empty
        #[test]
        fn commit_label_is_never_empty(subject in ".*") {
            prop_assert!(!commit_label(&subject, &id()).is_empty());
        }

        /// Property: labels never start or end with a dash
        #[test]
        fn commit_label_is_trimmed(subject in ".*") {
            let label = commit_label(&subject, &id());
            prop_assert!(!label.starts_with('-'));
            prop_assert!(!label.ends_with('-'));
        }

        /// Property: the same subject always yields the same label
        #[test]
        fn commit_label_is_deterministic(subject in ".*") {
            prop_assert_eq!(commit_label(&subject, &id()), commit_label(&subject, &id()));
        }

        /// Property: safe subjects without edge dashes pass through unchanged
        #[test]
        fn commit_label_preserves_safe_subjects(subject in "[A-Za-z0-9._][A-Za-z0-9._-]{0,30}[A-Za-z0-9._]") {
            prop_assert_eq!(commit_label(&subject, &id()), subject);
        }

        /// Property: a label is stable under relabelling
        #[test]
        fn commit_label_is_idempotent(subject in ".*") {
            let once = commit_label(&subject, &id());
            prop_assert_eq!(commit_label(&once, &id()), once.clone());
        }
    }
}
