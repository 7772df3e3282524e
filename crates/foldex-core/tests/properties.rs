//! Search and flag invariants over random folders.

use foldex_core::{CancellationToken, Folder, MailFolder, MessageRecord, SystemFlags};
use proptest::prelude::*;

const EXPRESSIONS: &[&str] = &[
    r#"(match-all (system-flag "Seen"))"#,
    r#"(match-all (not (system-flag "Seen")))"#,
    r#"(system-flag "Flagged")"#,
    r#"(or (system-flag "Junk") (match-all (system-flag "Deleted")))"#,
    r#"(and (match-all (system-flag "Seen")) (not (system-flag "Flagged")))"#,
    r#"(header-contains "subject" "even")"#,
    r#"(match-all (> (get-size) 1))"#,
    r#"(match-all #t)"#,
];

const COUNTED: &[&str] = &[
    r#"(system-flag "Seen")"#,
    r#"(match-all (system-flag "Seen"))"#,
    r#"(match-all (not (system-flag "Seen")))"#,
    r#"(match-all (system-flag "Deleted"))"#,
    r#"(match-all (system-flag "Junk"))"#,
    r#"(match-all #t)"#,
];

fn flags_strategy() -> impl Strategy<Value = SystemFlags> {
    (0u32..64).prop_map(|bits| {
        let mut flags = SystemFlags::empty();
        for (i, flag) in [
            SystemFlags::SEEN,
            SystemFlags::FLAGGED,
            SystemFlags::DELETED,
            SystemFlags::JUNK,
            SystemFlags::ANSWERED,
            SystemFlags::DRAFT,
        ]
        .into_iter()
        .enumerate()
        {
            if bits & (1 << i) != 0 {
                flags |= flag;
            }
        }
        flags
    })
}

fn folder_from(flags: &[SystemFlags]) -> Folder {
    let folder = Folder::new("INBOX");
    for (i, f) in flags.iter().enumerate() {
        let parity = if i % 2 == 0 { "even" } else { "odd" };
        folder.insert(
            MessageRecord::new((i + 1).to_string())
                .with_flags(*f)
                .with_subject(format!("{parity} message"))
                .with_size((i as u64) * 700),
        );
    }
    folder
}

proptest! {
    #[test]
    fn subset_form_restricts_full_search(
        flags in prop::collection::vec(flags_strategy(), 0..40),
        expr in prop::sample::select(EXPRESSIONS),
    ) {
        let folder = folder_from(&flags);
        let cancel = CancellationToken::new();
        let all = folder.uids();
        let full = folder.search(expr, None, &cancel).unwrap();
        let subset = folder.search(expr, Some(&all), &cancel).unwrap();
        prop_assert_eq!(full, subset);
    }

    #[test]
    fn set_flags_applies_mask(
        initial in flags_strategy(),
        mask in flags_strategy(),
        bits in flags_strategy(),
    ) {
        let folder = folder_from(&[initial]);
        let changed = folder.set_flags("1", mask, bits);
        let now = folder.get("1").unwrap().flags;
        prop_assert_eq!(now, (initial & !mask) | (bits & mask));
        prop_assert_eq!(changed, now != initial);
        prop_assert!(!folder.set_flags("1", mask, bits));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn count_shortcut_agrees_with_search(
        initial in prop::collection::vec(flags_strategy(), 1..30),
        steps in prop::collection::vec((0usize..30, flags_strategy(), flags_strategy()), 1000),
    ) {
        let folder = folder_from(&initial);
        let cancel = CancellationToken::new();
        for (step, (index, mask, bits)) in steps.into_iter().enumerate() {
            let uid = (index % initial.len() + 1).to_string();
            folder.set_flags(&uid, mask, bits);
            let expr = COUNTED[step % COUNTED.len()];
            let listed = folder.search(expr, None, &cancel).unwrap().len();
            prop_assert_eq!(folder.count(expr, &cancel).unwrap() as usize, listed, "{}", expr);
        }
        prop_assert_eq!(folder.counters(), folder.summary().recompute_counters());
    }
}
