//! Detection of unread-aggregation folders.

use crate::search::FolderSearch;

/// Expressions that make a virtual folder an unread folder.
pub const DEFAULT_UNREAD_EXPRESSIONS: &[&str] = &[
    r#"(match-all (not (system-flag "Seen")))"#,
    r#"(and (match-all (not (system-flag "Seen"))))"#,
    r#"(or (match-all (not (system-flag "Seen"))))"#,
    r#"(match-threads "all" (and (match-all (not (system-flag "Seen")))))"#,
    r#"(match-threads "all" (or (match-all (not (system-flag "Seen")))))"#,
];

/// Returns true if `expr` parses to the same tree as one of the unread
/// expressions. `configured` replaces the defaults with a `;`-separated
/// list.
pub(crate) fn is_unread_expression(
    search: &FolderSearch,
    expr: &str,
    configured: Option<&str>,
) -> bool {
    let Ok(term) = search.parse(expr) else {
        return false;
    };

    let candidates: Vec<&str> = match configured {
        Some(list) => list
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect(),
        None => DEFAULT_UNREAD_EXPRESSIONS.to_vec(),
    };

    candidates
        .into_iter()
        .filter_map(|candidate| search.parse(candidate).ok())
        .any(|candidate| *candidate == *term)
}
