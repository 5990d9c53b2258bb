//! Text rendering utilities for human-friendly error messages.
//!
//! Provides helpers to format reference chains, candidate lists,
//! and "did you mean?" suggestions in error output.

/// Renders a reference chain as a readable string.
///
/// # Examples
/// ```
/// use khazina_support::rendering::render_chain;
///
/// let chain = vec!["app", "mailer", "transport", "app"];
/// let rendered = render_chain(&chain);
/// assert_eq!(rendered, "app → mailer → transport → app");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Summarizes a candidate list for an ambiguity message.
///
/// Candidates are sorted in natural order. Up to three are listed in full,
/// longer lists collapse to `first, ...last`.
///
/// ```
/// use khazina_support::rendering::summarize_candidates;
///
/// assert_eq!(summarize_candidates(&["b", "a"]), "a, b");
/// assert_eq!(summarize_candidates(&["d2", "d10", "d1", "d3"]), "d1, ...d10");
/// ```
pub fn summarize_candidates(candidates: &[impl AsRef<str>]) -> String {
    let mut sorted: Vec<&str> = candidates.iter().map(|c| c.as_ref()).collect();
    sorted.sort_by(|a, b| natural_cmp(a, b));

    match sorted.as_slice() {
        [] => String::new(),
        short if short.len() <= 3 => short.join(", "),
        [first, .., last] => format!("{first}, ...{last}"),
        _ => unreachable!(),
    }
}

/// Compares two strings treating embedded digit runs as numbers.
///
/// `svc2` sorts before `svc10`.
pub fn natural_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ln = take_number(&mut left);
                let rn = take_number(&mut right);
                let ordering = ln
                    .trim_start_matches('0')
                    .len()
                    .cmp(&rn.trim_start_matches('0').len())
                    .then_with(|| ln.trim_start_matches('0').cmp(rn.trim_start_matches('0')));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

/// Finds the closest registered identifier for a "did you mean?" hint.
///
/// Uses Levenshtein distance and only accepts a candidate whose distance is
/// at most `len / 4 + 1`, so wildly different ids are never suggested.
///
/// ```
/// use khazina_support::rendering::suggest;
///
/// let ids = ["logger", "mailer", "router"];
/// assert_eq!(suggest("loger", ids.iter().copied()), Some("logger".to_string()));
/// assert_eq!(suggest("database", ids.iter().copied()), None);
/// ```
pub fn suggest<'a>(requested: &str, available: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let threshold = requested.chars().count() / 4 + 1;

    available
        .into_iter()
        .filter(|candidate| *candidate != requested)
        .map(|candidate| (candidate, strsim::levenshtein(requested, candidate)))
        .filter(|(_, distance)| *distance <= threshold)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_simple_chain() {
        let chain = vec!["A", "B", "C", "A"];
        assert_eq!(render_chain(&chain), "A → B → C → A");
    }

    #[test]
    fn render_single_element_chain() {
        let chain = vec!["A"];
        assert_eq!(render_chain(&chain), "A");
    }

    #[test]
    fn render_empty_chain() {
        let chain: Vec<&str> = vec![];
        assert_eq!(render_chain(&chain), "");
    }

    #[test]
    fn summarize_short_list() {
        assert_eq!(summarize_candidates(&["mysql", "pgsql"]), "mysql, pgsql");
        assert_eq!(summarize_candidates(&["c", "a", "b"]), "a, b, c");
    }

    #[test]
    fn summarize_long_list_collapses() {
        let ids = ["db.4", "db.1", "db.12", "db.2"];
        assert_eq!(summarize_candidates(&ids), "db.1, ...db.12");
    }

    #[test]
    fn natural_order_numbers() {
        use std::cmp::Ordering;
        assert_eq!(natural_cmp("svc2", "svc10"), Ordering::Less);
        assert_eq!(natural_cmp("svc10", "svc10"), Ordering::Equal);
        assert_eq!(natural_cmp("b", "a1"), Ordering::Greater);
    }

    #[test]
    fn suggest_close_typo() {
        let ids = ["http.client", "http.server", "logger"];
        assert_eq!(
            suggest("http.clinet", ids.iter().copied()).as_deref(),
            Some("http.client")
        );
    }

    #[test]
    fn suggest_no_match() {
        let ids = ["database"];
        assert!(suggest("XyzAbcDef", ids.iter().copied()).is_none());
    }

    #[test]
    fn suggest_skips_exact_match() {
        let ids = ["logger"];
        assert!(suggest("logger", ids.iter().copied()).is_none());
    }
}
