//! Prefix completion and "did you mean" suggestions over registry names.

/// Largest edit distance still offered as a suggestion.
pub const SUGGESTION_DISTANCE: usize = 2;

/// Maximum number of suggestions offered.
pub const MAX_SUGGESTIONS: usize = 3;

/// Result of a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Nothing matches.
    NoMatch,
    /// Text to insert after the typed token.
    Insert(String),
    /// Several matches and nothing to add; show them.
    List(Vec<String>),
}

/// Complete `token` against `candidates`.
///
/// One match completes it. Several matches extend the token to their
/// longest common prefix when that is longer than the token, otherwise
/// they are listed.
pub fn complete<'a, I>(token: &str, candidates: I) -> Completion
where
    I: IntoIterator<Item = &'a str>,
{
    let mut matches: Vec<&str> = candidates
        .into_iter()
        .filter(|name| name.starts_with(token))
        .collect();
    matches.sort_unstable();
    matches.dedup();

    match matches.as_slice() {
        [] => Completion::NoMatch,
        [only] => Completion::Insert(only[token.len()..].to_string()),
        [first, rest @ ..] => {
            let prefix = rest
                .iter()
                .fold(*first, |prefix, name| common_prefix(prefix, name));
            if prefix.len() > token.len() {
                Completion::Insert(prefix[token.len()..].to_string())
            } else {
                Completion::List(matches.iter().map(|s| s.to_string()).collect())
            }
        }
    }
}

/// Rank `candidates` by edit distance from a failed command name.
///
/// Returns at most [`MAX_SUGGESTIONS`] names that are within
/// [`SUGGESTION_DISTANCE`] edits or start with `name`, closest first.
pub fn suggest<'a, I>(name: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ranked: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter(|candidate| *candidate != name)
        .map(|candidate| (levenshtein(name, candidate), candidate))
        .filter(|(distance, candidate)| {
            *distance <= SUGGESTION_DISTANCE || (!name.is_empty() && candidate.starts_with(name))
        })
        .collect();
    ranked.sort_unstable();
    ranked.dedup();
    ranked
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

/// Classic two-row Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| a.len().min(b.len()));
    &a[..len]
}
