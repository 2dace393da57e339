//! Typo tolerance.
//!
//! Distances come from `strsim::osa_distance` (optimal string alignment:
//! Levenshtein plus adjacent transpositions), so "emial" is one edit away
//! from "email". This module decides how many edits a term may absorb.

/// Terms shorter than this never match fuzzily
const MIN_FUZZY_TERM_LEN: usize = 3;

/// Terms up to this length tolerate a single edit
const SHORT_TERM_LEN: usize = 4;

/// Largest distance accepted for a term of this length
pub fn allowed_distance(term: &str, max_edit_distance: usize) -> usize {
    let len = term.chars().count();
    if len < MIN_FUZZY_TERM_LEN {
        0
    } else if len <= SHORT_TERM_LEN {
        max_edit_distance.min(1)
    } else {
        max_edit_distance
    }
}

/// True when some word is a near miss of `term` (1 to `max` edits away)
pub fn fuzzy_match<'a, I>(term: &str, words: I, max_edit_distance: usize) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    let allowed = allowed_distance(term, max_edit_distance);
    if allowed == 0 {
        return false;
    }
    let term_len = term.chars().count();

    words.into_iter().any(|word| {
        let word_len = word.chars().count();
        if term_len.abs_diff(word_len) > allowed {
            return false;
        }
        let distance = strsim::osa_distance(term, word);
        distance >= 1 && distance <= allowed
    })
}
