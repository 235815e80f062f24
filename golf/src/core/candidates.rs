//! Legal-move assembly for one turn.
//!
//! Pure: link fetching happens in the engine, this module only combines an
//! already-fetched link list with the visit history. Backtrack candidates come
//! first (most recently visited first), then forward links, deduplicated with
//! the current page removed.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::core::types::LINK_SAMPLE_SEED;

/// Returns true when `link` may be offered as a candidate.
pub fn allowed_link(link: &str, exclude_digit_links: bool) -> bool {
    if !exclude_digit_links {
        return true;
    }
    !link
        .chars()
        .any(|c| c.is_ascii_digit() || ('０'..='９').contains(&c))
}

/// Assemble the ordered candidate set for a turn.
///
/// `history` is the full visit path including the current page as its last
/// element. An empty return value means the turn has no legal move and the
/// caller must treat it as terminal.
pub fn assemble(
    current: &str,
    history: &[String],
    links: &[String],
    max_links: usize,
    exclude_digit_links: bool,
) -> Vec<String> {
    // Previously visited pages, deduplicated, most recent first. Lets the
    // agent go back when a branch turns out to be a dead end.
    let mut past: Vec<&str> = Vec::new();
    for page in history[..history.len().saturating_sub(1)].iter().rev() {
        if !past.contains(&page.as_str()) {
            past.push(page);
        }
    }

    let filtered: Vec<&str> = links
        .iter()
        .map(String::as_str)
        .filter(|link| allowed_link(link, exclude_digit_links))
        .collect();

    let limited: Vec<&str> = if max_links > 0 && filtered.len() > max_links {
        sample_links(&filtered, max_links)
    } else {
        filtered
    };

    let mut ordered: Vec<String> = Vec::new();
    for item in past.into_iter().chain(limited) {
        if item != current && !ordered.iter().any(|seen| seen == item) {
            ordered.push(item.to_string());
        }
    }
    ordered
}

/// Down-sample an oversized link list to exactly `max_links` titles.
///
/// The generator is re-seeded with [`LINK_SAMPLE_SEED`] on every call, so the
/// same input always yields the same subset no matter how many times sampling
/// has already run in this process. The sample is sorted lexicographically
/// before use.
fn sample_links<'a>(links: &[&'a str], max_links: usize) -> Vec<&'a str> {
    let mut sampler = StdRng::seed_from_u64(LINK_SAMPLE_SEED);
    let mut sampled: Vec<&str> = links
        .choose_multiple(&mut sampler, max_links)
        .copied()
        .collect();
    sampled.sort_unstable();
    sampled
}
