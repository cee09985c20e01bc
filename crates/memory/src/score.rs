use std::collections::HashSet;

/// Minimum overlap score for a memory to count as relevant.
pub const RELEVANCE_FLOOR: f64 = 0.1;

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard overlap of the word sets of `query` and `candidate`, in `[0, 1]`.
pub fn keyword_overlap(query: &str, candidate: &str) -> f64 {
    let q = tokenize(query);
    let c = tokenize(candidate);
    if q.is_empty() || c.is_empty() {
        return 0.0;
    }
    let intersection = q.intersection(&c).count();
    let union = q.union(&c).count();
    intersection as f64 / union as f64
}
