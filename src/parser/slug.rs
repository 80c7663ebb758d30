use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

const EMPTY_ID: &str = "node";

/// Lower-case, collapse every non-alphanumeric run into one hyphen, trim hyphens.
pub fn normalize(text: &str) -> String {
    NON_ALNUM_RE
        .replace_all(&text.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Hands out ids that are unique within one document. The first heading keeps
/// the bare id, later ones get `-2`, `-3`, ... in traversal order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    taken: HashSet<String>,
    repeats: HashMap<String, usize>,
}

impl IdAllocator {
    pub fn allocate(&mut self, text: &str) -> String {
        let mut base = normalize(text);
        if base.is_empty() {
            base = EMPTY_ID.to_string();
        }
        if self.taken.insert(base.clone()) {
            return base;
        }
        let n = self.repeats.entry(base.clone()).or_insert(1);
        loop {
            *n += 1;
            let candidate = format!("{}-{}", base, n);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
