//! Shared version-comparison utility (§4.6).
//!
//! Intentionally not semver: strips a leading `v`/`V`, splits on `.`, and
//! compares the leading digit run of each component. Callers that need
//! semver precedence (pre-release tags, build metadata) must wrap this.

use std::cmp::Ordering;

pub fn compare(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

pub fn is_newer(current: &str, new: &str) -> bool {
    compare(current, new) == Ordering::Less
}

fn components(v: &str) -> Vec<u64> {
    let stripped = v.strip_prefix(['v', 'V']).unwrap_or(v);
    stripped
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().unwrap_or(0)
        })
        .collect()
}
