use std::cmp::Ordering;

/// Compares two dotted version strings component by component.
///
/// Missing trailing components count as `0`, so `"1.0.0"` equals `"1.0"`.
/// Each component is read as its leading decimal digits; a component with no
/// leading digits counts as `0` and one too large for `u64` saturates.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());

    (0..len)
        .map(|idx| {
            let l = left.get(idx).copied().unwrap_or(0);
            let r = right.get(idx).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// True when `fresh` is strictly newer than `baseline`.
pub fn is_upgrade(fresh: &str, baseline: &str) -> bool {
    compare_versions(fresh, baseline) == Ordering::Greater
}

fn components(version: &str) -> Vec<u64> {
    version.trim().split('.').map(leading_number).collect()
}

fn leading_number(part: &str) -> u64 {
    let part = part.trim();
    let end = part
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(part.len());
    let digits = &part[..end];
    if digits.is_empty() {
        return 0;
    }
    digits.parse().unwrap_or(u64::MAX)
}
