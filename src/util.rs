use std::cmp::Ordering;

/// Strip characters that are unsafe in file names and recipe identifiers.
///
/// Used both for output destinations and for the normalized variant of the
/// app name handed to the existing-recipe search.
pub fn filename_safe(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        match ch {
            '/' | ':' | '\\' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('-'),
            ch if ch.is_whitespace() => {}
            ch => out.push(ch),
        }
    }
    out
}

/// True when a string looks like a dotted numeric version ("1.2.3", "10.4").
pub fn is_version_shaped(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed
        .split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Lenient dotted-numeric version comparison.
///
/// Non-numeric components compare as zero; missing components compare as
/// zero, so "1.2" == "1.2.0". Returns None when neither side contains a
/// single numeric component, which callers treat as "cannot order".
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a_parts = numeric_components(a);
    let b_parts = numeric_components(b);
    if a_parts.is_empty() && b_parts.is_empty() {
        return None;
    }
    let len = a_parts.len().max(b_parts.len());
    for i in 0..len {
        let left = a_parts.get(i).copied().unwrap_or(0);
        let right = b_parts.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}

fn numeric_components(raw: &str) -> Vec<u64> {
    raw.trim()
        .split(['.', '-', '_'])
        .filter_map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok()
        })
        .collect()
}
