//! Value parsing and display helpers shared by the workflow and the reply text.

pub const NATIONAL_ID_DIGITS: usize = 12;

fn without_whitespace(input: &str) -> String {
    input.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Exactly twelve ASCII digits once whitespace is removed.
pub fn is_national_id(input: &str) -> bool {
    let compact = without_whitespace(input);
    compact.len() == NATIONAL_ID_DIGITS && compact.chars().all(|c| c.is_ascii_digit())
}

/// The compact form of a valid national ID, or `None`.
pub fn normalize_national_id(input: &str) -> Option<String> {
    is_national_id(input).then(|| without_whitespace(input))
}

pub fn mask_national_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("****{tail}")
}

/// Reads every ASCII digit in `input` as one number. Non-digits are skipped,
/// so "2,40,000" and "Rs. 240000" agree. No digits yields 0.
pub fn parse_income(input: &str) -> u64 {
    input
        .chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(u64::from(d)))
}

/// Indian digit grouping: the last three digits, then pairs.
pub fn format_inr(amount: u64) -> String {
    let digits = amount.to_string();
    if digits.len() <= 3 {
        return digits;
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{tail}", groups.join(","))
}

pub fn application_id(year: i32, suffix: u16) -> String {
    format!("SB-{year}-{:04}", suffix % 10_000)
}

pub fn is_application_id(value: &str) -> bool {
    let mut parts = value.split('-');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("SB"), Some(year), Some(suffix), None) => {
            year.len() == 4
                && suffix.len() == 4
                && year.chars().all(|c| c.is_ascii_digit())
                && suffix.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

/// Store identifiers are shown as their first eight characters, uppercased.
pub fn display_id(raw: &str) -> String {
    raw.chars().take(8).collect::<String>().to_uppercase()
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max).collect();
    format!("{head}...")
}
