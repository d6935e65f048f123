//! String casing helpers for display names
//!
//! Name parts are stored lowercase; presentation casing is computed at
//! projection time.

/// Start-case a whitespace-separated phrase: capitalize the first letter of
/// every word and collapse runs of whitespace.
pub fn start_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_case_basic() {
        assert_eq!(start_case("muhammad abdul"), "Muhammad Abdul");
    }

    #[test]
    fn test_start_case_collapses_whitespace() {
        assert_eq!(start_case("  a   b  "), "A B");
    }

    #[test]
    fn test_start_case_empty() {
        assert_eq!(start_case(""), "");
        assert_eq!(start_case("   "), "");
    }
}
