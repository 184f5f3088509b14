/// Latin words need a separator; punctuation such as `/` or `-` joins directly.
pub(super) fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => {
            let word_char = |ch: char| ch.is_alphanumeric() || matches!(ch, '.' | '?' | ':');
            word_char(a) && b.is_alphanumeric()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_separated() {
        assert!(needs_space("Anzahl", "Zimmer"));
        assert!(needs_space("Max.", "Mietzins"));
        assert!(needs_space("Garage/Parkplatz?", "Ja"));
    }

    #[test]
    fn punctuation_joins_without_space() {
        assert!(!needs_space("PLZ", "/Ort"));
        assert!(!needs_space("Mobile", "-Nr."));
        assert!(!needs_space("", "Ort"));
    }
}
