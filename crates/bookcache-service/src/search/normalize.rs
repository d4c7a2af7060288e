/// Normalizes a search query so that equivalent spellings share one cache entry.
///
/// Whitespace is removed, ASCII letters are lowercased, and everything that is not a Hangul
/// syllable, an ASCII letter or a digit is dropped. A query consisting only of such characters
/// normalizes to the empty string.
pub fn normalize_query(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .filter(|&c| c.is_ascii_lowercase() || c.is_ascii_digit() || is_hangul_syllable(c))
        .collect()
}

fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("Spring Boot"), "springboot");
        assert_eq!(normalize_query("  JAVA\t8 "), "java8");
        assert_eq!(normalize_query("C++ / Rust!"), "crust");
        assert_eq!(normalize_query("자바 의 정석"), "자바의정석");
        assert_eq!(normalize_query("Café"), "caf");
    }

    #[test]
    fn test_blank_query() {
        assert_eq!(normalize_query(""), "");
        assert_eq!(normalize_query("   "), "");
        assert_eq!(normalize_query("?!-"), "");
    }
}
