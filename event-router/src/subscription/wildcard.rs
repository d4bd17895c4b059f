//! Unix-style `*` / `?` wildcards compiled to anchored regular expressions.

use regex::Regex;

/// Compiles a wildcard pattern. `*` matches any run of characters, `?` matches
/// one character and a backslash makes the next character literal.
pub fn to_regex(wildcard: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(wildcard.len() * 2 + 6);

    if case_insensitive {
        pattern.push_str("(?i)");
    }
    pattern.push('^');

    let mut chars = wildcard.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => push_literal(&mut pattern, escaped),
                None => pattern.push_str("\\\\"),
            },
            c if c.is_alphanumeric() || c.is_whitespace() => pattern.push(c),
            c => push_literal(&mut pattern, c),
        }
    }

    pattern.push('$');
    Regex::new(&pattern)
}

fn push_literal(pattern: &mut String, c: char) {
    let mut buffer = [0u8; 4];
    pattern.push_str(&regex::escape(c.encode_utf8(&mut buffer)));
}

#[cfg(test)]
mod tests {
    use super::to_regex;

    #[test]
    fn star_and_question_mark() {
        let regex = to_regex("hel*lo?", false).unwrap();

        assert!(regex.is_match("hello!"));
        assert!(regex.is_match("helxxxlo1"));
        assert!(!regex.is_match("hello"));
        assert!(!regex.is_match("xhello!"));
    }

    #[test]
    fn metacharacters_are_literal() {
        let regex = to_regex("a.b+(c)", false).unwrap();

        assert!(regex.is_match("a.b+(c)"));
        assert!(!regex.is_match("axbb(c)"));
    }

    #[test]
    fn escaped_star_is_literal() {
        let regex = to_regex("a\\*", false).unwrap();

        assert!(regex.is_match("a*"));
        assert!(!regex.is_match("ab"));
    }

    #[test]
    fn case_insensitive_host_patterns() {
        let regex = to_regex("*.EXAMPLE.com", true).unwrap();

        assert!(regex.is_match("host.example.COM"));
        assert!(!regex.is_match("example.com.au"));
    }
}
