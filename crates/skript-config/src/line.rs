//! Line-level helpers: comment splitting, escaping and whitespace descriptions.

/// Splits a raw line into `(value, comment)`.
///
/// `##` is the escape for a literal `#` and collapses to a single `#` in the
/// value. The first `#` that is not part of such a pair starts the comment,
/// which is returned including its leading `#`. Whitespace in front of the
/// comment stays in the value. Without a comment the second element is empty.
///
/// The scan is linear and never backtracks, so arbitrarily long lines are safe.
#[must_use]
pub fn split_line(line: &str) -> (String, String) {
    if !line.contains('#') {
        return (line.to_owned(), String::new());
    }

    let mut value = String::with_capacity(line.len());
    let mut chars = line.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        if c != '#' {
            value.push(c);
            continue;
        }
        if chars.next_if(|&(_, next)| next == '#').is_some() {
            value.push('#');
            continue;
        }
        let (_, comment) = line.split_at(index);
        return (value, comment.to_owned());
    }
    (value, String::new())
}

/// Escapes every `#` as `##` so the text survives [`split_line`].
#[must_use]
pub fn escape(text: &str) -> String {
    text.replace('#', "##")
}

/// Splits off the leading whitespace of `text`.
#[must_use]
pub fn split_indentation(text: &str) -> (&str, &str) {
    let rest = text.trim_start();
    text.split_at(text.len() - rest.len())
}

/// Describes a whitespace string for indentation error messages.
///
/// Uniform runs read as `"3 spaces"` or `"1 tab"`; anything else is dumped
/// with `->` for tabs, `_` for spaces and `?` for other whitespace.
#[must_use]
pub fn readable_whitespace(whitespace: &str) -> String {
    let count = whitespace.chars().count();
    let plural = if count == 1 { "" } else { "s" };
    if !whitespace.is_empty() && whitespace.chars().all(|c| c == ' ') {
        return format!("{count} space{plural}");
    }
    if !whitespace.is_empty() && whitespace.chars().all(|c| c == '\t') {
        return format!("{count} tab{plural}");
    }

    let mut dump = String::with_capacity(whitespace.len() * 2);
    for c in whitespace.chars() {
        match c {
            '\t' => dump.push_str("->"),
            ' ' => dump.push('_'),
            c if c.is_whitespace() => dump.push('?'),
            c => dump.push(c),
        }
    }
    format!("'{dump}' [-> = tab, _ = space, ? = other whitespace]")
}

/// Strips as many copies of `unit` from the front of `text` as possible.
pub(crate) fn strip_units<'a>(mut text: &'a str, unit: &str) -> &'a str {
    if unit.is_empty() {
        return text;
    }
    while let Some(rest) = text.strip_prefix(unit) {
        text = rest;
    }
    text
}

/// Returns true if `text` starts with a non-whitespace character.
pub(crate) fn starts_with_content(text: &str) -> bool {
    text.chars().next().is_some_and(|c| !c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(line: &str) -> (String, String) {
        split_line(line)
    }

    #[test]
    fn test_split_line_without_comment() {
        assert_eq!(split("abc"), ("abc".to_owned(), String::new()));
        assert_eq!(split(""), (String::new(), String::new()));
    }

    #[test]
    fn test_split_line_escapes() {
        let cases = [
            ("ab###", "ab#", "#"),
            ("######", "###", ""),
            ("#######", "###", "#"),
            ("#### # ####", "## ", "# ####"),
            ("##### ####", "##", "# ####"),
            ("#### #####", "## ##", "#"),
            ("#########", "####", "#"),
            ("a##b#c##d#e", "a#b", "#c##d#e"),
            (" a ## b # c ## d # e ", " a # b ", "# c ## d # e "),
            ("#ab", "", "#ab"),
        ];
        for (line, value, comment) in cases {
            assert_eq!(
                split(line),
                (value.to_owned(), comment.to_owned()),
                "splitting {line:?}"
            );
        }
    }

    #[test]
    fn test_escape_round_trip() {
        let text = "give ## to #player";
        let (value, comment) = split(&escape(text));
        assert_eq!(value, text);
        assert!(comment.is_empty());
    }

    #[test]
    fn test_readable_whitespace() {
        assert_eq!(readable_whitespace("   "), "3 spaces");
        assert_eq!(readable_whitespace(" "), "1 space");
        assert_eq!(readable_whitespace("\t"), "1 tab");
        assert_eq!(readable_whitespace("\t\t"), "2 tabs");
        assert_eq!(
            readable_whitespace("\t "),
            "'->_' [-> = tab, _ = space, ? = other whitespace]"
        );
    }

    #[test]
    fn test_strip_units() {
        assert_eq!(strip_units("\t\tx", "\t"), "x");
        assert_eq!(strip_units("   x", "  "), " x");
        assert_eq!(split_indentation("  a b "), ("  ", "a b "));
    }
}
