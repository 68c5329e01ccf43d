//! Variable names: `::` separated segments, `::*` for whole lists.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

pub const SEPARATOR: &str = "::";
/// Suffix naming every element of a list.
pub const LIST_SUFFIX: &str = "::*";

/// Split a variable name into its segments.
///
/// ```
/// use skript_variables::split_variable_name;
///
/// assert_eq!(split_variable_name("homes::steve::1"), ["homes", "steve", "1"]);
/// assert_eq!(split_variable_name("homes::*"), ["homes", "*"]);
/// ```
#[must_use]
pub fn split_variable_name(name: &str) -> Vec<&str> {
    name.split(SEPARATOR).collect()
}

/// Whether `name` names a whole list (`list::*`).
#[must_use]
pub fn is_list(name: &str) -> bool {
    name.ends_with(LIST_SUFFIX) || name == "*"
}

/// A run of ASCII digits, split into leading zeros and the rest.
struct Digits {
    zeros: usize,
    significant: String,
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> Digits {
    let mut zeros = 0;
    let mut significant = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        if c == '0' && significant.is_empty() {
            zeros += 1;
        } else {
            significant.push(c);
        }
    }
    // "000" is the number zero written with two leading zeros.
    if significant.is_empty() {
        zeros -= 1;
        significant.push('0');
    }
    Digits { zeros, significant }
}

fn compare_digits(a: &Digits, b: &Digits) -> Ordering {
    a.significant
        .len()
        .cmp(&b.significant.len())
        .then_with(|| a.significant.cmp(&b.significant))
        // More leading zeros sort first: 01 < 1.
        .then_with(|| b.zeros.cmp(&a.zeros))
}

/// Order of list segments: runs of digits compare by numeric value, other
/// characters by code point. Equal only for identical strings.
///
/// ```
/// use std::cmp::Ordering;
/// use skript_variables::compare_segments;
///
/// assert_eq!(compare_segments("9", "10"), Ordering::Less);
/// assert_eq!(compare_segments("item2", "item10"), Ordering::Less);
/// assert_eq!(compare_segments("b", "a10"), Ordering::Greater);
/// ```
#[must_use]
pub fn compare_segments(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.chars().peekable(), b.chars().peekable());
    loop {
        let (ca, cb) = match (a.peek(), b.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&ca), Some(&cb)) => (ca, cb),
        };
        if ca.is_ascii_digit() && cb.is_ascii_digit() {
            let ordering = compare_digits(&take_digits(&mut a), &take_digits(&mut b));
            if ordering != Ordering::Equal {
                return ordering;
            }
        } else {
            if ca != cb {
                return ca.cmp(&cb);
            }
            a.next();
            b.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_order() {
        let mut segments = vec!["b", "10", "a", "9", "09", "1", "a2", "a10", "", "0", "00"];
        segments.sort_by(|a, b| compare_segments(a, b));
        assert_eq!(segments, ["", "00", "0", "1", "09", "9", "10", "a", "a2", "a10", "b"]);
    }

    #[test]
    fn test_equal_only_when_identical() {
        for (a, b) in [("01", "1"), ("a1b", "a01b"), ("x", "x0")] {
            assert_ne!(compare_segments(a, b), Ordering::Equal);
            assert_eq!(compare_segments(a, b), compare_segments(b, a).reverse());
        }
        assert_eq!(compare_segments("x01", "x01"), Ordering::Equal);
    }

    #[test]
    fn test_list_names() {
        assert!(is_list("a::*"));
        assert!(is_list("*"));
        assert!(!is_list("a::b"));
        assert!(!is_list("a*"));
    }
}
