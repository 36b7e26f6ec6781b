//! Naming convention utilities.
//!
//! Controller names are identifiers (`myBlog`, `UserAccount2`, `order_items`)
//! while URL segments are kebab-case (`my-blog`, `user-account-2`,
//! `order-items`). The word splitting below follows the usual identifier rules:
//! separators, lower-to-upper transitions, letter/digit transitions and the end
//! of an acronym (`HTTPServer` -> `http`, `server`).

/// Splits an identifier into its words.
///
/// # Examples
///
/// ```
/// use bex_core::naming::split_words;
///
/// assert_eq!(split_words("myController2"), vec!["my", "Controller", "2"]);
/// assert_eq!(split_words("HTTPServer"), vec!["HTTP", "Server"]);
/// assert_eq!(split_words("order_items"), vec!["order", "items"]);
/// ```
pub fn split_words(s: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = s.char_indices().collect();
    let mut words = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &(pos, ch)) in chars.iter().enumerate() {
        if !ch.is_alphanumeric() {
            if let Some(begin) = start.take() {
                words.push(&s[begin..pos]);
            }
            continue;
        }

        if let Some(begin) = start {
            let prev = chars[i - 1].1;
            let next = chars.get(i + 1).map(|&(_, c)| c);
            if is_word_boundary(prev, ch, next) {
                words.push(&s[begin..pos]);
                start = Some(pos);
            }
        } else {
            start = Some(pos);
        }
    }

    if let Some(begin) = start {
        words.push(&s[begin..]);
    }

    words
}

fn is_word_boundary(prev: char, current: char, next: Option<char>) -> bool {
    if prev.is_lowercase() && current.is_uppercase() {
        return true;
    }
    if prev.is_numeric() != current.is_numeric() {
        return true;
    }
    // "HTTPServer": the 'S' starts a new word because it is followed by lowercase
    prev.is_uppercase() && current.is_uppercase() && next.is_some_and(|c| c.is_lowercase())
}

/// Converts an identifier to kebab-case.
///
/// This is how controller names become URL resource segments.
///
/// # Examples
///
/// ```
/// use bex_core::naming::to_kebab_case;
///
/// assert_eq!(to_kebab_case("myController2"), "my-controller-2");
/// assert_eq!(to_kebab_case("UserService"), "user-service");
/// assert_eq!(to_kebab_case("my-controller-2"), "my-controller-2");
/// ```
pub fn to_kebab_case(s: &str) -> String {
    split_words(s)
        .into_iter()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_kebab_case() {
        assert_eq!(to_kebab_case("myBlog"), "my-blog");
        assert_eq!(to_kebab_case("myController1"), "my-controller-1");
        assert_eq!(to_kebab_case("DatabaseConnectionPool"), "database-connection-pool");
        assert_eq!(to_kebab_case("HTTPServer"), "http-server");
        assert_eq!(to_kebab_case("order_items"), "order-items");
        assert_eq!(to_kebab_case("  spaced  out "), "spaced-out");
        assert_eq!(to_kebab_case(""), "");
    }

    #[test]
    fn test_kebab_case_is_idempotent() {
        for name in ["my-blog", "my-controller-2", "users"] {
            assert_eq!(to_kebab_case(name), name);
        }
    }

    #[test]
    fn test_split_words_digits() {
        assert_eq!(split_words("v2Api"), vec!["v", "2", "Api"]);
        assert_eq!(split_words("item42"), vec!["item", "42"]);
    }
}
