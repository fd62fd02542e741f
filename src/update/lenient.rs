//! Rewrites loosely formatted JSON into strict JSON for `serde_json`.
//!
//! Accepted on top of strict JSON: trailing and repeated commas, `;` as a
//! separator, `=` or `=>` between key and value, unquoted keys and values,
//! single-quoted strings and `/* */` comments. Line comments are not
//! supported because cached text arrives as whitespace-separated tokens.

use std::iter::Peekable;
use std::str::Chars;

pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut chars = input.chars().peekable();
    let mut pending_comma = false;
    // last structural character or value emitted, used to drop leading commas
    let mut last: Option<char> = None;

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                skip_block_comment(&mut chars);
            }
            ',' | ';' => pending_comma = true,
            '}' | ']' => {
                pending_comma = false;
                out.push(c);
                last = Some(c);
            }
            ':' => {
                pending_comma = false;
                out.push(':');
                last = Some(':');
            }
            '=' => {
                if chars.peek() == Some(&'>') {
                    chars.next();
                }
                pending_comma = false;
                out.push(':');
                last = Some(':');
            }
            _ => {
                if pending_comma && !matches!(last, None | Some('[') | Some('{') | Some(':')) {
                    out.push(',');
                }
                pending_comma = false;
                match c {
                    '{' | '[' => out.push(c),
                    '"' => copy_double_quoted(&mut chars, &mut out),
                    '\'' => convert_single_quoted(&mut chars, &mut out),
                    _ => {
                        let mut token = String::from(c);
                        while let Some(&next) = chars.peek() {
                            if next.is_whitespace() || "{}[]:,;=\"'".contains(next) {
                                break;
                            }
                            token.push(next);
                            chars.next();
                        }
                        push_bare(&token, &mut out);
                    }
                }
                last = Some(c);
            }
        }
    }

    out
}

fn skip_block_comment(chars: &mut Peekable<Chars>) {
    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'/') {
            chars.next();
            return;
        }
    }
}

fn copy_double_quoted(chars: &mut Peekable<Chars>, out: &mut String) {
    out.push('"');
    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '"' => return,
            _ => {}
        }
    }
    out.push('"');
}

fn convert_single_quoted(chars: &mut Peekable<Chars>, out: &mut String) {
    out.push('"');
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(escaped) => {
                    out.push('\\');
                    out.push(escaped);
                }
                None => {}
            },
            '\'' => break,
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out.push('"');
}

fn push_bare(token: &str, out: &mut String) {
    if matches!(token, "true" | "false" | "null") || is_json_number(token) {
        out.push_str(token);
        return;
    }
    out.push('"');
    for c in token.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

fn is_json_number(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    let (mantissa, exponent) = match digits.find(['e', 'E']) {
        Some(at) => (&digits[..at], Some(&digits[at + 1..])),
        None => (digits, None),
    };
    let (int, frac) = match mantissa.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (mantissa, None),
    };

    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let int_ok = all_digits(int) && (int == "0" || !int.starts_with('0'));
    let frac_ok = frac.map_or(true, all_digits);
    let exp_ok = exponent.map_or(true, |e| {
        all_digits(e.strip_prefix(['+', '-']).unwrap_or(e))
    });
    int_ok && frac_ok && exp_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse(input: &str) -> Value {
        serde_json::from_str(&normalize(input)).unwrap()
    }

    #[test]
    fn test_strict_json_is_unchanged_in_meaning() {
        let input = r#"[{"name": "14.2.1", "release": 1700000000, "status": "STABLE"}]"#;
        assert_eq!(
            parse(input),
            json!([{"name": "14.2.1", "release": 1700000000, "status": "STABLE"}])
        );
    }

    #[test]
    fn test_trailing_commas() {
        assert_eq!(parse("[{\"a\": 1,},]"), json!([{"a": 1}]));
        assert_eq!(parse("[1,,2,]"), json!([1, 2]));
    }

    #[test]
    fn test_unquoted_keys_and_values() {
        assert_eq!(
            parse("[{name: 14.2-beta, release: 100, status: stable}]"),
            json!([{"name": "14.2-beta", "release": 100, "status": "stable"}])
        );
    }

    #[test]
    fn test_single_quotes_semicolons_and_equals() {
        assert_eq!(
            parse("{'name' = 'it\\'s \"x\"'; release => 5}"),
            json!({"name": "it's \"x\"", "release": 5})
        );
    }

    #[test]
    fn test_block_comments() {
        assert_eq!(parse("/* feed */ [ 1 /* one */, 2 ]"), json!([1, 2]));
    }

    #[test]
    fn test_number_detection() {
        assert!(is_json_number("0"));
        assert!(is_json_number("-12.5e+3"));
        assert!(!is_json_number("01"));
        assert!(!is_json_number("14.2.1"));
        assert!(!is_json_number("NaN"));
        assert!(!is_json_number("1."));
    }
}
