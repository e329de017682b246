//! Value syntax of parameter sets.
//!
//! Values are stored as text and coerced on read. Lists use the literal
//! `[a, b, "c d"]` form.

use msss_shared::errors::{MsssError, MsssResult};

/// Remove one pair of matching surrounding quotes, if present.
pub(crate) fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Strip a trailing `#` comment that is not inside quotes.
pub(crate) fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '#') => return &line[..i],
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
    }
    line
}

pub(crate) fn parse_int(key: &str, value: &str) -> MsssResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| MsssError::type_mismatch(key, "integer", value))
}

pub(crate) fn parse_float(key: &str, value: &str) -> MsssResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| MsssError::type_mismatch(key, "float", value))
}

pub(crate) fn parse_bool(key: &str, value: &str) -> MsssResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        _ => Err(MsssError::type_mismatch(key, "boolean", value)),
    }
}

/// Parse a `[a, b, c]` literal into its elements.
pub fn parse_vector(key: &str, value: &str) -> MsssResult<Vec<String>> {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| MsssError::type_mismatch(key, "list", value))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in inner.chars() {
        match (quote, c) {
            (None, ',') => {
                items.push(unquote(current.trim()).to_string());
                current.clear();
                continue;
            }
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
        current.push(c);
    }
    if quote.is_some() {
        return Err(MsssError::type_mismatch(key, "list", value));
    }
    items.push(unquote(current.trim()).to_string());
    Ok(items)
}

/// Render a list in the literal syntax accepted by [`parse_vector`].
pub fn format_vector<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let quoted: Vec<String> = items
        .into_iter()
        .map(|item| format!("\"{}\"", item.as_ref()))
        .collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"a b\""), "a b");
        assert_eq!(unquote("'x'"), "x");
        assert_eq!(unquote("\"unbalanced'"), "\"unbalanced'");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn test_strip_comment_respects_quotes() {
        assert_eq!(strip_comment("a = 1 # note"), "a = 1 ");
        assert_eq!(strip_comment("a = \"x#y\" # note"), "a = \"x#y\" ");
        assert_eq!(strip_comment("# whole line"), "");
    }

    #[test]
    fn test_parse_vector() {
        assert_eq!(
            parse_vector("k", "[a, b ,c]").unwrap(),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            parse_vector("k", "['/data/x.MS', \"/data/y,z.MS\"]").unwrap(),
            vec!["/data/x.MS", "/data/y,z.MS"]
        );
        assert!(parse_vector("k", "[]").unwrap().is_empty());
        assert!(matches!(
            parse_vector("k", "a, b"),
            Err(MsssError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_format_vector_parses_back() {
        let items = vec!["/scratch/SB000.MS", "/scratch/SB001.MS"];
        let text = format_vector(&items);
        assert_eq!(text, "[\"/scratch/SB000.MS\", \"/scratch/SB001.MS\"]");
        assert_eq!(parse_vector("msin", &text).unwrap(), items);
    }

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(parse_int("n", " 42 ").unwrap(), 42);
        assert!(parse_int("n", "4.2").is_err());
        assert_eq!(parse_float("f", "1e3").unwrap(), 1000.0);
        assert!(parse_float("f", "abc").is_err());
        assert!(parse_bool("b", "Yes").unwrap());
        assert!(!parse_bool("b", "F").unwrap());
        assert!(parse_bool("b", "maybe").is_err());
    }
}
