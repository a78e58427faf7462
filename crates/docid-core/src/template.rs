//! Format templates: `{{TOKEN}}` substitution and counter padding.
//!
//! Rendering is a single left-to-right pass. Substituted values are never
//! rescanned, so a value that itself looks like `{{TOKEN}}` is emitted as-is.
//! Tokens with no mapping are left verbatim.

use std::collections::BTreeMap;

use crate::error::TemplateError;

pub const COUNTER_TOKEN: &str = "{{COUNTER}}";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Token name (without braces, uppercase) to substituted value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMap {
    values: BTreeMap<String, String>,
}

impl TokenMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or override a token. The name may be given bare (`DEPT`) or
    /// braced (`{{dept}}`); it is stored uppercase without braces.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(token_name(name), value.into());
        self
    }

    /// Builder-style [`TokenMap::set`].
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Apply every entry of `overrides` on top of this map.
    pub fn extend<'a, I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (name, value) in overrides {
            self.set(name, value.clone());
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&token_name(name)).map(String::as_str)
    }
}

/// Canonical form of a token name: braces stripped, trimmed, uppercase.
#[must_use]
pub fn token_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix(OPEN)
        .and_then(|s| s.strip_suffix(CLOSE))
        .unwrap_or(trimmed);
    inner.trim().to_ascii_uppercase()
}

/// Left-pad a counter value with zeros to `width` digits. Values wider than
/// `width` are rendered in full.
#[must_use]
pub fn pad_counter(value: u64, width: usize) -> String {
    format!("{value:0width$}")
}

/// Render `template`, substituting every known `{{TOKEN}}`, then collapse
/// runs of `separator` into a single separator.
#[must_use]
pub fn render(template: &str, tokens: &TokenMap, separator: &str) -> String {
    let substituted = substitute(template, tokens);
    collapse_separators(&substituted, separator)
}

fn substitute(template: &str, tokens: &TokenMap) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            // No closing braces anywhere: the remainder is literal text.
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after_open[..end];
        if let Some(inner) = name.find(OPEN) {
            // `{{A{{COUNTER}}`: only the innermost pair is a token.
            out.push_str(&rest[start..start + OPEN.len() + inner]);
            rest = &after_open[inner..];
            continue;
        }
        match tokens.values.get(&name.trim().to_ascii_uppercase()) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]),
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

/// Replace every run of two or more consecutive `separator`s with one.
#[must_use]
pub fn collapse_separators(input: &str, separator: &str) -> String {
    if separator.is_empty() {
        return input.to_string();
    }
    let doubled = separator.repeat(2);
    if !input.contains(&doubled) {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut last_was_sep = false;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix(separator) {
            if !last_was_sep {
                out.push_str(separator);
            }
            last_was_sep = true;
            rest = tail;
        } else {
            let ch = rest.chars().next().map_or(1, char::len_utf8);
            out.push_str(&rest[..ch]);
            last_was_sep = false;
            rest = &rest[ch..];
        }
    }
    out
}

/// Check that a template is well formed and renders the counter.
///
/// # Errors
///
/// Returns [`TemplateError::UnterminatedToken`] for a `{{` with no matching
/// `}}`, and [`TemplateError::MissingCounterToken`] when `{{COUNTER}}` is
/// absent.
pub fn validate(template: &str) -> Result<(), TemplateError> {
    let mut offset = 0;
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(TemplateError::UnterminatedToken {
                template: template.to_string(),
                offset: offset + start,
            });
        };
        let consumed = start + OPEN.len() + end + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }
    if !template.contains(COUNTER_TOKEN) {
        return Err(TemplateError::MissingCounterToken(template.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_token_does_not_leave_double_separator() {
        let tokens = TokenMap::new()
            .with("PREFIX", "EMP")
            .with("DEPT", "")
            .with("COUNTER", "0007");
        assert_eq!(
            render("{{PREFIX}}/{{DEPT}}/{{COUNTER}}", &tokens, "/"),
            "EMP/0007"
        );
    }

    #[test]
    fn replaces_every_occurrence() {
        let tokens = TokenMap::new().with("PREFIX", "JOB").with("COUNTER", "12");
        assert_eq!(
            render("{{PREFIX}}-{{COUNTER}}-{{PREFIX}}", &tokens, "-"),
            "JOB-12-JOB"
        );
    }

    #[test]
    fn unknown_tokens_are_left_verbatim() {
        let tokens = TokenMap::new().with("COUNTER", "0001");
        assert_eq!(
            render("{{NOPE}}/{{COUNTER}}", &tokens, "/"),
            "{{NOPE}}/0001"
        );
    }

    #[test]
    fn values_are_inserted_literally() {
        let tokens = TokenMap::new()
            .with("DEPT", "{{COUNTER}}")
            .with("COMPANY", "a.*$1\\")
            .with("COUNTER", "9");
        assert_eq!(
            render("{{COMPANY}}-{{DEPT}}-{{COUNTER}}", &tokens, "-"),
            "a.*$1\\-{{COUNTER}}-9"
        );
    }

    #[test]
    fn token_names_are_normalized() {
        let mut tokens = TokenMap::new();
        tokens.set("{{dept}}", "IT");
        assert_eq!(tokens.get("DEPT"), Some("IT"));
        assert_eq!(render("{{DEPT}}", &tokens, "/"), "IT");
    }

    #[test]
    fn unterminated_token_is_literal_text() {
        let tokens = TokenMap::new().with("COUNTER", "1");
        assert_eq!(render("A{{COUNTER}}{{OOPS", &tokens, "/"), "A1{{OOPS");
    }

    #[test]
    fn nested_open_braces_resolve_innermost_token() {
        let tokens = TokenMap::new().with("COUNTER", "42");
        assert_eq!(render("{{A{{COUNTER}}", &tokens, "/"), "{{A42");
    }

    #[test]
    fn collapses_multi_character_separators() {
        assert_eq!(collapse_separators("A--B----C", "--"), "A--B--C");
        assert_eq!(collapse_separators("A//B", ""), "A//B");
        assert_eq!(collapse_separators("É//ü", "/"), "É/ü");
    }

    #[test]
    fn pads_to_width() {
        assert_eq!(pad_counter(7, 4), "0007");
        assert_eq!(pad_counter(10001, 4), "10001");
        assert_eq!(pad_counter(0, 1), "0");
    }

    #[test]
    fn validate_requires_counter_and_closed_tokens() {
        assert!(validate("{{PREFIX}}{{COUNTER}}").is_ok());
        assert_eq!(
            validate("{{PREFIX}}"),
            Err(TemplateError::MissingCounterToken("{{PREFIX}}".to_string()))
        );
        assert!(matches!(
            validate("{{COUNTER}}/{{YEAR"),
            Err(TemplateError::UnterminatedToken { offset: 12, .. })
        ));
    }

    proptest! {
        #[test]
        fn padded_counter_parses_back(value in 0u64..10_000_000_000, width in 1usize..=10) {
            let padded = pad_counter(value, width);
            prop_assert!(padded.len() >= width);
            prop_assert_eq!(padded.parse::<u64>().unwrap(), value);
        }

        #[test]
        fn rendered_output_never_contains_doubled_separator(
            parts in proptest::collection::vec("[A-Z]{0,3}", 1..6)
        ) {
            let mut tokens = TokenMap::new();
            let mut template = String::new();
            for (i, part) in parts.iter().enumerate() {
                let name = format!("T{i}");
                tokens.set(&name, part.clone());
                template.push_str(&format!("{{{{{name}}}}}/"));
            }
            template.push_str("{{COUNTER}}");
            tokens.set("COUNTER", "0001");

            let out = render(&template, &tokens, "/");
            prop_assert!(!out.contains("//"), "{}", out);
            prop_assert!(out.ends_with("0001"));
        }
    }
}
