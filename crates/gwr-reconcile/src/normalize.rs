//! Display-name canonicalization.

use serde::Serialize;
use tracing::warn;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::NormalizationAmbiguity;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedName {
    pub first: String,
    pub last: String,
    pub full: String,
}

impl NormalizedName {
    fn from_canonical(full: String) -> Self {
        let first = full.split_whitespace().next().unwrap_or_default().to_string();
        let last = full.split_whitespace().last().unwrap_or_default().to_string();
        Self { first, last, full }
    }
}

/// Entities seen in feed payloads. `&amp;` goes last so it is decoded once.
const HTML_ENTITIES: &[(&str, &str)] = &[
    ("&#039;", "'"),
    ("&#39;", "'"),
    ("&#x27;", "'"),
    ("&apos;", "'"),
    ("&quot;", "\""),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
];

fn decode_html_entities(s: &str) -> String {
    HTML_ENTITIES
        .iter()
        .fold(s.to_string(), |acc, (entity, replacement)| acc.replace(entity, replacement))
}

/// Decode HTML entities, strip diacritics and collapse whitespace.
pub fn clean_display_name(raw: &str) -> String {
    decode_html_entities(raw)
        .nfkd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonicalize `display_name`, reporting names with no stable form.
pub fn normalize_checked(
    display_name: &str,
    short_name_hint: Option<&str>,
) -> Result<NormalizedName, NormalizationAmbiguity> {
    let cleaned = clean_display_name(display_name);
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(NormalizationAmbiguity::EmptyName {
            raw: display_name.to_string(),
        });
    }

    let hint = short_name_hint
        .map(clean_display_name)
        .filter(|h| !h.is_empty());
    let hint_tokens: Vec<&str> = hint.as_deref().unwrap_or(&cleaned).split_whitespace().collect();
    let hint_first = hint_tokens.first().copied().unwrap_or(tokens[0]);
    let hint_last = hint_tokens.last().copied().unwrap_or(tokens[0]);

    let canonical = match tokens.len() {
        n if n > 2 => {
            if tokens[0] == hint_last {
                tokens[0].to_string()
            } else {
                format!("{} {}", tokens[0], hint_last)
            }
        }
        2 if tokens[0] == tokens[1] => {
            if hint.is_none() {
                return Err(NormalizationAmbiguity::RepeatedTokenWithoutHint {
                    raw: display_name.to_string(),
                });
            }
            format!("{hint_first} {hint_last}")
        }
        _ => cleaned.clone(),
    };

    Ok(NormalizedName::from_canonical(canonical))
}

/// Canonicalize `display_name`. Never fails: ambiguous names fall back to the
/// cleaned raw name.
pub fn normalize(display_name: &str, short_name_hint: Option<&str>) -> NormalizedName {
    match normalize_checked(display_name, short_name_hint) {
        Ok(name) => name,
        Err(ambiguity) => {
            warn!(%ambiguity, "keeping raw display name as canonical key");
            NormalizedName::from_canonical(clean_display_name(display_name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_distinct_tokens_are_identity() {
        for name in ["Mohamed Salah", "Harry Kane", "Son Heung-Min", "Kepa", "Dara O'Shea"] {
            assert_eq!(normalize(name, None).full, name);
            assert_eq!(normalize(name, Some("Whatever Hint")).full, name);
        }
    }

    #[test]
    fn long_name_uses_hint_surname() {
        let name = normalize("Bruno Miguel Borges Fernandes", Some("Fernandes"));
        assert_eq!(name.full, "Bruno Fernandes");
        assert_eq!(name.first, "Bruno");
        assert_eq!(name.last, "Fernandes");
    }

    #[test]
    fn long_name_matching_hint_collapses_to_first_token() {
        assert_eq!(normalize("Richarlison de Andrade", Some("Richarlison")).full, "Richarlison");
        assert_eq!(
            normalize("Thiago Alcántara do Nascimento", Some("Thiago")).full,
            "Thiago"
        );
    }

    #[test]
    fn long_name_without_hint_uses_own_last_token() {
        assert_eq!(normalize("Emile Smith Rowe", None).full, "Emile Rowe");
    }

    #[test]
    fn repeated_token_pair_is_replaced_by_hint() {
        assert_eq!(normalize("Fred Fred", Some("Frederico Santos")).full, "Frederico Santos");
        assert_eq!(normalize("Rodri Rodri", Some("Rodri")).full, "Rodri Rodri");
    }

    #[test]
    fn repeated_token_pair_without_hint_is_ambiguous() {
        let err = normalize_checked("Fred Fred", None).unwrap_err();
        assert_eq!(
            err,
            NormalizationAmbiguity::RepeatedTokenWithoutHint {
                raw: "Fred Fred".into()
            }
        );
        assert_eq!(normalize("Fred Fred", None).full, "Fred Fred");
    }

    #[test]
    fn empty_name_is_ambiguous() {
        assert!(matches!(
            normalize_checked("   ", Some("Hint")),
            Err(NormalizationAmbiguity::EmptyName { .. })
        ));
        assert_eq!(normalize("  ", None).full, "");
    }

    #[test]
    fn cleanup_strips_diacritics_and_entities() {
        assert_eq!(clean_display_name("Rúben  Dias"), "Ruben Dias");
        assert_eq!(clean_display_name("Dara O&#039;Shea"), "Dara O'Shea");
        assert_eq!(clean_display_name("Çaglar Söyüncü"), "Caglar Soyuncu");
        assert_eq!(clean_display_name("A &amp;#39; B"), "A &#39; B");
        assert_eq!(normalize("Nicolas Pépé", None).full, "Nicolas Pepe");
    }
}
