//! Canonical forms for unit names and codes.

/// Canonical comparison form of a unit name.
///
/// Lowercases, maps `-`, `_` and `/` to spaces, drops trailing
/// parenthesized qualifiers and collapses whitespace.
/// `normalize_name(normalize_name(x)) == normalize_name(x)` for every `x`.
pub fn normalize_name(raw: &str) -> String {
    split_name(raw).0
}

/// Canonical form of a secondary code: trimmed, uppercased, no inner whitespace.
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// A name split into its normalized base and its parenthesized qualifier.
///
/// `"Kawo (NISKNT04)"` parses to base `kawo`, qualifier `nisknt04`, which
/// keeps duplicate-resolved names apart during exact matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameKey {
    pub base: String,
    pub qualifier: Option<String>,
}

impl NameKey {
    pub fn parse(raw: &str) -> Self {
        let (base, qualifier) = split_name(raw);
        Self { base, qualifier }
    }

    /// Base and qualifier joined with a space.
    pub fn full(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{} {}", self.base, q),
            None => self.base.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.qualifier.is_none()
    }
}

fn split_name(raw: &str) -> (String, Option<String>) {
    let mut s = raw.to_lowercase().replace(['-', '_', '/'], " ");
    let mut qualifiers = Vec::new();
    loop {
        let trimmed = s.trim_end();
        if !trimmed.ends_with(')') {
            break;
        }
        let Some(open) = trimmed.rfind('(') else {
            break;
        };
        let inner = collapse(&trimmed[open + 1..trimmed.len() - 1]);
        if !inner.is_empty() {
            qualifiers.push(inner);
        }
        s.truncate(open);
    }
    qualifiers.reverse();
    let qualifier = if qualifiers.is_empty() {
        None
    } else {
        Some(qualifiers.join(" "))
    };
    (collapse(&s), qualifier)
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowercases_and_collapses() {
        assert_eq!(normalize_name("  Birnin   KUDU "), "birnin kudu");
    }

    #[test]
    fn separators_become_spaces() {
        assert_eq!(normalize_name("Dala-Gwale_North/East"), "dala gwale north east");
    }

    #[test]
    fn strips_parenthesized_suffix() {
        assert_eq!(normalize_name("Kawo (NISKNT04)"), "kawo");
        assert_eq!(normalize_name("Kawo (A) (B)"), "kawo");
        assert_eq!(normalize_name("Kawo()"), "kawo");
    }

    #[test]
    fn inner_parentheses_are_kept() {
        assert_eq!(normalize_name("Gwale (old) Town"), "gwale (old) town");
    }

    #[test]
    fn name_key_keeps_qualifier() {
        let key = NameKey::parse("Kawo (NIS-KNT04)");
        assert_eq!(key.base, "kawo");
        assert_eq!(key.qualifier.as_deref(), Some("nis knt04"));
        assert_eq!(key.full(), "kawo nis knt04");

        let plain = NameKey::parse("Kawo");
        assert_eq!(plain.qualifier, None);
        assert_eq!(plain.full(), "kawo");
    }

    #[test]
    fn code_normalization() {
        assert_eq!(normalize_code(" nis knt04 "), "NISKNT04");
        assert_eq!(normalize_code(""), "");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "\\PC{0,40}") {
            let once = normalize_name(&s);
            prop_assert_eq!(normalize_name(&once), once);
        }

        #[test]
        fn normalize_is_idempotent_with_parens(s in "[a-zA-Z _/()-]{0,30}") {
            let once = normalize_name(&s);
            prop_assert_eq!(normalize_name(&once), once);
        }

        #[test]
        fn code_normalization_is_idempotent(s in "\\PC{0,20}") {
            let once = normalize_code(&s);
            prop_assert_eq!(normalize_code(&once), once);
        }
    }
}
