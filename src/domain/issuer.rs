//! Issuer display-name canonicalization

/// Canonical form of an issuer display name used in archive paths and the
/// catalog: uppercased, punctuation stripped, whitespace collapsed.
///
/// Path separators and other punctuation must never leak into directory
/// names, so anything that is not alphanumeric or whitespace is dropped.
pub fn canonical_issuer_name(raw: &str) -> String {
    let cleaned: String = raw
        .to_uppercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercases_and_collapses_whitespace() {
        assert_eq!(
            canonical_issuer_name("Empresa  Teste\tLtda"),
            "EMPRESA TESTE LTDA"
        );
    }

    #[test]
    fn strips_punctuation() {
        assert_eq!(
            canonical_issuer_name("Empresa Teste Ltda."),
            "EMPRESA TESTE LTDA"
        );
        assert_eq!(canonical_issuer_name("A/B - C & D"), "A B C D");
    }

    #[test]
    fn keeps_unicode_letters() {
        assert_eq!(canonical_issuer_name("Padaria São João"), "PADARIA SÃO JOÃO");
    }
}
