use std::collections::BTreeSet;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use regex::Regex;

/// The canonical placeholder vocabulary shared by the extraction and
/// construction paths. Downstream filling tools substitute a concrete
/// value for every occurrence of each name.
pub const CANONICAL_PLACEHOLDERS: [&str; 18] = [
    "associe_civilite",
    "associe_prenom",
    "associe_nom",
    "associe_date_naissance",
    "associe_lieu_naissance",
    "associe_adresse_complete",
    "forme_juridique_complete",
    "forme_juridique_sigle",
    "denomination",
    "adresse_siege_complete",
    "objet_social",
    "duree_societe",
    "capital_social_formate",
    "nombre_actions",
    "valeur_nominale_formate",
    "montant_libere_formate",
    "premier_exercice_fin",
    "date_signature",
];

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("token regex"));

/// All `{{name}}` tokens occurring in the given texts, deduplicated.
pub fn collect<'a>(texts: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for text in texts {
        for cap in TOKEN_RE.captures_iter(text) {
            found.insert(cap[1].to_string());
        }
    }
    found
}

pub fn contains_token(text: &str) -> bool {
    TOKEN_RE.is_match(text)
}

/// Check the template contract: every canonical name present, no unknown
/// name emitted.
pub fn verify_contract(found: &BTreeSet<String>) -> anyhow::Result<()> {
    let canonical: BTreeSet<&str> = CANONICAL_PLACEHOLDERS.iter().copied().collect();
    let missing: Vec<&str> = canonical
        .iter()
        .copied()
        .filter(|name| !found.contains(*name))
        .collect();
    if !missing.is_empty() {
        return Err(anyhow!("missing placeholders: {}", missing.join(", ")));
    }
    let unknown: Vec<&String> = found
        .iter()
        .filter(|name| !canonical.contains(name.as_str()))
        .collect();
    if !unknown.is_empty() {
        let names: Vec<&str> = unknown.iter().map(|s| s.as_str()).collect();
        return Err(anyhow!("unknown placeholders: {}", names.join(", ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{collect, verify_contract, CANONICAL_PLACEHOLDERS};

    #[test]
    fn collects_tokens_across_texts() {
        let found = collect([
            "La société a pour dénomination sociale : {{denomination}}",
            "Fait à {{adresse_siege_complete}} le {{date_signature}}",
        ]);
        assert_eq!(found.len(), 3);
        assert!(found.contains("denomination"));
        assert!(found.contains("date_signature"));
    }

    #[test]
    fn contract_rejects_missing_and_unknown_names() {
        let tokens: Vec<String> = CANONICAL_PLACEHOLDERS
            .iter()
            .map(|n| format!("{{{{{n}}}}}"))
            .collect();
        let mut found = collect(tokens.iter().map(|s| s.as_str()));
        verify_contract(&found).expect("full vocabulary passes");

        found.remove("denomination");
        assert!(verify_contract(&found).is_err());

        found.insert("denomination".to_string());
        found.insert("duree_annees".to_string());
        assert!(verify_contract(&found).is_err());
    }
}
