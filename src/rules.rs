use std::path::Path;

use anyhow::{anyhow, Context};
use serde::Deserialize;

/// Application priority of a literal rule. Tiers run Sentence → Phrase →
/// Token so a broad rule never consumes part of a longer, more specific
/// match. Within a tier, declaration order holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Sentence,
    Phrase,
    Token,
}

/// Literal substring match (never a regex) and its literal replacement,
/// generally embedding `{{name}}` tokens.
#[derive(Clone, Debug, Deserialize)]
pub struct Rule {
    #[serde(default = "default_tier")]
    pub tier: Tier,
    pub pattern: String,
    pub replacement: String,
}

fn default_tier() -> Tier {
    Tier::Token
}

/// Wholesale paragraph replacement: when a paragraph's trimmed text starts
/// with `prefix`, the whole paragraph becomes `output` (empty string or a
/// single placeholder) and no literal rule runs on it. Classifiers are
/// tried before literal rules, in declaration order.
#[derive(Clone, Debug, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuleSet {
    pub version: u32,
    #[serde(default, rename = "prefix")]
    pub prefixes: Vec<PrefixRule>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn from_toml_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read rules: {}", path.display()))?;
        let rules: RuleSet = toml::from_str(&text).context("parse rules (toml)")?;
        if rules.version != 1 {
            return Err(anyhow!(
                "unsupported rules version: {} (expected 1)",
                rules.version
            ));
        }
        rules.validate()?;
        Ok(rules)
    }

    /// Literal rules flattened by tier, declaration order within a tier.
    pub fn ordered_rules(&self) -> Vec<&Rule> {
        let mut ordered: Vec<&Rule> = self.rules.iter().collect();
        ordered.sort_by_key(|r| r.tier);
        ordered
    }

    /// Anti-collision invariant: a pattern applied earlier must never be a
    /// proper substring of a pattern applied in a later tier, otherwise the
    /// early rule would eat part of the longer match before it is tried.
    pub fn validate(&self) -> anyhow::Result<()> {
        let ordered = self.ordered_rules();
        for (i, early) in ordered.iter().enumerate() {
            for late in ordered.iter().skip(i + 1) {
                if late.tier > early.tier
                    && late.pattern != early.pattern
                    && late.pattern.contains(early.pattern.as_str())
                {
                    return Err(anyhow!(
                        "rule ordering collision: {:?} pattern {:?} is contained in {:?} pattern {:?}",
                        early.tier,
                        early.pattern,
                        late.tier,
                        late.pattern
                    ));
                }
            }
        }
        Ok(())
    }

    /// Built-in rule set keyed to the SAHEL TRANSPORT source statutes,
    /// emitting the canonical placeholder vocabulary.
    pub fn statuts_sas() -> Self {
        let prefix = |prefix: &str, output: &str| PrefixRule {
            prefix: prefix.to_string(),
            output: output.to_string(),
        };
        let rule = |tier: Tier, pattern: &str, replacement: &str| Rule {
            tier,
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        };

        let set = Self {
            version: 1,
            prefixes: vec![
                // The object clause is free text; collapse it to a single
                // placeholder and blank its boiler-plate continuations.
                prefix("La société a pour objet", "{{objet_social}}"),
                prefix("Territoires d'Outre-mer", ""),
                prefix("- Exportation de marchandises", ""),
                prefix("Et plus généralement", ""),
            ],
            rules: vec![
                rule(
                    Tier::Sentence,
                    "Monsieur DIAOU Mamadou Né le (date) à LIEU (FRANCE) Demeurant au ({{adresse_siege_complete}})",
                    "{{associe_civilite}} {{associe_prenom}} {{associe_nom}} né(e) le {{associe_date_naissance}} à {{associe_lieu_naissance}} demeurant {{associe_adresse_complete}}",
                ),
                rule(
                    Tier::Sentence,
                    "Monsieur DIAOU Mamadou Né (date) à Ville (FRANCE)",
                    "{{associe_civilite}} {{associe_prenom}} {{associe_nom}} né(e) le {{associe_date_naissance}} à {{associe_lieu_naissance}}",
                ),
                rule(
                    Tier::Sentence,
                    "Ces apports ont été libérés à hauteur de 2 700 euros",
                    "Ces apports ont été libérés à hauteur de {{montant_libere_formate}} euros",
                ),
                rule(
                    Tier::Sentence,
                    "Le capital social est fixé à la somme de (sommes) euros.",
                    "Le capital social est fixé à la somme de {{capital_social_formate}} euros.",
                ),
                rule(
                    Tier::Sentence,
                    "Il est divisé en 100 actions de 0 euros chacune de valeur nominale",
                    "Il est divisé en {{nombre_actions}} actions de {{valeur_nominale_formate}} euros chacune de valeur nominale",
                ),
                rule(
                    Tier::Sentence,
                    "Société par actions simplifiée unipersonnelle au capital de (o)euros Siège social : (adresse)",
                    "{{forme_juridique_complete}} au capital de {{capital_social_formate}} euros Siège social : {{adresse_siege_complete}}",
                ),
                rule(
                    Tier::Phrase,
                    "société par actions simplifiée unipersonnelle",
                    "{{forme_juridique_complete}}",
                ),
                rule(
                    Tier::Phrase,
                    "Monsieur DIAOU Mamadou",
                    "{{associe_civilite}} {{associe_prenom}} {{associe_nom}}",
                ),
                rule(
                    Tier::Phrase,
                    "Madame DIAOU Mamadou",
                    "{{associe_civilite}} {{associe_prenom}} {{associe_nom}}",
                ),
                rule(
                    Tier::Phrase,
                    "Demeurant au (ADRESSE)",
                    "Demeurant {{associe_adresse_complete}}",
                ),
                rule(
                    Tier::Phrase,
                    "31 décembre 2025",
                    "{{premier_exercice_fin}}",
                ),
                rule(
                    Tier::Phrase,
                    "Le 11 septembre 2025",
                    "Le {{date_signature}}",
                ),
                rule(Tier::Token, "SAHEL TRANSPORT", "{{denomination}}"),
                rule(
                    Tier::Token,
                    "DIAOU Mamadou",
                    "{{associe_prenom}} {{associe_nom}}",
                ),
                rule(Tier::Token, "99 ans", "{{duree_societe}} ans"),
                rule(
                    Tier::Token,
                    "2 700 euros",
                    "{{montant_libere_formate}} euros",
                ),
                rule(Tier::Token, "100 actions", "{{nombre_actions}} actions"),
                rule(
                    Tier::Token,
                    "0 euros chacune",
                    "{{valeur_nominale_formate}} euros chacune",
                ),
                rule(Tier::Token, "0 000 €", "{{capital_social_formate}} €"),
                rule(Tier::Token, "S.A.S.U", "{{forme_juridique_sigle}}"),
                rule(Tier::Token, "ADRESSE", "{{adresse_siege_complete}}"),
            ],
        };
        debug_assert!(set.validate().is_ok());
        set
    }
}

#[cfg(test)]
mod tests {
    use super::{PrefixRule, Rule, RuleSet, Tier};

    #[test]
    fn builtin_set_passes_validation() {
        RuleSet::statuts_sas().validate().expect("no collisions");
    }

    #[test]
    fn ordered_rules_apply_sentences_before_tokens() {
        let set = RuleSet::statuts_sas();
        let ordered = set.ordered_rules();
        let first_token = ordered
            .iter()
            .position(|r| r.tier == Tier::Token)
            .expect("has token rules");
        assert!(ordered[..first_token]
            .iter()
            .all(|r| r.tier != Tier::Token));
        assert_eq!(ordered[0].tier, Tier::Sentence);
    }

    #[test]
    fn validation_rejects_short_rule_ahead_of_containing_rule() {
        let set = RuleSet {
            version: 1,
            prefixes: Vec::new(),
            rules: vec![
                Rule {
                    tier: Tier::Phrase,
                    pattern: "DIAOU Mamadou".to_string(),
                    replacement: "{{associe_nom}}".to_string(),
                },
                Rule {
                    tier: Tier::Token,
                    pattern: "Monsieur DIAOU Mamadou".to_string(),
                    replacement: "{{associe_civilite}} {{associe_nom}}".to_string(),
                },
            ],
        };
        assert!(set.validate().is_err());
    }

    #[test]
    fn toml_rule_set_parses_with_defaults() {
        let toml_text = r#"
version = 1

[[prefix]]
prefix = "La société a pour objet"
output = "{{objet_social}}"

[[rule]]
tier = "sentence"
pattern = "Le capital social est fixé à la somme de (sommes) euros."
replacement = "Le capital social est fixé à la somme de {{capital_social_formate}} euros."

[[rule]]
pattern = "SAHEL TRANSPORT"
replacement = "{{denomination}}"
"#;
        let set: RuleSet = toml::from_str(toml_text).expect("parse");
        assert_eq!(set.version, 1);
        assert_eq!(set.prefixes.len(), 1);
        assert_eq!(set.rules.len(), 2);
        assert_eq!(set.rules[1].tier, Tier::Token);
        set.validate().expect("valid");
    }

    #[test]
    fn empty_prefix_output_defaults_to_blank() {
        let p: PrefixRule = toml::from_str(r#"prefix = "Et plus généralement""#).expect("parse");
        assert!(p.output.is_empty());
    }
}
