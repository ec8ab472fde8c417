//! Trigger rule matching and affirmative reply detection

use disparo_storage::models::{RecoveryRule, TriggerType};
use regex::RegexBuilder;
use tracing::warn;

/// Replies that end every active recovery flow for the contact
pub const AFFIRMATIVE_KEYWORDS: &[&str] = &[
    "sim",
    "quero",
    "ok",
    "pode ser",
    "aceito",
    "claro",
    "yes",
    "confirmo",
    "tenho interesse",
];

/// Case-insensitive match of `text` against one rule. Surrounding
/// whitespace is ignored; an invalid regex never matches.
pub fn matches(text: &str, rule: &RecoveryRule) -> bool {
    let Some(trigger_type) = rule.trigger_type_enum() else {
        warn!("Rule {} has unknown trigger type '{}'", rule.id, rule.trigger_type);
        return false;
    };

    let text = text.trim().to_lowercase();
    let trigger = rule.trigger_text.trim().to_lowercase();

    match trigger_type {
        TriggerType::Contains => text.contains(&trigger),
        TriggerType::Exact => text == trigger,
        TriggerType::StartsWith => text.starts_with(&trigger),
        TriggerType::EndsWith => text.ends_with(&trigger),
        TriggerType::Regex => match RegexBuilder::new(&rule.trigger_text)
            .case_insensitive(true)
            .build()
        {
            Ok(re) => re.is_match(&text),
            Err(e) => {
                warn!("Rule {} has an invalid pattern: {}", rule.id, e);
                false
            }
        },
    }
}

/// First rule, in the given order, that matches `text`
pub fn first_match<'a>(text: &str, rules: &'a [RecoveryRule]) -> Option<&'a RecoveryRule> {
    rules.iter().find(|rule| matches(text, rule))
}

/// Whether `text` contains an affirmative keyword as whole words
pub fn is_affirmative(text: &str) -> bool {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    AFFIRMATIVE_KEYWORDS.iter().any(|keyword| {
        let phrase: Vec<&str> = keyword.split_whitespace().collect();
        words.windows(phrase.len()).any(|window| window == phrase.as_slice())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_match_strategies() {
        let cases = [
            ("contains", "interessado", "Estou INTERESSADO no plano", true),
            ("contains", "interessado", "sem interesse", false),
            ("exact", "preço", "  Preço ", true),
            ("exact", "preço", "qual o preço", false),
            ("starts_with", "oi", "Oi, tudo bem?", true),
            ("starts_with", "oi", "tudo bem? oi", false),
            ("ends_with", "obrigado", "ok, obrigado", true),
            ("ends_with", "obrigado", "obrigado pelo contato", false),
            ("regex", r"^quanto (custa|é)", "Quanto custa o plano?", true),
            ("regex", r"^quanto (custa|é)", "me diga quanto custa", false),
        ];

        for (kind, trigger, text, expected) in cases {
            let rule = testing::rule(trigger, kind, 60, 3);
            assert_eq!(matches(text, &rule), expected, "{kind} {trigger:?} vs {text:?}");
        }
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let rule = testing::rule("(unclosed", "regex", 60, 3);
        assert!(!matches("(unclosed", &rule));
    }

    #[test]
    fn test_unknown_trigger_type_never_matches() {
        let rule = testing::rule("oi", "fuzzy", 60, 3);
        assert!(!matches("oi", &rule));
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            testing::rule("preço", "contains", 60, 3),
            testing::rule("interessado", "contains", 60, 3),
            testing::rule("preço", "contains", 30, 1),
        ];

        let hit = first_match("interessado no preço", &rules).unwrap();
        assert_eq!(hit.id, rules[0].id);
        assert!(first_match("bom dia", &rules).is_none());
    }

    #[test]
    fn test_affirmative_detection() {
        assert!(is_affirmative("Sim!"));
        assert!(is_affirmative("ok, pode mandar"));
        assert!(is_affirmative("Pode ser amanhã"));
        assert!(is_affirmative("eu TENHO interesse sim"));

        // Whole words only
        assert!(!is_affirmative("simulação"));
        assert!(!is_affirmative("lookup"));
        assert!(!is_affirmative("pode me ligar depois"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn test_affirmative_word_boundaries() {
        // Punctuation and case around a keyword still count
        assert!(is_affirmative("OK."));
        assert!(is_affirmative("...sim"));
        assert!(is_affirmative("claro!!!"));
        assert!(is_affirmative("quero: pode ser"));

        // Elongated or embedded forms do not
        assert!(!is_affirmative("okay"));
        assert!(!is_affirmative("simmm"));
        assert!(!is_affirmative("queroo"));
        assert!(!is_affirmative("podeser"));
        assert!(!is_affirmative("esclarecido"));
    }
}
