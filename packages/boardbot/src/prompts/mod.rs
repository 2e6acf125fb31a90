//! Prompt catalogue.
//!
//! Prompts are data: a name, a system template, a user template and the set
//! of variables the caller must supply. [`PromptCatalogue::get`] refuses to
//! render unless the supplied variables match the declared set exactly, so a
//! wiring mistake fails before any model call.

mod templates;

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::error::PromptError;

/// A named (system, user) template pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub system: &'static str,
    pub user: &'static str,
    pub variables: &'static [&'static str],
}

impl PromptTemplate {
    pub const fn new(
        name: &'static str,
        system: &'static str,
        user: &'static str,
        variables: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            system,
            user,
            variables,
        }
    }
}

/// Rendered prompt ready for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub name: &'static str,
    pub system: String,
    pub user: String,
}

/// Registry of prompt templates keyed by name.
#[derive(Debug, Clone)]
pub struct PromptCatalogue {
    prompts: IndexMap<&'static str, PromptTemplate>,
}

impl Default for PromptCatalogue {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptCatalogue {
    /// The standard prompt set.
    pub fn new() -> Self {
        Self::from_templates(templates::standard_prompts())
    }

    pub fn from_templates(templates: impl IntoIterator<Item = PromptTemplate>) -> Self {
        Self {
            prompts: templates.into_iter().map(|t| (t.name, t)).collect(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.prompts.keys().copied()
    }

    pub fn template(&self, name: &str) -> Option<&PromptTemplate> {
        self.prompts.get(name)
    }

    /// Check every template references exactly its declared variables.
    pub fn validate(&self) -> Result<(), PromptError> {
        for template in self.prompts.values() {
            let mut referenced = BTreeSet::new();
            for text in [template.system, template.user] {
                for name in placeholders(text).map_err(|reason| PromptError::Template {
                    prompt: template.name.to_string(),
                    reason,
                })? {
                    if !is_preamble(&name) {
                        referenced.insert(name);
                    }
                }
            }
            let declared: BTreeSet<String> =
                template.variables.iter().map(|v| v.to_string()).collect();
            if referenced != declared {
                return Err(PromptError::Template {
                    prompt: template.name.to_string(),
                    reason: format!(
                        "declares {:?} but references {:?}",
                        declared, referenced
                    ),
                });
            }
        }
        Ok(())
    }

    /// Render `name` with `vars`. The supplied keys must equal the declared
    /// variable set.
    pub fn get(&self, name: &str, vars: &[(&str, &str)]) -> Result<RenderedPrompt, PromptError> {
        let template = self
            .prompts
            .get(name)
            .ok_or_else(|| PromptError::UnknownPrompt(name.to_string()))?;

        let supplied: BTreeSet<&str> = vars.iter().map(|(k, _)| *k).collect();
        let declared: BTreeSet<&str> = template.variables.iter().copied().collect();

        let missing: Vec<String> = declared.difference(&supplied).map(|s| s.to_string()).collect();
        if !missing.is_empty() {
            return Err(PromptError::MissingVariables {
                prompt: name.to_string(),
                missing,
            });
        }
        let unexpected: Vec<String> = supplied.difference(&declared).map(|s| s.to_string()).collect();
        if !unexpected.is_empty() {
            return Err(PromptError::UnexpectedVariables {
                prompt: name.to_string(),
                unexpected,
            });
        }

        let lookup = |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .or_else(|| preamble(key))
        };
        let render = |text: &str| {
            substitute(text, &lookup).map_err(|reason| PromptError::Template {
                prompt: name.to_string(),
                reason,
            })
        };

        Ok(RenderedPrompt {
            name: template.name,
            system: render(template.system)?,
            user: render(template.user)?,
        })
    }
}

fn preamble(name: &str) -> Option<&'static str> {
    templates::PREAMBLES
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, text)| *text)
}

fn is_preamble(name: &str) -> bool {
    preamble(name).is_some()
}

enum Piece<'a> {
    Text(&'a str),
    Var(&'a str),
}

/// Split a template into literal text and `{var}` references.
/// `{{` and `}}` are literal braces; any other lone brace is an error.
fn parse(template: &str) -> Result<Vec<Piece<'_>>, String> {
    let mut pieces = Vec::new();
    let bytes = template.as_bytes();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                pieces.push(Piece::Text(&template[literal_start..=i]));
                i += 2;
                literal_start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                pieces.push(Piece::Text(&template[literal_start..=i]));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let close = template[i + 1..]
                    .find('}')
                    .map(|offset| i + 1 + offset)
                    .ok_or_else(|| format!("unclosed '{{' at byte {i}"))?;
                let name = &template[i + 1..close];
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(format!("invalid placeholder '{{{name}}}' at byte {i}"));
                }
                pieces.push(Piece::Text(&template[literal_start..i]));
                pieces.push(Piece::Var(name));
                i = close + 1;
                literal_start = i;
            }
            b'}' => return Err(format!("unmatched '}}' at byte {i}")),
            _ => i += 1,
        }
    }
    pieces.push(Piece::Text(&template[literal_start..]));
    Ok(pieces)
}

fn placeholders(template: &str) -> Result<Vec<String>, String> {
    Ok(parse(template)?
        .into_iter()
        .filter_map(|p| match p {
            Piece::Var(name) => Some(name.to_string()),
            Piece::Text(_) => None,
        })
        .collect())
}

fn substitute<'v>(
    template: &str,
    lookup: impl Fn(&str) -> Option<&'v str>,
) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    for piece in parse(template)? {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Var(name) => {
                let value = lookup(name).ok_or_else(|| format!("no value for '{name}'"))?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalogue_is_valid() {
        let catalogue = PromptCatalogue::new();
        catalogue.validate().unwrap();
        assert_eq!(catalogue.names().count(), 12);
        for name in [
            "route_classification",
            "query_decompose",
            "product_reranking",
            "semantic_search_query",
            "chitchat",
            "low_confidence",
            "vague_intent_response",
            "clear_intent_response",
            "data_extraction",
            "simple_data_extraction",
            "missing_feature_extraction",
            "low_confidence_refinement",
        ] {
            assert!(catalogue.template(name).is_some(), "{name}");
        }
    }

    #[test]
    fn test_render_substitutes_and_unescapes() {
        let catalogue = PromptCatalogue::new();
        let prompt = catalogue
            .get("route_classification", &[("query", "Who will win the election?")])
            .unwrap();
        assert_eq!(prompt.user, "User message: Who will win the election?");
        assert!(prompt.system.contains(r#"{"category": "<category>""#));
        assert!(prompt.system.contains("Reply with a single valid JSON object"));
        assert!(!prompt.system.contains("{processing_base}"));
    }

    #[test]
    fn test_values_are_not_reparsed() {
        let catalogue = PromptCatalogue::new();
        let prompt = catalogue
            .get("chitchat", &[("query", "what does {this} mean}")])
            .unwrap();
        assert_eq!(prompt.user, "User message: what does {this} mean}");
    }

    #[test]
    fn test_variable_mismatch_is_rejected() {
        let catalogue = PromptCatalogue::new();
        assert_eq!(
            catalogue.get("chitchat", &[]),
            Err(PromptError::MissingVariables {
                prompt: "chitchat".into(),
                missing: vec!["query".into()],
            })
        );
        assert_eq!(
            catalogue.get("chitchat", &[("query", "hi"), ("mood", "happy")]),
            Err(PromptError::UnexpectedVariables {
                prompt: "chitchat".into(),
                unexpected: vec!["mood".into()],
            })
        );
        assert_eq!(
            catalogue.get("weather", &[]),
            Err(PromptError::UnknownPrompt("weather".into()))
        );
    }

    #[test]
    fn test_validate_catches_undeclared_placeholder() {
        let catalogue = PromptCatalogue::from_templates([PromptTemplate::new(
            "broken",
            "Hello {name}",
            "Data: {payload}",
            &["name"],
        )]);
        assert!(matches!(catalogue.validate(), Err(PromptError::Template { .. })));
    }

    #[test]
    fn test_lone_brace_is_malformed() {
        assert!(placeholders("{\"a\": 1}").is_err());
        assert!(placeholders("oops }").is_err());
        assert_eq!(placeholders("{{literal}} {var}").unwrap(), vec!["var"]);
    }
}
