//! Minimal `{variable}` prompt templates.
//!
//! Formatting never fails on missing variables - they render as the empty
//! string, matching how the agents assemble partially-known context. Unknown
//! input keys are ignored.

use std::collections::HashMap;

use crate::core::error::{Error, Result};

/// A prompt template with `{variable}` placeholders.
///
/// Literal braces are written `{{` and `}}`.
#[derive(Clone, Debug)]
pub struct PromptTemplate {
    template: String,
    variables: Vec<String>,
}

impl PromptTemplate {
    /// Parse a template string, recording the placeholder names it uses.
    pub fn from_template(template: &str) -> Result<Self> {
        let mut variables = Vec::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if chars.peek() == Some(&'{') {
                        chars.next();
                        continue;
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) if ch.is_alphanumeric() || ch == '_' => name.push(ch),
                            Some(ch) => {
                                return Err(Error::Prompt(format!(
                                    "invalid character '{ch}' in placeholder"
                                )))
                            }
                            None => {
                                return Err(Error::Prompt("unterminated placeholder".to_string()))
                            }
                        }
                    }
                    if name.is_empty() {
                        return Err(Error::Prompt("empty placeholder".to_string()));
                    }
                    if !variables.contains(&name) {
                        variables.push(name);
                    }
                }
                '}' => {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                    }
                }
                _ => {}
            }
        }
        Ok(Self {
            template: template.to_string(),
            variables,
        })
    }

    /// Placeholder names referenced by the template, in first-use order.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Substitute placeholders with the given inputs.
    ///
    /// Missing variables render as empty strings; extra inputs are ignored.
    #[must_use]
    pub fn format(&self, inputs: &HashMap<String, String>) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut chars = self.template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if chars.peek() == Some(&'{') {
                        chars.next();
                        out.push('{');
                        continue;
                    }
                    let mut name = String::new();
                    for ch in chars.by_ref() {
                        if ch == '}' {
                            break;
                        }
                        name.push(ch);
                    }
                    if let Some(value) = inputs.get(&name) {
                        out.push_str(value);
                    }
                }
                '}' => {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                    }
                    out.push('}');
                }
                _ => out.push(c),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_basic_substitution() {
        let prompt = PromptTemplate::from_template("Explain {topic} at {level} level").unwrap();
        assert_eq!(prompt.variables(), ["topic", "level"]);
        let text = prompt.format(&inputs(&[("topic", "limits"), ("level", "beginner")]));
        assert_eq!(text, "Explain limits at beginner level");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let prompt = PromptTemplate::from_template("Hello {name}!").unwrap();
        assert_eq!(prompt.format(&HashMap::new()), "Hello !");
    }

    #[test]
    fn test_extra_inputs_ignored() {
        let prompt = PromptTemplate::from_template("{a}").unwrap();
        let text = prompt.format(&inputs(&[("a", "x"), ("b", "y")]));
        assert_eq!(text, "x");
    }

    #[test]
    fn test_escaped_braces() {
        let prompt = PromptTemplate::from_template("{{\"key\": \"{v}\"}}").unwrap();
        assert_eq!(prompt.variables(), ["v"]);
        assert_eq!(prompt.format(&inputs(&[("v", "1")])), "{\"key\": \"1\"}");
    }

    #[test]
    fn test_unterminated_placeholder_rejected() {
        assert!(PromptTemplate::from_template("broken {oops").is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Formatting is deterministic: same inputs, same output.
            #[test]
            fn prop_format_deterministic(value in "[^{}]{0,60}") {
                let prompt = PromptTemplate::from_template("Value: {x}").unwrap();
                let ins = inputs(&[("x", value.as_str())]);
                prop_assert_eq!(prompt.format(&ins), prompt.format(&ins));
            }

            /// Every provided value appears verbatim in the output.
            #[test]
            fn prop_values_appear(value in "[^{}]{1,60}") {
                let prompt = PromptTemplate::from_template("before {x} after").unwrap();
                let text = prompt.format(&inputs(&[("x", value.as_str())]));
                prop_assert!(text.contains(&value));
            }
        }
    }
}
