//! Prompt templating for expanded query terms.

use phai_core::PROMPT_PLACEHOLDER;
use std::collections::HashSet;

/// One text sent to the embedding provider for a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Prompt text
    pub text: String,
    /// Whether the prompt was built from the raw phrase rather than an expanded term
    pub primary: bool,
}

/// Descriptive templates wrapped around every term
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: Vec<String>,
    max_prompts: usize,
}

impl PromptTemplates {
    /// Create templates; each should contain the `{}` placeholder
    pub fn new(templates: Vec<String>, max_prompts: usize) -> Self {
        Self {
            templates,
            max_prompts: max_prompts.max(1),
        }
    }

    /// Compose `terms x templates` in order, de-duplicated and capped.
    ///
    /// The first term is the raw phrase; its prompts are marked primary.
    pub fn compose(&self, terms: &[String]) -> Vec<Prompt> {
        let mut seen = HashSet::new();
        let mut prompts = Vec::new();

        for (index, term) in terms.iter().enumerate() {
            for template in &self.templates {
                if prompts.len() >= self.max_prompts {
                    return prompts;
                }
                let text = template.replace(PROMPT_PLACEHOLDER, term);
                if seen.insert(text.clone()) {
                    prompts.push(Prompt {
                        text,
                        primary: index == 0,
                    });
                }
            }
        }

        if prompts.is_empty()
            && let Some(phrase) = terms.first()
        {
            prompts.push(Prompt {
                text: phrase.clone(),
                primary: true,
            });
        }
        prompts
    }
}
