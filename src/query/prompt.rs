//! The fixed legal-research prompt.

const LEGAL_TEMPLATE: &str = r#"You are an AI Legal Research Assistant. Provide factual, context-based legal information ONLY.

STRICT RULES:
1. Use ONLY the information provided in the context. No assumptions.
2. If the answer is not present in the context, reply:
   "The provided documents do not contain enough information to answer this."
3. Do NOT create legal advice or interpretations.
4. Cite context lines concisely when possible.
5. Keep answers clear, structured, and professional.

------------------------------------
QUESTION:
{question}

CONTEXT:
{context}

------------------------------------
ANSWER:
"#;

/// Static prompt with `{question}` and `{context}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// The legal research assistant prompt: answer only from context, no legal advice.
    pub fn legal() -> Self {
        Self {
            template: LEGAL_TEMPLATE.to_string(),
        }
    }

    /// Custom template; placeholders that are absent are simply not filled.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute the placeholders. The context is inserted last so text inside the question
    /// that happens to look like `{context}` is left alone.
    pub fn render(&self, question: &str, context: &str) -> String {
        match self.template.split_once("{question}") {
            Some((before, after)) => format!(
                "{}{question}{}",
                before.replace("{context}", context),
                after.replace("{context}", context)
            ),
            None => self.template.replace("{context}", context),
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::legal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_prompt_contains_rules_and_slots() {
        let rendered = PromptTemplate::legal().render("Is torture prohibited?", "Article 5 ...");
        assert!(rendered.contains("QUESTION:\nIs torture prohibited?\n"));
        assert!(rendered.contains("CONTEXT:\nArticle 5 ...\n"));
        assert!(rendered.contains("Do NOT create legal advice"));
        assert!(rendered.trim_end().ends_with("ANSWER:"));
        assert!(!rendered.contains("{question}") && !rendered.contains("{context}"));
    }

    #[test]
    fn placeholders_in_user_text_are_not_expanded() {
        let template = PromptTemplate::new("Q: {question} C: {context}");
        assert_eq!(
            template.render("what is {context}?", "ctx"),
            "Q: what is {context}? C: ctx"
        );
    }
}
