use crate::character::Gender;

pub const CHARACTER_PLACEHOLDER: &str = "{character}";
pub const NARRATIVE_PLACEHOLDER: &str = "{narrative}";

/// Narrative fragment of a preset, with an optional variant for two-person subjects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarrativeTemplate {
    pub singular: String,
    pub relational: Option<String>,
}

impl NarrativeTemplate {
    pub fn new(singular: impl Into<String>, relational: Option<String>) -> Self {
        NarrativeTemplate {
            singular: singular.into(),
            relational,
        }
    }

    /// Couples get the relational fragment when one exists; everyone else the singular one.
    pub fn template_for(&self, gender: Gender) -> &str {
        match (gender, self.relational.as_deref()) {
            (Gender::Couple, Some(relational)) => relational,
            _ => &self.singular,
        }
    }
}

pub fn render_prompt(template: &str, character: &str, narrative: &str) -> String {
    template
        .replace(CHARACTER_PLACEHOLDER, character)
        .replace(NARRATIVE_PLACEHOLDER, narrative)
}

/// Appends the identity suffix unless the prompt already asks for a matching face.
pub fn with_identity_terms(prompt: String, terms: &[String], suffix: &str) -> String {
    if suffix.is_empty() || terms.iter().any(|term| prompt.contains(term.as_str())) {
        return prompt;
    }
    format!("{prompt}, {suffix}")
}

pub fn with_suffix(prompt: String, suffix: &str) -> String {
    if suffix.is_empty() {
        return prompt;
    }
    format!("{prompt}, {suffix}")
}
