//! YAML catalog of personas and presets.
//!
//! The catalog is plain data: swapping persona wording or adding a style is a
//! configuration change. Everything is validated once at load time so that
//! rendering a preset never meets a missing persona or a malformed table.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::character::{CharacterMatrix, Persona, PersonaBook};
use crate::diffusion::control::{StructureWeights, DEFAULT_EDGE_OFFSET};
use crate::error::{StyleError, StyleResult};
use crate::style::template::{NarrativeTemplate, CHARACTER_PLACEHOLDER, NARRATIVE_PLACEHOLDER};

pub const BUILTIN_CATALOG: &str = include_str!("../../assets/catalog.yaml");

#[derive(Debug, Clone, Copy, Deserialize)]
struct WeightsEntry {
    depth: f64,
    pose: f64,
    edge: f64,
}

impl From<WeightsEntry> for StructureWeights {
    fn from(entry: WeightsEntry) -> Self {
        StructureWeights::new(entry.depth, entry.pose, entry.edge)
    }
}

fn default_true() -> bool {
    true
}

fn default_identity_scale() -> WeightsEntry {
    WeightsEntry {
        depth: 0.6,
        pose: 0.6,
        edge: 0.5,
    }
}

fn default_edge_offset() -> f64 {
    DEFAULT_EDGE_OFFSET
}

#[derive(Debug, Clone, Deserialize)]
struct DefaultsEntry {
    model: String,
    #[serde(default)]
    negative_prompt: Option<String>,
    #[serde(default)]
    denoising_strength: Option<f64>,
    #[serde(default)]
    cfg_scale: Option<f64>,
    #[serde(default)]
    steps: Option<u32>,
    #[serde(default)]
    resolution: Option<u32>,
    #[serde(default)]
    sampler: Option<String>,
    #[serde(default = "default_true")]
    preserve_identity: bool,
    #[serde(default = "default_identity_scale")]
    identity_scale: WeightsEntry,
    #[serde(default = "default_edge_offset")]
    edge_offset: f64,
    #[serde(default)]
    identity_terms: Vec<String>,
    #[serde(default)]
    identity_suffix: String,
    #[serde(default)]
    safety_suffix: String,
}

#[derive(Debug, Clone, Deserialize)]
struct NarrativeEntry {
    singular: String,
    #[serde(default)]
    relational: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PresetEntry {
    icon: String,
    label: String,
    #[serde(default)]
    persona: Option<String>,
    #[serde(default)]
    random_personas: Vec<String>,
    prompt: String,
    #[serde(default)]
    narrative: Option<NarrativeEntry>,
    weights: WeightsEntry,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    preserve_identity: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    defaults: DefaultsEntry,
    personas: BTreeMap<String, Vec<Vec<String>>>,
    presets: BTreeMap<String, PresetEntry>,
}

/// Generation settings shared by every preset in a catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDefaults {
    pub model: String,
    pub negative_prompt: Option<String>,
    pub denoising_strength: Option<f64>,
    pub cfg_scale: Option<f64>,
    pub steps: Option<u32>,
    pub resolution: Option<u32>,
    pub sampler: Option<String>,
    pub preserve_identity: bool,
    pub identity_scale: StructureWeights,
    pub edge_offset: f64,
    pub identity_terms: Vec<String>,
    pub identity_suffix: String,
    pub safety_suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacterSource {
    Persona(String),
    /// One persona drawn uniformly per render.
    Random(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresetRecipe {
    pub name: String,
    pub icon: String,
    pub label: String,
    pub character: CharacterSource,
    pub prompt: String,
    pub narrative: Option<NarrativeTemplate>,
    pub weights: StructureWeights,
    pub model: Option<String>,
    pub preserve_identity: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub defaults: GenerationDefaults,
    pub personas: PersonaBook,
    pub presets: Vec<PresetRecipe>,
}

impl Catalog {
    pub fn builtin() -> StyleResult<Self> {
        Self::parse(BUILTIN_CATALOG)
    }

    pub fn parse(raw: &str) -> StyleResult<Self> {
        let file: CatalogFile = serde_yaml::from_str(raw)?;

        let defaults = convert_defaults(file.defaults)?;

        let mut personas = PersonaBook::default();
        for (name, rows) in file.personas {
            let matrix = CharacterMatrix::from_rows(rows)
                .map_err(|err| StyleError::Catalog(format!("persona '{name}': {err}")))?;
            personas.insert(Persona::new(name, matrix));
        }

        let presets = file
            .presets
            .into_iter()
            .map(|(name, entry)| convert_preset(name, entry, &personas))
            .collect::<StyleResult<Vec<_>>>()?;

        if presets.is_empty() {
            return Err(StyleError::Catalog("catalog defines no presets".to_string()));
        }

        Ok(Catalog {
            defaults,
            personas,
            presets,
        })
    }
}

fn convert_defaults(entry: DefaultsEntry) -> StyleResult<GenerationDefaults> {
    let model = entry.model.trim().to_string();
    if model.is_empty() {
        return Err(StyleError::Catalog("defaults.model is empty".to_string()));
    }
    if !entry.edge_offset.is_finite() {
        return Err(StyleError::Catalog(
            "defaults.edge_offset must be a finite number".to_string(),
        ));
    }

    Ok(GenerationDefaults {
        model,
        negative_prompt: entry.negative_prompt,
        denoising_strength: entry.denoising_strength,
        cfg_scale: entry.cfg_scale,
        steps: entry.steps,
        resolution: entry.resolution,
        sampler: entry.sampler,
        preserve_identity: entry.preserve_identity,
        identity_scale: entry.identity_scale.into(),
        edge_offset: entry.edge_offset,
        identity_terms: entry
            .identity_terms
            .into_iter()
            .map(|term| term.trim().to_string())
            .filter(|term| !term.is_empty())
            .collect(),
        identity_suffix: entry.identity_suffix.trim().to_string(),
        safety_suffix: entry.safety_suffix.trim().to_string(),
    })
}

fn convert_preset(
    name: String,
    entry: PresetEntry,
    personas: &PersonaBook,
) -> StyleResult<PresetRecipe> {
    let fail = |reason: String| StyleError::Catalog(format!("preset '{name}': {reason}"));

    let character = match (entry.persona, entry.random_personas.is_empty()) {
        (Some(persona), true) => CharacterSource::Persona(persona),
        (None, false) => CharacterSource::Random(entry.random_personas),
        (Some(_), false) => {
            return Err(fail(
                "set either 'persona' or 'random_personas', not both".to_string(),
            ))
        }
        (None, true) => {
            return Err(fail(
                "needs a 'persona' or a non-empty 'random_personas' list".to_string(),
            ))
        }
    };

    let referenced: Vec<&String> = match &character {
        CharacterSource::Persona(persona) => vec![persona],
        CharacterSource::Random(candidates) => candidates.iter().collect(),
    };
    if let Some(missing) = referenced.iter().find(|persona| !personas.contains(persona)) {
        return Err(fail(format!("unknown persona '{missing}'")));
    }

    if !entry.prompt.contains(CHARACTER_PLACEHOLDER) {
        return Err(fail(format!("prompt lacks the {CHARACTER_PLACEHOLDER} placeholder")));
    }
    let wants_narrative = entry.prompt.contains(NARRATIVE_PLACEHOLDER);
    let narrative = entry
        .narrative
        .map(|narrative| NarrativeTemplate::new(narrative.singular, narrative.relational));
    match (wants_narrative, narrative.is_some()) {
        (true, false) => {
            return Err(fail(format!(
                "prompt uses {NARRATIVE_PLACEHOLDER} but no narrative is defined"
            )))
        }
        (false, true) => {
            return Err(fail(format!(
                "narrative is defined but the prompt has no {NARRATIVE_PLACEHOLDER}"
            )))
        }
        _ => {}
    }

    Ok(PresetRecipe {
        icon: entry.icon,
        label: entry.label,
        character,
        prompt: entry.prompt,
        narrative,
        weights: entry.weights.into(),
        model: entry
            .model
            .map(|model| model.trim().to_string())
            .filter(|model| !model.is_empty()),
        preserve_identity: entry.preserve_identity,
        name,
    })
}
