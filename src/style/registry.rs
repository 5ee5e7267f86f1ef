use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::character::{select_random, Age, Gender, PersonaBook};
use crate::config::Config;
use crate::diffusion::control::{compose, compose_preserving_identity, ControlOptions};
use crate::diffusion::request::{build, DiffusionOptions, GenerationRequest};
use crate::diffusion::{DataUri, DiffusionClient};
use crate::error::{StyleError, StyleResult};
use crate::style::catalog::{Catalog, CharacterSource, GenerationDefaults, PresetRecipe};
use crate::style::template::{render_prompt, with_identity_terms, with_suffix};

#[derive(Debug)]
struct SharedTables {
    personas: PersonaBook,
    defaults: GenerationDefaults,
}

/// A named style: turns (reference image, gender, age) into a generation request.
#[derive(Debug, Clone)]
pub struct StylePreset {
    recipe: PresetRecipe,
    tables: Arc<SharedTables>,
}

impl StylePreset {
    pub fn name(&self) -> &str {
        &self.recipe.name
    }

    pub fn icon(&self) -> &str {
        &self.recipe.icon
    }

    pub fn label(&self) -> &str {
        &self.recipe.label
    }

    pub fn model(&self) -> &str {
        self.recipe
            .model
            .as_deref()
            .unwrap_or(&self.tables.defaults.model)
    }

    pub fn preserves_identity(&self) -> bool {
        self.recipe
            .preserve_identity
            .unwrap_or(self.tables.defaults.preserve_identity)
    }

    pub fn character_phrase(&self, gender: Gender, age: Age) -> StyleResult<String> {
        let persona = match &self.recipe.character {
            CharacterSource::Persona(persona) => persona.as_str(),
            CharacterSource::Random(candidates) => select_random(candidates)?.as_str(),
        };
        self.tables
            .personas
            .lookup(persona, gender, age)
            .map(str::to_string)
    }

    pub fn prompt(&self, gender: Gender, age: Age) -> StyleResult<String> {
        let character = self.character_phrase(gender, age)?;
        let narrative = self
            .recipe
            .narrative
            .as_ref()
            .map(|narrative| narrative.template_for(gender))
            .unwrap_or_default();
        let prompt = render_prompt(&self.recipe.prompt, &character, narrative);

        let defaults = &self.tables.defaults;
        let prompt = if self.preserves_identity() {
            with_identity_terms(prompt, &defaults.identity_terms, &defaults.identity_suffix)
        } else {
            prompt
        };
        Ok(with_suffix(prompt, &defaults.safety_suffix))
    }

    pub fn control(&self) -> ControlOptions {
        let defaults = &self.tables.defaults;
        if self.preserves_identity() {
            compose_preserving_identity(
                self.recipe.weights,
                defaults.identity_scale,
                defaults.edge_offset,
            )
        } else {
            compose(self.recipe.weights, defaults.edge_offset)
        }
    }

    /// Builds the request without touching the network.
    pub fn render(&self, image: &str, gender: Gender, age: Age) -> StyleResult<GenerationRequest> {
        let prompt = self.prompt(gender, age)?;
        let control = self.control();
        let defaults = &self.tables.defaults;

        debug!(
            "preset={} model={} prompt='{}' depth={:?} pose={:?} edge={:?} identity={}",
            self.name(),
            self.model(),
            prompt,
            control.depth.map(|setting| setting.weight()),
            control.pose.map(|setting| setting.weight()),
            control.soft_edge.map(|setting| setting.weight()),
            self.preserves_identity()
        );

        Ok(build(DiffusionOptions {
            image: image.to_string(),
            prompt,
            negative_prompt: defaults.negative_prompt.clone(),
            model: self.model().to_string(),
            control,
            resolution: defaults.resolution,
            seed: None,
            denoising_strength: defaults.denoising_strength,
            cfg_scale: defaults.cfg_scale,
            steps: defaults.steps,
            n_iter: None,
            batch_size: None,
            sampler: defaults.sampler.clone(),
        }))
    }

    pub async fn generate(
        &self,
        client: &DiffusionClient,
        image: &str,
        gender: Gender,
        age: Age,
    ) -> StyleResult<Vec<DataUri>> {
        let request = self.render(image, gender, age)?;
        client.submit(&request).await
    }
}

/// Immutable, process-wide set of presets, built once at startup.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    presets: BTreeMap<String, StylePreset>,
    tables: Arc<SharedTables>,
}

impl StyleRegistry {
    pub fn from_catalog(catalog: Catalog) -> Self {
        let tables = Arc::new(SharedTables {
            personas: catalog.personas,
            defaults: catalog.defaults,
        });
        let presets = catalog
            .presets
            .into_iter()
            .map(|recipe| {
                let preset = StylePreset {
                    recipe,
                    tables: Arc::clone(&tables),
                };
                (preset.name().to_string(), preset)
            })
            .collect();
        StyleRegistry { presets, tables }
    }

    pub fn builtin() -> StyleResult<Self> {
        Catalog::builtin().map(Self::from_catalog)
    }

    pub fn load(path: &Path) -> StyleResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            StyleError::Catalog(format!("failed to read {}: {err}", path.display()))
        })?;
        Catalog::parse(&raw).map(Self::from_catalog)
    }

    pub fn from_config(config: &Config) -> StyleResult<Self> {
        let registry = match config.style_catalog_path.as_deref() {
            Some(path) => {
                info!("Loading style catalog from {}", path.display());
                Self::load(path)?
            }
            None => Self::builtin()?,
        };
        info!("Registered {} style preset(s)", registry.presets.len());
        Ok(registry)
    }

    pub fn resolve(&self, name: &str) -> StyleResult<&StylePreset> {
        self.presets
            .get(name.trim())
            .ok_or_else(|| StyleError::UnknownPreset(name.trim().to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StylePreset> {
        self.presets.values()
    }

    pub fn personas(&self) -> &PersonaBook {
        &self.tables.personas
    }
}
