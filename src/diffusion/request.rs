use serde_json::{json, Value};

use crate::diffusion::control::{ControlLayer, ControlLayerSetting, ControlOptions};

pub const DEFAULT_NEGATIVE_PROMPT: &str = "deformed face, distorted face, disfigured, mutation, extra limbs, ugly, poorly drawn face, bad anatomy";
pub const DEFAULT_SEED: i64 = -1;
pub const DEFAULT_STEPS: u32 = 20;
pub const DEFAULT_RESOLUTION: u32 = 512;
pub const DEFAULT_CFG_SCALE: f64 = 7.0;
pub const DEFAULT_N_ITER: u32 = 1;
pub const DEFAULT_BATCH_SIZE: u32 = 1;
pub const DEFAULT_DENOISING_STRENGTH: f64 = 0.95;
pub const DEFAULT_SAMPLER: &str = "DPM++ 2M Karras";
pub const RESIZE_MODE: &str = "Crop and Resize";

/// Caller-facing options; every `None` resolves to a documented default in [`build`].
#[derive(Debug, Clone, Default)]
pub struct DiffusionOptions {
    /// Reference image, base64 encoded.
    pub image: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub model: String,
    pub control: ControlOptions,
    /// Edge length of the square output.
    pub resolution: Option<u32>,
    pub seed: Option<i64>,
    pub denoising_strength: Option<f64>,
    pub cfg_scale: Option<f64>,
    pub steps: Option<u32>,
    pub n_iter: Option<u32>,
    pub batch_size: Option<u32>,
    pub sampler: Option<String>,
}

/// Fully resolved img2img request, ready to be serialized with [`GenerationRequest::payload`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub reference_image: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    conditioning: [ControlLayerSetting; 6],
    pub resolution: u32,
    pub seed: i64,
    pub denoising_strength: f64,
    pub cfg_scale: f64,
    pub steps: u32,
    pub n_iter: u32,
    pub batch_size: u32,
    pub sampler: String,
}

pub fn build(options: DiffusionOptions) -> GenerationRequest {
    let conditioning = ControlLayer::ALL.map(|layer| {
        options
            .control
            .get(layer)
            // re-clamp through the constructor in case the weight was set by hand
            .map(|setting| ControlLayerSetting::new(setting.enabled, setting.weight(), setting.mode))
            .unwrap_or_else(|| layer.disabled())
    });

    GenerationRequest {
        reference_image: options.image,
        prompt: options.prompt,
        negative_prompt: options
            .negative_prompt
            .unwrap_or_else(|| DEFAULT_NEGATIVE_PROMPT.to_string()),
        model: options.model,
        conditioning,
        resolution: options.resolution.unwrap_or(DEFAULT_RESOLUTION),
        seed: options.seed.unwrap_or(DEFAULT_SEED),
        denoising_strength: options
            .denoising_strength
            .unwrap_or(DEFAULT_DENOISING_STRENGTH),
        cfg_scale: options.cfg_scale.unwrap_or(DEFAULT_CFG_SCALE),
        steps: options.steps.unwrap_or(DEFAULT_STEPS),
        n_iter: options.n_iter.unwrap_or(DEFAULT_N_ITER),
        batch_size: options.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        sampler: options
            .sampler
            .unwrap_or_else(|| DEFAULT_SAMPLER.to_string()),
    }
}

impl GenerationRequest {
    pub fn layer(&self, layer: ControlLayer) -> &ControlLayerSetting {
        &self.conditioning[layer.index()]
    }

    pub fn layers(&self) -> impl Iterator<Item = (ControlLayer, &ControlLayerSetting)> {
        ControlLayer::ALL
            .into_iter()
            .map(move |layer| (layer, self.layer(layer)))
    }

    /// JSON body for the service's img2img endpoint.
    pub fn payload(&self) -> Value {
        let args: Vec<Value> = self
            .layers()
            .map(|(layer, setting)| {
                json!({
                    "module": layer.module(),
                    "model": layer.model(),
                    "enabled": setting.enabled,
                    "weight": setting.weight(),
                    "control_mode": setting.mode,
                    "processor_res": self.resolution,
                    "resize_mode": RESIZE_MODE,
                })
            })
            .collect();

        json!({
            "prompt": self.prompt,
            "negative_prompt": self.negative_prompt,
            "init_images": [self.reference_image],
            "seed": self.seed,
            "steps": self.steps,
            "width": self.resolution,
            "height": self.resolution,
            "cfg_scale": self.cfg_scale,
            "n_iter": self.n_iter,
            "batch_size": self.batch_size,
            "denoising_strength": self.denoising_strength,
            "sampler_name": self.sampler,
            "override_settings": {
                "sd_model_checkpoint": self.model,
            },
            "alwayson_scripts": {
                "ControlNet": {
                    "args": args,
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::control::{compose, ControlMode, StructureWeights, DEFAULT_EDGE_OFFSET};

    fn minimal() -> DiffusionOptions {
        DiffusionOptions {
            image: "aW1n".to_string(),
            prompt: "p".to_string(),
            model: "m".to_string(),
            control: compose(StructureWeights::new(0.5, 0.5, 0.4), DEFAULT_EDGE_OFFSET),
            ..DiffusionOptions::default()
        }
    }

    #[test]
    fn unset_fields_resolve_to_documented_defaults() {
        let payload = build(minimal()).payload();
        assert_eq!(payload["steps"], 20);
        assert_eq!(payload["cfg_scale"], 7.0);
        assert_eq!(payload["sampler_name"], "DPM++ 2M Karras");
        assert_eq!(payload["width"], 512);
        assert_eq!(payload["height"], 512);
        assert_eq!(payload["seed"], -1);
        assert_eq!(payload["n_iter"], 1);
        assert_eq!(payload["batch_size"], 1);
        assert_eq!(payload["denoising_strength"], 0.95);
        assert_eq!(payload["negative_prompt"], DEFAULT_NEGATIVE_PROMPT);
        assert_eq!(payload["override_settings"]["sd_model_checkpoint"], "m");
        assert_eq!(payload["init_images"][0], "aW1n");
        assert_eq!(payload["prompt"], "p");
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let request = build(DiffusionOptions {
            negative_prompt: Some("nsfw".to_string()),
            resolution: Some(768),
            seed: Some(42),
            denoising_strength: Some(0.7),
            cfg_scale: Some(6.0),
            steps: Some(50),
            n_iter: Some(2),
            batch_size: Some(3),
            sampler: Some("DPM++ SDE Karras".to_string()),
            ..minimal()
        });
        let payload = request.payload();
        assert_eq!(payload["negative_prompt"], "nsfw");
        assert_eq!(payload["width"], 768);
        assert_eq!(payload["height"], 768);
        assert_eq!(payload["seed"], 42);
        assert_eq!(payload["steps"], 50);
        assert_eq!(payload["n_iter"], 2);
        assert_eq!(payload["batch_size"], 3);
        assert_eq!(payload["sampler_name"], "DPM++ SDE Karras");
        for arg in payload["alwayson_scripts"]["ControlNet"]["args"]
            .as_array()
            .unwrap()
        {
            assert_eq!(arg["processor_res"], 768);
        }
    }

    #[test]
    fn all_six_layers_are_emitted_in_fixed_order() {
        let payload = build(minimal()).payload();
        let args = payload["alwayson_scripts"]["ControlNet"]["args"]
            .as_array()
            .unwrap();
        let modules: Vec<&str> = args.iter().map(|a| a["module"].as_str().unwrap()).collect();
        assert_eq!(
            modules,
            [
                "openpose_full",
                "depth_midas",
                "softedge_pidinet",
                "ip-adapter",
                "instant_id",
                "reference"
            ]
        );
        for arg in args {
            assert_eq!(arg["resize_mode"], "Crop and Resize");
            assert_eq!(arg["processor_res"], 512);
        }

        // identity layers were not supplied: present, disabled, default weight
        assert_eq!(args[3]["enabled"], false);
        assert_eq!(args[3]["weight"], 0.8);
        assert_eq!(args[3]["control_mode"], "ControlNet is more important");
        assert_eq!(args[4]["weight"], 0.7);
        assert_eq!(args[5]["weight"], 0.8);

        assert_eq!(args[0]["enabled"], true);
        assert_eq!(args[0]["control_mode"], "My prompt is more important");
        assert_eq!(args[1]["control_mode"], "Balanced");
    }

    #[test]
    fn missing_structural_layers_are_disabled_not_dropped() {
        let request = build(DiffusionOptions {
            control: ControlOptions::default(),
            ..minimal()
        });
        assert_eq!(request.layers().count(), 6);
        let pose = request.layer(ControlLayer::Pose);
        assert!(!pose.enabled);
        assert_eq!(pose.weight(), 1.0);
        assert_eq!(pose.mode, ControlMode::Balanced);
    }
}
