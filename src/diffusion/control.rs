use serde::Serialize;

/// Offset added to the soft-edge weight, whose signal is weaker than depth or pose.
pub const DEFAULT_EDGE_OFFSET: f64 = 0.2;

pub fn clamp_weight(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlMode {
    #[serde(rename = "Balanced")]
    Balanced,
    #[serde(rename = "My prompt is more important")]
    PromptPriority,
    #[serde(rename = "ControlNet is more important")]
    ConditioningPriority,
}

/// The six conditioning layers, in the order the service receives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlLayer {
    Pose,
    Depth,
    SoftEdge,
    IpAdapter,
    InstantId,
    Reference,
}

impl ControlLayer {
    pub const ALL: [ControlLayer; 6] = [
        ControlLayer::Pose,
        ControlLayer::Depth,
        ControlLayer::SoftEdge,
        ControlLayer::IpAdapter,
        ControlLayer::InstantId,
        ControlLayer::Reference,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Preprocessor module name on the service side.
    pub fn module(self) -> &'static str {
        match self {
            ControlLayer::Pose => "openpose_full",
            ControlLayer::Depth => "depth_midas",
            ControlLayer::SoftEdge => "softedge_pidinet",
            ControlLayer::IpAdapter => "ip-adapter",
            ControlLayer::InstantId => "instant_id",
            ControlLayer::Reference => "reference",
        }
    }

    pub fn model(self) -> &'static str {
        match self {
            ControlLayer::Pose => "control_v11p_sd15_openpose",
            ControlLayer::Depth => "control_v11f1p_sd15_depth",
            ControlLayer::SoftEdge => "control_v11p_sd15_softedge",
            ControlLayer::IpAdapter => "ip-adapter_sd15",
            ControlLayer::InstantId => "instantid_v1",
            ControlLayer::Reference => "reference_only",
        }
    }

    pub fn is_identity(self) -> bool {
        matches!(
            self,
            ControlLayer::IpAdapter | ControlLayer::InstantId | ControlLayer::Reference
        )
    }

    pub fn default_mode(self) -> ControlMode {
        if self.is_identity() {
            ControlMode::ConditioningPriority
        } else {
            ControlMode::Balanced
        }
    }

    /// Weight emitted when a caller leaves the layer unset.
    pub fn default_weight(self) -> f64 {
        match self {
            ControlLayer::Pose | ControlLayer::Depth | ControlLayer::SoftEdge => 1.0,
            ControlLayer::IpAdapter | ControlLayer::Reference => 0.8,
            ControlLayer::InstantId => 0.7,
        }
    }

    /// Setting used for an absent layer: present on the wire, but disabled.
    pub fn disabled(self) -> ControlLayerSetting {
        ControlLayerSetting::new(false, self.default_weight(), self.default_mode())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlLayerSetting {
    pub enabled: bool,
    weight: f64,
    pub mode: ControlMode,
}

impl ControlLayerSetting {
    pub fn new(enabled: bool, weight: f64, mode: ControlMode) -> Self {
        ControlLayerSetting {
            enabled,
            weight: clamp_weight(weight),
            mode,
        }
    }

    pub fn enabled(weight: f64, mode: ControlMode) -> Self {
        Self::new(true, weight, mode)
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

/// Per-layer settings supplied by a caller; `None` layers fall back to
/// [`ControlLayer::disabled`] when the request is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlOptions {
    pub pose: Option<ControlLayerSetting>,
    pub depth: Option<ControlLayerSetting>,
    pub soft_edge: Option<ControlLayerSetting>,
    pub ip_adapter: Option<ControlLayerSetting>,
    pub instant_id: Option<ControlLayerSetting>,
    pub reference: Option<ControlLayerSetting>,
}

impl ControlOptions {
    pub fn get(&self, layer: ControlLayer) -> Option<ControlLayerSetting> {
        match layer {
            ControlLayer::Pose => self.pose,
            ControlLayer::Depth => self.depth,
            ControlLayer::SoftEdge => self.soft_edge,
            ControlLayer::IpAdapter => self.ip_adapter,
            ControlLayer::InstantId => self.instant_id,
            ControlLayer::Reference => self.reference,
        }
    }
}

/// Structural weights before normalization, one per structural layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructureWeights {
    pub depth: f64,
    pub pose: f64,
    pub edge: f64,
}

impl StructureWeights {
    pub fn new(depth: f64, pose: f64, edge: f64) -> Self {
        StructureWeights { depth, pose, edge }
    }

    pub fn scaled(self, scale: StructureWeights) -> Self {
        StructureWeights {
            depth: self.depth * scale.depth,
            pose: self.pose * scale.pose,
            edge: self.edge * scale.edge,
        }
    }
}

/// Clamps depth and pose, and clamps edge after adding `edge_offset`.
pub fn compose(weights: StructureWeights, edge_offset: f64) -> ControlOptions {
    ControlOptions {
        depth: Some(ControlLayerSetting::enabled(
            weights.depth,
            ControlMode::Balanced,
        )),
        pose: Some(ControlLayerSetting::enabled(
            weights.pose,
            ControlMode::PromptPriority,
        )),
        soft_edge: Some(ControlLayerSetting::enabled(
            weights.edge + edge_offset,
            ControlMode::Balanced,
        )),
        ..ControlOptions::default()
    }
}

/// Scales the structural weights down and pins all identity layers to full
/// strength so the subject's face survives the restyle.
pub fn compose_preserving_identity(
    weights: StructureWeights,
    scale: StructureWeights,
    edge_offset: f64,
) -> ControlOptions {
    let identity = Some(ControlLayerSetting::enabled(
        1.0,
        ControlMode::ConditioningPriority,
    ));
    ControlOptions {
        ip_adapter: identity,
        instant_id: identity,
        reference: identity,
        ..compose(weights.scaled(scale), edge_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_stays_in_unit_interval() {
        let samples = [
            -5.0,
            -0.0,
            0.0,
            0.3,
            1.0,
            1.7,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NAN,
            f64::MIN,
            f64::MAX,
        ];
        for value in samples {
            let once = clamp_weight(value);
            assert!((0.0..=1.0).contains(&once), "{value} -> {once}");
            assert_eq!(clamp_weight(once), once, "not idempotent for {value}");
        }
        assert_eq!(clamp_weight(f64::NAN), 0.0);
        assert_eq!(clamp_weight(f64::INFINITY), 1.0);
        assert_eq!(clamp_weight(f64::NEG_INFINITY), 0.0);
        assert_eq!(clamp_weight(0.42), 0.42);
    }

    #[test]
    fn compose_offsets_only_the_edge_layer() {
        let control = compose(StructureWeights::new(0.5, 0.7, 0.4), DEFAULT_EDGE_OFFSET);
        let depth = control.depth.unwrap();
        let pose = control.pose.unwrap();
        let edge = control.soft_edge.unwrap();
        assert_eq!(depth.weight(), 0.5);
        assert_eq!(pose.weight(), 0.7);
        assert!((edge.weight() - clamp_weight(0.4 + DEFAULT_EDGE_OFFSET)).abs() < 1e-12);
        assert_eq!(pose.mode, ControlMode::PromptPriority);
        assert_eq!(depth.mode, ControlMode::Balanced);
        assert!(control.ip_adapter.is_none());
    }

    #[test]
    fn compose_clamps_out_of_range_inputs() {
        let control = compose(
            StructureWeights::new(3.0, f64::NAN, 0.95),
            DEFAULT_EDGE_OFFSET,
        );
        assert_eq!(control.depth.unwrap().weight(), 1.0);
        assert_eq!(control.pose.unwrap().weight(), 0.0);
        assert_eq!(control.soft_edge.unwrap().weight(), 1.0);

        let negative = compose(StructureWeights::new(-1.0, -1.0, -1.0), DEFAULT_EDGE_OFFSET);
        assert_eq!(negative.soft_edge.unwrap().weight(), 0.0);
    }

    #[test]
    fn identity_mode_scales_structure_and_pins_identity_layers() {
        let control = compose_preserving_identity(
            StructureWeights::new(1.0, 0.5, 0.4),
            StructureWeights::new(0.6, 0.6, 0.5),
            DEFAULT_EDGE_OFFSET,
        );
        assert!((control.depth.unwrap().weight() - 0.6).abs() < 1e-12);
        assert!((control.pose.unwrap().weight() - 0.3).abs() < 1e-12);
        assert!((control.soft_edge.unwrap().weight() - 0.4).abs() < 1e-12);
        for layer in [
            ControlLayer::IpAdapter,
            ControlLayer::InstantId,
            ControlLayer::Reference,
        ] {
            let setting = control.get(layer).unwrap();
            assert!(setting.enabled);
            assert_eq!(setting.weight(), 1.0);
            assert_eq!(setting.mode, ControlMode::ConditioningPriority);
        }
    }

    #[test]
    fn absent_layers_default_by_kind() {
        assert_eq!(
            ControlLayer::Pose.disabled().mode,
            ControlMode::Balanced
        );
        let reference = ControlLayer::Reference.disabled();
        assert!(!reference.enabled);
        assert_eq!(reference.mode, ControlMode::ConditioningPriority);
        assert_eq!(reference.weight(), 0.8);
    }
}
