//! Static catalog of restoration models and the pipelines built from them.
//!
//! The catalog is served to the frontend as-is and is the single source of
//! truth the pipeline runner resolves stages against.

use std::sync::LazyLock;

use serde::Serialize;
use serde_json::{json, Map, Value};

/* --------------------------------------------------------------------------
   Model kinds
   -------------------------------------------------------------------------- */

pub const KIND_SUPERRES: &str = "superres";
pub const KIND_FACE: &str = "face";
pub const KIND_PROMPT: &str = "prompt";
pub const KIND_MASK_INPAINT: &str = "mask-inpaint";
pub const KIND_STRUCTURE: &str = "structure";

/// All model kinds known to the executor registry.
pub const MODEL_KINDS: &[&str] = &[
    KIND_SUPERRES,
    KIND_FACE,
    KIND_PROMPT,
    KIND_MASK_INPAINT,
    KIND_STRUCTURE,
];

/// Pipeline used when a task does not name one (or names an unknown one).
pub const DEFAULT_PIPELINE_ID: &str = "superres_basic";

/// Stage id of face restoration steps.
pub const FACE_STAGE_ID: &str = "face";

/// Model used for face restoration when the user asks for it.
pub const DEFAULT_FACE_MODEL_ID: &str = "GFPGAN_v1.4";

/* --------------------------------------------------------------------------
   Types
   -------------------------------------------------------------------------- */

/// A restoration model wrapped by one of the stage executors.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSpec {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub description: String,
    pub repo: Option<String>,
    pub homepage: Option<String>,
    pub tags: Vec<String>,
    pub default_device: String,
    pub weight_hint: Option<String>,
    pub supports_prompt: bool,
    pub supports_mask: bool,
}

/// One step of a pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStageSpec {
    pub id: String,
    pub name: String,
    pub model_id: String,
    pub description: String,
    pub optional: bool,
    pub defaults: Map<String, Value>,
}

/// An ordered chain of model stages.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub stages: Vec<PipelineStageSpec>,
    pub recommended_presets: Vec<String>,
    pub supports_prompt: bool,
    pub supports_mask: bool,
}

/* --------------------------------------------------------------------------
   Builders
   -------------------------------------------------------------------------- */

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn new_model(id: &str, name: &str, kind: &str, description: &str, tags: &[&str]) -> ModelSpec {
    ModelSpec {
        id: id.into(),
        name: name.into(),
        kind: kind.into(),
        description: description.into(),
        repo: None,
        homepage: None,
        tags: strings(tags),
        default_device: "cuda".into(),
        weight_hint: None,
        supports_prompt: false,
        supports_mask: false,
    }
}

impl ModelSpec {
    fn repo(mut self, repo: &str) -> Self {
        self.repo = Some(repo.into());
        self
    }

    fn weight_hint(mut self, hint: &str) -> Self {
        self.weight_hint = Some(hint.into());
        self
    }

    fn device(mut self, device: &str) -> Self {
        self.default_device = device.into();
        self
    }

    fn with_prompt(mut self) -> Self {
        self.supports_prompt = true;
        self
    }

    fn with_mask(mut self) -> Self {
        self.supports_mask = true;
        self
    }
}

fn stage(id: &str, name: &str, model_id: &str, description: &str) -> PipelineStageSpec {
    PipelineStageSpec {
        id: id.into(),
        name: name.into(),
        model_id: model_id.into(),
        description: description.into(),
        optional: false,
        defaults: Map::new(),
    }
}

impl PipelineStageSpec {
    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn default_param(mut self, key: &str, value: Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    /// Face restoration stage appended on demand by the runner.
    pub fn face_restore() -> Self {
        stage(
            FACE_STAGE_ID,
            "GFPGAN",
            DEFAULT_FACE_MODEL_ID,
            "Face restoration requested through the task adjustments.",
        )
        .optional()
    }
}

/* --------------------------------------------------------------------------
   Catalog data
   -------------------------------------------------------------------------- */

const REAL_ESRGAN_X4: &str = "RealESRGAN_RealESRGAN_x4plus_4x";
const HAT_REAL_X4: &str = "HAT_Real_GAN_4x";
const SWINIR_REAL_X4: &str = "SwinIR_realSR_BSRGAN_DFOWMFC_s64w8_SwinIR_L_GAN_4x";
const DAT_LIGHT_X2: &str = "DAT_light_2x";

static MODELS: LazyLock<Vec<ModelSpec>> = LazyLock::new(|| {
    vec![
        new_model(
            REAL_ESRGAN_X4,
            "RealESRGAN 4x",
            KIND_SUPERRES,
            "General-purpose 4x super-resolution for photographic content.",
            &["superres", "final2x", "photo"],
        )
        .repo("https://github.com/xinntao/Real-ESRGAN")
        .weight_hint("final2x/RealESRGAN_x4plus.pth"),
        new_model(
            HAT_REAL_X4,
            "HAT Real 4x",
            KIND_SUPERRES,
            "HAT real-world model, better on night scenes and low-light noise.",
            &["superres", "lowlight", "final2x"],
        )
        .repo("https://github.com/XPixelGroup/HAT"),
        new_model(
            SWINIR_REAL_X4,
            "SwinIR Real 4x",
            KIND_SUPERRES,
            "SwinIR BSRGAN variant, suited to haze removal and landscapes.",
            &["superres", "dehaze"],
        )
        .repo("https://github.com/JingyunLiang/SwinIR"),
        new_model(
            DAT_LIGHT_X2,
            "DAT Light 2x",
            KIND_SUPERRES,
            "Lightweight 2x model for quick previews and CPU inference.",
            &["superres", "lightweight"],
        )
        .repo("https://github.com/baidu-research/NJUDat")
        .device("cpu"),
        new_model(
            "RealCUGAN_Conservative_2x",
            "RealCUGAN 2x",
            KIND_SUPERRES,
            "RealCUGAN model tuned for anime and illustrations.",
            &["anime", "superres"],
        )
        .repo("https://github.com/bilibili/ailab"),
        new_model(
            DEFAULT_FACE_MODEL_ID,
            "GFPGAN v1.4",
            KIND_FACE,
            "Face restoration, can be chained with Real-ESRGAN.",
            &["face", "restore"],
        )
        .repo("https://github.com/TencentARC/GFPGAN")
        .weight_hint("weights/GFPGANv1.4.pth"),
        new_model(
            "PromptFix_diffusion",
            "PromptFix",
            KIND_PROMPT,
            "Instruction-driven diffusion restoration with prompt and mask support.",
            &["diffusion", "prompt", "inpaint"],
        )
        .repo("https://github.com/yeates/PromptFix")
        .with_prompt()
        .with_mask(),
        new_model(
            "IOPaint_lama",
            "IOPaint (LaMa)",
            KIND_MASK_INPAINT,
            "Mask-based inpainting for removing objects and watermarks.",
            &["inpaint", "lama"],
        )
        .repo("https://github.com/Sanster/IOPaint")
        .with_mask(),
        new_model(
            "CTSDG_iccv2021",
            "CTSDG",
            KIND_STRUCTURE,
            "Joint structure and texture generation for large missing regions.",
            &["structure", "inpaint"],
        )
        .repo("https://github.com/Xiefan-Guo/CTSDG"),
        new_model(
            "ShiftNet_pytorch",
            "Shift-Net",
            KIND_STRUCTURE,
            "Deep feature rearrangement, suited to panoramic texture completion.",
            &["texture", "inpaint"],
        )
        .repo("https://github.com/Zhaoyi-Yan/Shift-Net_pytorch"),
        new_model(
            "CRFill_iccv2021",
            "CR-Fill",
            KIND_STRUCTURE,
            "Contextual reconstruction for large scene repairs.",
            &["inpaint", "context"],
        )
        .repo("https://github.com/zengxianyu/crfill"),
    ]
});

static PIPELINES: LazyLock<Vec<PipelineSpec>> = LazyLock::new(|| {
    vec![
        PipelineSpec {
            id: DEFAULT_PIPELINE_ID.into(),
            name: "Basic super-resolution".into(),
            description: "Runs a single Final2x super-resolution model.".into(),
            tags: strings(&["default", "superres"]),
            stages: vec![stage(
                "superres",
                "Final2x",
                REAL_ESRGAN_X4,
                "Real-ESRGAN by default, can be overridden per task.",
            )
            .default_param("scale", json!(4))],
            recommended_presets: strings(&["night", "haze", "daily"]),
            supports_prompt: false,
            supports_mask: false,
        },
        PipelineSpec {
            id: "old_photo_restore".into(),
            name: "Old photo restoration".into(),
            description: "GFPGAN followed by super-resolution, for aged portraits.".into(),
            tags: strings(&["face", "old-photo"]),
            stages: vec![
                stage(
                    FACE_STAGE_ID,
                    "GFPGAN",
                    DEFAULT_FACE_MODEL_ID,
                    "Repairs facial structure first.",
                ),
                stage(
                    "superres",
                    "RealESRGAN",
                    REAL_ESRGAN_X4,
                    "Final upscale and detail enhancement.",
                )
                .default_param("scale", json!(4)),
            ],
            recommended_presets: strings(&["vintage"]),
            supports_prompt: false,
            supports_mask: false,
        },
        PipelineSpec {
            id: "prompt_inpaint".into(),
            name: "Prompt-driven repair".into(),
            description: "PromptFix diffusion model with text instructions and a mask.".into(),
            tags: strings(&["prompt", "diffusion", "inpaint"]),
            stages: vec![stage(
                "prompt",
                "PromptFix",
                "PromptFix_diffusion",
                "Regenerates the masked region from a natural-language prompt.",
            )
            .default_param("guidance_scale", json!(7.5))],
            recommended_presets: Vec::new(),
            supports_prompt: true,
            supports_mask: true,
        },
        PipelineSpec {
            id: "mask_inpaint".into(),
            name: "Mask inpainting".into(),
            description: "IOPaint (LaMa Cleaner) mask editing, for removing objects.".into(),
            tags: strings(&["lama", "mask"]),
            stages: vec![stage(
                "mask",
                "IOPaint",
                "IOPaint_lama",
                "Removes or fills content under the mask.",
            )],
            recommended_presets: Vec::new(),
            supports_prompt: false,
            supports_mask: true,
        },
        PipelineSpec {
            id: "structure_fill".into(),
            name: "Structure completion".into(),
            description: "CTSDG -> Shift-Net -> CR-Fill structure and texture chain.".into(),
            tags: strings(&["structure", "inpaint"]),
            stages: vec![
                stage(
                    "structure",
                    "CTSDG",
                    "CTSDG_iccv2021",
                    "Recovers the outline of missing regions.",
                ),
                stage(
                    "texture",
                    "Shift-Net",
                    "ShiftNet_pytorch",
                    "Fills in high-frequency texture.",
                )
                .optional(),
                stage(
                    "context",
                    "CR-Fill",
                    "CRFill_iccv2021",
                    "Blends details using surrounding context.",
                )
                .optional(),
            ],
            recommended_presets: Vec::new(),
            supports_prompt: false,
            supports_mask: true,
        },
    ]
});

/// Preset id → super-resolution model tuned for that kind of photo.
const PRESET_MODEL_OVERRIDES: &[(&str, &str)] = &[
    ("night", HAT_REAL_X4),
    ("haze", SWINIR_REAL_X4),
    ("vintage", REAL_ESRGAN_X4),
    ("daily", DAT_LIGHT_X2),
];

/* --------------------------------------------------------------------------
   Lookups
   -------------------------------------------------------------------------- */

pub fn models() -> &'static [ModelSpec] {
    &MODELS
}

pub fn pipelines() -> &'static [PipelineSpec] {
    &PIPELINES
}

pub fn model(id: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|m| m.id == id)
}

pub fn pipeline(id: &str) -> Option<&'static PipelineSpec> {
    PIPELINES.iter().find(|p| p.id == id)
}

/// The default pipeline. Always present in the static catalog.
pub fn default_pipeline() -> &'static PipelineSpec {
    &PIPELINES[0]
}

/// Resolve a requested pipeline id, falling back to the default.
///
/// Returns the pipeline and whether the fallback was used for an id that
/// was requested but unknown (the caller logs that case).
pub fn resolve_pipeline(requested: Option<&str>) -> (&'static PipelineSpec, bool) {
    match requested {
        Some(id) => match pipeline(id) {
            Some(spec) => (spec, false),
            None => (default_pipeline(), true),
        },
        None => (default_pipeline(), false),
    }
}

/// Super-resolution model associated with a preset, if any.
pub fn preset_model(preset_id: &str) -> Option<&'static str> {
    PRESET_MODEL_OVERRIDES
        .iter()
        .find(|(preset, _)| *preset == preset_id)
        .map(|(_, model_id)| *model_id)
}

/// Whether `model_id` names a catalog model of the given kind.
pub fn is_model_of_kind(model_id: &str, kind: &str) -> bool {
    model(model_id).is_some_and(|m| m.kind == kind)
}
