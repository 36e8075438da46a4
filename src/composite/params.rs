use clap::ValueEnum;

/// What goes behind the person
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    /// Blurred copy of the camera frame
    Blur,
    /// Preset image shown through transparent background pixels
    Image,
}

/// Preset blur strengths offered by the controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BlurLevel {
    None,
    Low,
    #[value(name = "med")]
    Medium,
    High,
}

impl BlurLevel {
    pub fn amount(self) -> u32 {
        match self {
            BlurLevel::None => 0,
            BlurLevel::Low => 3,
            BlurLevel::Medium => 5,
            BlurLevel::High => 10,
        }
    }
}

/// Snapshot read once at the start of every compositing cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeParameters {
    pub mode: CompositeMode,
    pub blur_amount: u32,
    /// Probability at or above which a pixel counts as person, in [0, 1]
    pub foreground_threshold: f32,
    pub edge_blur_amount: u32,
    pub background_image_id: Option<u32>,
}

impl Default for CompositeParameters {
    fn default() -> Self {
        Self {
            mode: CompositeMode::Blur,
            blur_amount: 0,
            foreground_threshold: 0.5,
            edge_blur_amount: 3,
            background_image_id: None,
        }
    }
}
