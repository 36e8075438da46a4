//! Frame compositing: blurred-background and image-background renderers plus
//! the mask and blur primitives they share.

mod bokeh;
mod compositor;
mod gaussian;
mod mask;
mod params;
mod surface;

pub use compositor::FrameCompositor;
pub use params::{BlurLevel, CompositeMode, CompositeParameters};
pub use surface::OutputSurface;
