//! Conversions from this crate's domain types to their `gfx-hal` counterpart.
//! Grounded in `compat/to_hal.rs` of the teacher codebase: one small trait,
//! implemented per-type, rather than ad hoc `From`/`Into` scattered through
//! the call sites that need a HAL value.

/// Convert a domain-level config/state type into the `gfx-hal` value it maps
/// to. Named `convert` (not `into`) to keep call sites unambiguous next to
/// the blanket `Into` impls `gfx-hal` itself defines for its own types.
pub trait ToHalType {
    type Target;
    fn convert(self) -> Self::Target;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl ToHalType for Extent2D {
    type Target = gfx_hal::window::Extent2D;

    fn convert(self) -> Self::Target {
        gfx_hal::window::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

impl ToHalType for Extent3D {
    type Target = gfx_hal::image::Extent;

    fn convert(self) -> Self::Target {
        gfx_hal::image::Extent {
            width: self.width,
            height: self.height,
            depth: self.depth.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: i16,
    pub y: i16,
    pub width: i16,
    pub height: i16,
}

impl ToHalType for Rect {
    type Target = gfx_hal::pso::Rect;

    fn convert(self) -> Self::Target {
        gfx_hal::pso::Rect {
            x: self.x,
            y: self.y,
            w: self.width,
            h: self.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub rect: Rect,
    pub depth: std::ops::Range<f32>,
}

impl ToHalType for Viewport {
    type Target = gfx_hal::pso::Viewport;

    fn convert(self) -> Self::Target {
        gfx_hal::pso::Viewport {
            rect: self.rect.convert(),
            depth: self.depth,
        }
    }
}

/// A clear value for a single attachment, tagged by kind since color and
/// depth clears are different unions on the HAL side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clear {
    Color(f32, f32, f32, f32),
    Depth(f32, u32),
}

impl ToHalType for Clear {
    type Target = gfx_hal::command::ClearValue;

    fn convert(self) -> Self::Target {
        match self {
            Clear::Color(r, g, b, a) => gfx_hal::command::ClearValue {
                color: gfx_hal::command::ClearColor { float32: [r, g, b, a] },
            },
            Clear::Depth(depth, stencil) => gfx_hal::command::ClearValue {
                depth_stencil: gfx_hal::command::ClearDepthStencil { depth, stencil },
            },
        }
    }
}
