//! On-screen preview of the two eye textures.
//!
//! The compositor only decides what to draw; the GL calls belong to a
//! [`BlitContext`] supplied by the host.

use glam::Vec2;

use crate::types::{ColorHandle, EyeIndex};

const TEX_COORDS: [Vec2; 4] = [
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 0.0),
];

const LEFT_HALF: [Vec2; 4] = [
    Vec2::new(0.0, 1.0),
    Vec2::new(-1.0, 1.0),
    Vec2::new(-1.0, -1.0),
    Vec2::new(0.0, -1.0),
];

const RIGHT_HALF: [Vec2; 4] = [
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
    Vec2::new(0.0, -1.0),
    Vec2::new(1.0, -1.0),
];

/// Textured quad in clip space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub vertices: [Vec2; 4],
    pub tex_coords: [Vec2; 4],
}

/// Immediate-mode drawing surface for the mirror.
///
/// `save_state` must capture depth test, active texture unit, bound texture and
/// the projection/texture/modelview stacks, then set up an identity ortho
/// view; `restore_state` puts all of it back.
pub trait BlitContext {
    fn save_state(&mut self);
    fn bind_texture(&mut self, texture: ColorHandle);
    fn draw_quad(&mut self, quad: &Quad);
    fn restore_state(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirrorCompositor {
    textures: [ColorHandle; 2],
    scale: f32,
}

impl MirrorCompositor {
    pub fn new(textures: [ColorHandle; 2], scale: f32) -> Self {
        let scale = if scale.is_finite() {
            scale.clamp(f32::EPSILON, 1.0)
        } else {
            1.0
        };
        Self { textures, scale }
    }

    pub fn textures(&self) -> [ColorHandle; 2] {
        self.textures
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Quad covering one half of clip space, shrunk about the half's center.
    pub fn quad(&self, eye: EyeIndex) -> Quad {
        let (half, center) = match eye {
            EyeIndex::Left => (LEFT_HALF, Vec2::new(-0.5, 0.0)),
            EyeIndex::Right => (RIGHT_HALF, Vec2::new(0.5, 0.0)),
        };
        Quad {
            vertices: half.map(|v| center + (v - center) * self.scale),
            tex_coords: TEX_COORDS,
        }
    }

    pub fn draw(&self, ctx: &mut dyn BlitContext) {
        ctx.save_state();
        for eye in EyeIndex::BOTH {
            ctx.bind_texture(self.textures[eye.index()]);
            ctx.draw_quad(&self.quad(eye));
        }
        ctx.restore_state();
    }
}
