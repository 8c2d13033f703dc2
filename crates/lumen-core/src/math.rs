//! Math types used across the renderer.
//!
//! Re-exports the [`glam`] types the batcher and sprite helpers work with.
//!
//! ```
//! use lumen_core::math::{Affine2, Vec2};
//!
//! let world = Affine2::from_translation(Vec2::new(10.0, 20.0));
//! assert_eq!(world.transform_point2(Vec2::ZERO), Vec2::new(10.0, 20.0));
//! ```
//!
//! [`glam`]: https://docs.rs/glam

pub use glam::{Affine2, Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
