//! Adforge Scene Model
//!
//! Defines the data contracts consumed by the rendering core:
//! - **Request:** The render request (scenes, format, quality, project id)
//! - **Scene:** One timed background plus its overlay elements
//! - **Element:** Typed overlays (text, shape, CTA, logo, media placeholders)
//! - **Target:** Aspect formats, pixel sizes, and quality tiers
//! - **Frame:** The frame list consumed by final concatenation
//!
//! Element geometry is expressed in percent (`0.0..=100.0`) of the canvas,
//! authored against the 9:16 baseline. Nothing in this crate converts to
//! pixels; that happens in `adforge-layout`.

pub mod element;
pub mod error;
pub mod frame;
pub mod request;
pub mod scene;
pub mod target;

pub use element::*;
pub use error::*;
pub use frame::*;
pub use request::*;
pub use scene::*;
pub use target::*;
