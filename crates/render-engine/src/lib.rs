//! Adforge Render Engine
//!
//! Offline pipeline that turns a render request (timed scenes plus typed
//! overlay elements) into a single H.264 video.
//!
//! # Pipeline Architecture
//!
//! ```text
//! request.json ──┐
//!                ├── Asset Processor (download, presign, retry, placeholder)
//! object store ──┘         │
//!                          ├── Element Renderer (text, shape, CTA, logo, media)
//! font catalog ── Fonts ───┘         │
//!                                    ├── Scene Compositor (filter graph per scene)
//!                                    │         │
//!                                    │         ▼
//!                                    │   scene-NNN.png / scene-NNN.mp4
//!                                    ▼
//!                            Frame list ── Encode strategies
//!                                                 │
//!                                                 ▼
//!                                             output.mp4
//! ```
//!
//! Failures degrade locally wherever possible: a missing asset becomes a
//! placeholder, a missing font falls back to a default, a failed scene
//! filter keeps the unfiltered media. Only exhausting every encode strategy
//! fails the job.

pub mod assets;
pub mod compositor;
pub mod elements;
pub mod export;
pub mod fetch;
pub mod filter;
pub mod fonts;
pub mod renderer;
pub mod runner;
pub mod storage;

pub use export::*;
pub use fonts::{FontCache, FontCatalog, FontRequest, FontResolver, FontSelection, FontSource, GoogleFontsCatalog};
pub use renderer::{EncodeStrategy, FfmpegRenderer, FinalRender};
pub use runner::{command_exists, CommandRunner, SystemCommandRunner};
pub use storage::{AwsCliPresigner, ObjectStorage, PresignedUrlCache};
