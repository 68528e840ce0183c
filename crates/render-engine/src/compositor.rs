//! Scene compositor: turns a scene's paint-ordered steps into one filter
//! graph.
//!
//! Draw nodes accumulate on the current chain. Each image overlay closes
//! the chain under a fresh label, prepares the overlay input, and starts a
//! new chain from the overlay's output:
//!
//! ```text
//! [0:v]base,drawbox,...[s0];
//! [1:v]scale,format=rgba,colorchannelmixer[o1];
//! [s0][o1]overlay[s1];
//! [s1]drawtext,...,tail[vout]
//! ```

use std::path::PathBuf;

use adforge_layout::PixelRect;

use crate::filter::{FilterChain, FilterGraph, FilterNode};

/// Label of the composed video stream.
pub const OUTPUT_LABEL: &str = "vout";

/// An overlay image on disk, ready to become a graph input.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOverlay {
    pub path: PathBuf,
    pub rect: PixelRect,
    pub opacity: f64,
}

/// One paint operation, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeStep {
    Draw(FilterNode),
    Overlay(ResolvedOverlay),
}

/// A composed scene graph plus the extra inputs it references. Input `0`
/// is the scene media; overlay `k` is input `k + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneComposition {
    pub graph: FilterGraph,
    pub overlay_inputs: Vec<PathBuf>,
}

impl SceneComposition {
    pub fn output_label(&self) -> &'static str {
        OUTPUT_LABEL
    }
}

/// Compose `steps` between `base` (applied to the scene media first) and
/// `tail` (applied last).
pub fn compose_scene(base: Vec<FilterNode>, steps: &[CompositeStep], tail: Vec<FilterNode>) -> SceneComposition {
    let mut graph = FilterGraph::new();
    let mut overlay_inputs = Vec::new();
    let mut stage = 0usize;
    let mut chain = FilterChain::new().input("0:v").nodes(base);

    for step in steps {
        match step {
            CompositeStep::Draw(node) => chain.push(node.clone()),
            CompositeStep::Overlay(overlay) => {
                let below = format!("s{stage}");
                graph.push(std::mem::take(&mut chain).output(below.clone()));

                overlay_inputs.push(overlay.path.clone());
                let input = overlay_inputs.len();
                let prepared = format!("o{input}");
                graph.push(overlay_chain(input, overlay).output(prepared.clone()));

                stage += 1;
                let above = format!("s{stage}");
                graph.push(
                    FilterChain::new()
                        .input(below)
                        .input(prepared)
                        .node(
                            FilterNode::new("overlay")
                                .arg("x", overlay.rect.x)
                                .arg("y", overlay.rect.y),
                        )
                        .output(above.clone()),
                );
                chain = FilterChain::new().input(above);
            }
        }
    }

    graph.push(chain.nodes(tail).output(OUTPUT_LABEL));
    SceneComposition {
        graph,
        overlay_inputs,
    }
}

fn overlay_chain(input: usize, overlay: &ResolvedOverlay) -> FilterChain {
    let mut chain = FilterChain::new()
        .input(format!("{input}:v"))
        .node(FilterNode::scale(overlay.rect.width.max(1), overlay.rect.height.max(1)))
        .node(FilterNode::format("rgba"));
    if overlay.opacity < 1.0 {
        chain.push(FilterNode::new("colorchannelmixer").arg("aa", format!("{:.3}", overlay.opacity.max(0.0))));
    }
    chain
}
