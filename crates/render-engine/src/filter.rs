//! Typed filter graph IR.
//!
//! Filters are assembled as [`FilterNode`]s, grouped into labelled
//! [`FilterChain`]s and a [`FilterGraph`], and turned into ffmpeg syntax
//! only when the command line is built. Escaping happens at two levels:
//! option values first (`\`, `'`, `:`), then the whole filter description
//! for the graph parser (`\`, `'`, `[`, `]`, `,`, `;`).

use std::fmt;

/// Escape a value for use inside a filter's option list.
pub fn escape_option_value(raw: &str) -> String {
    escape_chars(raw, &['\\', '\'', ':'])
}

/// Escape a filter description for embedding in a filter graph.
pub fn escape_graph(raw: &str) -> String {
    escape_chars(raw, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_chars(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        // Newlines would terminate the option parser; drawtext gets one
        // node per line anyway.
        if c == '\n' || c == '\r' {
            out.push(' ');
            continue;
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum FilterArg {
    Positional(String),
    Named(String, String),
}

/// One filter with its options, e.g. `drawbox=x=10:y=20:w=100:h=40`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    name: String,
    args: Vec<FilterArg>,
}

impl FilterNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Add a `key=value` option.
    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args
            .push(FilterArg::Named(key.into(), value.to_string()));
        self
    }

    /// Add a positional option.
    pub fn positional(mut self, value: impl ToString) -> Self {
        self.args.push(FilterArg::Positional(value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of a named option, unescaped.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg {
            FilterArg::Named(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    /// Filter description with option-level escaping only.
    pub fn to_filter_string(&self) -> String {
        if self.args.is_empty() {
            return self.name.clone();
        }
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| match arg {
                FilterArg::Positional(v) => escape_option_value(v),
                FilterArg::Named(k, v) => format!("{k}={}", escape_option_value(v)),
            })
            .collect();
        format!("{}={}", self.name, args.join(":"))
    }

    /// Filter description escaped for a filter graph.
    pub fn to_graph_string(&self) -> String {
        escape_graph(&self.to_filter_string())
    }

    // Common nodes.

    pub fn drawbox(x: i64, y: i64, w: u32, h: u32, color: &str, thickness: Thickness) -> Self {
        FilterNode::new("drawbox")
            .arg("x", x)
            .arg("y", y)
            .arg("w", w.max(1))
            .arg("h", h.max(1))
            .arg("color", color)
            .arg("t", thickness)
    }

    pub fn scale(w: u32, h: u32) -> Self {
        FilterNode::new("scale").arg("w", w).arg("h", h)
    }

    pub fn format(pix_fmt: &str) -> Self {
        FilterNode::new("format").arg("pix_fmts", pix_fmt)
    }

    pub fn fps(fps: u32) -> Self {
        FilterNode::new("fps").arg("fps", fps)
    }

    pub fn setsar() -> Self {
        FilterNode::new("setsar").arg("sar", 1)
    }

    pub fn setpts_zero() -> Self {
        FilterNode::new("setpts").positional("PTS-STARTPTS")
    }

    /// Trim to exactly `secs`.
    pub fn trim(secs: f64) -> Self {
        FilterNode::new("trim").arg("duration", format!("{secs:.3}"))
    }

    /// Hold the last frame for `secs` so short clips can be trimmed to length.
    pub fn tpad_clone(secs: f64) -> Self {
        FilterNode::new("tpad")
            .arg("stop_mode", "clone")
            .arg("stop_duration", format!("{secs:.3}"))
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_graph_string())
    }
}

/// Box outline thickness for `drawbox`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Thickness {
    Fill,
    Px(u32),
}

impl fmt::Display for Thickness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Thickness::Fill => f.write_str("fill"),
            Thickness::Px(px) => write!(f, "{}", (*px).max(1)),
        }
    }
}

/// A linear chain `[in]a,b,c[out]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    inputs: Vec<String>,
    nodes: Vec<FilterNode>,
    outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    pub fn node(mut self, node: FilterNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn nodes(mut self, nodes: impl IntoIterator<Item = FilterNode>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    pub fn push(&mut self, node: FilterNode) {
        self.nodes.push(node);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_list(&self) -> &[FilterNode] {
        &self.nodes
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.inputs {
            write!(f, "[{label}]")?;
        }
        if self.nodes.is_empty() {
            // A chain must contain at least one filter.
            f.write_str("null")?;
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{node}")?;
        }
        for label in &self.outputs {
            write!(f, "[{label}]")?;
        }
        Ok(())
    }
}

/// A complete `-filter_complex` graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Total number of filter nodes.
    pub fn node_count(&self) -> usize {
        self.chains.iter().map(|c| c.nodes.len()).sum()
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{chain}")?;
        }
        Ok(())
    }
}
