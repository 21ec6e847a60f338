use clap::Args;
use derive_builder::Builder;

/// Knobs for the flattener's local cost heuristic and output shaping.
/// Flattened into the CLI and buildable programmatically.
#[derive(Debug, Clone, Args, Builder)]
pub struct StructureConfig {
    /// Fixed overhead charged to a label/goto pair at an unresolved join.
    #[clap(long = "goto-overhead", default_value_t = 3)]
    pub goto_overhead: u32,

    /// Per-statement multiplier charged when duplicating post-join code.
    #[clap(long = "dup-cost", default_value_t = 1)]
    pub dup_cost: u32,

    /// Attach flattener decision rationale as comments in the output.
    #[clap(long)]
    pub annotate: bool,

    /// Keep control-transfer statements (go to, exits, next sentence) as
    /// leaves instead of absorbing them into structure.
    #[clap(long = "keep-all-statements")]
    pub keep_all_stmts: bool,
}

impl Default for StructureConfig {
    fn default() -> Self {
        StructureConfig { goto_overhead: 3, dup_cost: 1, annotate: false, keep_all_stmts: false }
    }
}

impl StructureConfigBuilder {
    /// Create a new builder preloaded with the default knobs.
    pub fn new() -> Self {
        Self {
            goto_overhead: Some(3),
            dup_cost: Some(1),
            annotate: Some(false),
            keep_all_stmts: Some(false),
        }
    }
}
