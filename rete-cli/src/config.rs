//! CLI configuration surface (SPEC_FULL ambient stack): initial `run`
//! depth, default conflict-resolution strategy, and watch categories
//! enabled at startup, parsed with `clap` the way `knhk-workflow-engine`'s
//! binary does.

use clap::{Parser, ValueEnum};
use rete_core::{ConflictStrategy, WatchItem};

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum StrategyArg {
    Depth,
    Breadth,
    Lex,
    Mea,
    Complexity,
    Simplicity,
}

impl From<StrategyArg> for ConflictStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Depth => ConflictStrategy::Depth,
            StrategyArg::Breadth => ConflictStrategy::Breadth,
            StrategyArg::Lex => ConflictStrategy::Lex,
            StrategyArg::Mea => ConflictStrategy::Mea,
            StrategyArg::Complexity => ConflictStrategy::Complexity,
            StrategyArg::Simplicity => ConflictStrategy::Simplicity,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum WatchArg {
    Facts,
    Rules,
    Activations,
    Compilations,
    Statistics,
    All,
}

impl From<WatchArg> for WatchItem {
    fn from(value: WatchArg) -> Self {
        match value {
            WatchArg::Facts => WatchItem::Facts,
            WatchArg::Rules => WatchItem::Rules,
            WatchArg::Activations => WatchItem::Activations,
            WatchArg::Compilations => WatchItem::Compilations,
            WatchArg::Statistics => WatchItem::Statistics,
            WatchArg::All => WatchItem::All,
        }
    }
}

/// A forward-chaining production rule engine REPL.
#[derive(Parser, Debug)]
#[command(name = "rete-cli")]
#[command(about = "Assert facts, define rules, and drive the match-resolve-act loop")]
#[command(version)]
pub struct Cli {
    /// Default depth passed to `run` when a bare `run` is typed with no count.
    #[arg(long, default_value_t = -1)]
    pub run_depth: i64,

    /// Default conflict-resolution strategy (spec §4.5).
    #[arg(long, value_enum, default_value = "depth")]
    pub strategy: StrategyArg,

    /// Watch categories enabled at startup; may be repeated.
    #[arg(long = "watch", value_enum)]
    pub watch: Vec<WatchArg>,

    /// Path to the sqlite watch-trace database.
    #[arg(long, default_value = "./rete-cli-watch.db")]
    pub db: std::path::PathBuf,

    /// Load the builtin demonstration templates/rules (spec §8 scenarios)
    /// before accepting commands.
    #[arg(long)]
    pub demo: bool,

    /// Read commands from this file instead of stdin, one per line, then exit.
    #[arg(long)]
    pub script: Option<std::path::PathBuf>,
}
