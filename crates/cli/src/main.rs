//! PromptChain CLI: the main entry point.
//!
//! Commands:
//! - `init`: Create the config directory and a default config.toml
//! - `workspace`: Create and list workspaces
//! - `preset`: Create, list and show presets
//! - `block-set`: Add, configure, link, move and delete block sets
//! - `block`: Create, edit, list and delete prompt and completer blocks
//! - `context`: Print the messages a block set would send
//! - `execute`: Run a block set against the configured provider
//! - `doctor`: Diagnose configuration, database and provider

use clap::{Parser, Subcommand};
use promptchain_core::{
    BlockId, BlockSetId, BlockSetLink, BlockSetOptions, PresetId, PromptRole, UserId, WorkspaceId,
};

mod commands;

#[derive(Parser)]
#[command(
    name = "promptchain",
    about = "PromptChain — chained prompt workspaces for LLM completions",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Acting user id
    #[arg(long, global = true, env = "PROMPTCHAIN_USER")]
    user: Option<UserId>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config directory and a default config.toml
    Init,

    /// Manage workspaces
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },

    /// Manage presets
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },

    /// Manage block sets
    BlockSet {
        #[command(subcommand)]
        action: BlockSetAction,
    },

    /// Manage prompt and completer blocks
    Block {
        #[command(subcommand)]
        action: BlockAction,
    },

    /// Print the messages a block set would send
    Context {
        block_set: BlockSetId,

        /// Only the preceding chain, without system prompt or own input
        #[arg(long)]
        chain_only: bool,
    },

    /// Run a block set and link the answer as its output
    Execute { block_set: BlockSetId },

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum WorkspaceAction {
    /// Create a workspace with a default preset and one runnable block set
    Create { name: String },
    /// List your workspaces, most recently updated first
    List,
}

#[derive(Subcommand)]
enum PresetAction {
    /// Create an empty preset
    Create { workspace: WorkspaceId, name: String },
    /// List the presets of a workspace
    List { workspace: WorkspaceId },
    /// Show a preset's block sets in order
    Show { preset: PresetId },
}

/// Flag overrides shared by `block-set add` and `block-set options`.
#[derive(clap::Args)]
struct OptionFlags {
    /// Prepend the preceding block sets' messages to the input
    #[arg(long)]
    include_previous: Option<bool>,
    /// Let a later chain walk continue past this block set
    #[arg(long)]
    output_includes_input: Option<bool>,
    /// Mark the block set as repeating
    #[arg(long)]
    repeat: Option<bool>,
}

impl OptionFlags {
    /// `base` with every given flag overridden.
    fn apply(&self, base: BlockSetOptions) -> BlockSetOptions {
        BlockSetOptions {
            is_input_including_previous_block_set_output: self
                .include_previous
                .unwrap_or(base.is_input_including_previous_block_set_output),
            is_output_including_input_blocks: self
                .output_includes_input
                .unwrap_or(base.is_output_including_input_blocks),
            is_repeating_current_block_set: self
                .repeat
                .unwrap_or(base.is_repeating_current_block_set),
        }
    }
}

#[derive(Subcommand)]
enum BlockSetAction {
    /// Append a block set to a preset
    Add {
        preset: PresetId,
        #[command(flatten)]
        flags: OptionFlags,
    },
    /// Change a block set's chain flags
    Options {
        block_set: BlockSetId,
        #[command(flatten)]
        flags: OptionFlags,
    },
    /// Move a block set into the slot of another one
    Move { moving: BlockSetId, slot: BlockSetId },
    /// Create an empty assistant block and link it as the output
    NewOutput { block_set: BlockSetId },
    /// Delete a block set
    Delete { block_set: BlockSetId },
}

#[derive(Subcommand)]
enum BlockAction {
    /// Create a prompt block
    CreatePrompt {
        workspace: WorkspaceId,
        #[arg(long, default_value = "user")]
        role: PromptRole,
        content: String,
    },
    /// Replace a prompt block's role and content
    EditPrompt {
        block: BlockId,
        #[arg(long, default_value = "user")]
        role: PromptRole,
        content: String,
    },
    /// Create a completer block with the configured defaults
    CreateCompleter {
        workspace: WorkspaceId,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        stop: Option<String>,
    },
    /// Link a block into a block set
    Attach {
        block_set: BlockSetId,
        /// top-input, system-prompt, completer or top-output
        link: BlockSetLink,
        block: BlockId,
    },
    /// Clear a block set link
    Detach {
        block_set: BlockSetId,
        link: BlockSetLink,
    },
    /// List the blocks of a workspace
    List { workspace: WorkspaceId },
    /// Delete a block no block set links
    Delete { block: BlockId },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let user = cli.user;
    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Workspace { action } => {
            let ctx = commands::Session::open(user).await?;
            match action {
                WorkspaceAction::Create { name } => commands::workspace::create(&ctx, &name).await?,
                WorkspaceAction::List => commands::workspace::list(&ctx).await?,
            }
        }
        Commands::Preset { action } => {
            let ctx = commands::Session::open(user).await?;
            match action {
                PresetAction::Create { workspace, name } => {
                    commands::preset::create(&ctx, workspace, &name).await?
                }
                PresetAction::List { workspace } => commands::preset::list(&ctx, workspace).await?,
                PresetAction::Show { preset } => commands::preset::show(&ctx, preset).await?,
            }
        }
        Commands::BlockSet { action } => {
            let ctx = commands::Session::open(user).await?;
            match action {
                BlockSetAction::Add { preset, flags } => {
                    commands::block_set::add(&ctx, preset, &flags).await?
                }
                BlockSetAction::Options { block_set, flags } => {
                    commands::block_set::options(&ctx, block_set, &flags).await?
                }
                BlockSetAction::Move { moving, slot } => {
                    commands::block_set::move_to(&ctx, moving, slot).await?
                }
                BlockSetAction::NewOutput { block_set } => {
                    commands::block_set::new_output(&ctx, block_set).await?
                }
                BlockSetAction::Delete { block_set } => {
                    commands::block_set::delete(&ctx, block_set).await?
                }
            }
        }
        Commands::Block { action } => {
            let ctx = commands::Session::open(user).await?;
            match action {
                BlockAction::CreatePrompt {
                    workspace,
                    role,
                    content,
                } => commands::block::create_prompt(&ctx, workspace, role, &content).await?,
                BlockAction::EditPrompt {
                    block,
                    role,
                    content,
                } => commands::block::edit_prompt(&ctx, block, role, &content).await?,
                BlockAction::CreateCompleter {
                    workspace,
                    model,
                    temperature,
                    stop,
                } => {
                    commands::block::create_completer(&ctx, workspace, model, temperature, stop)
                        .await?
                }
                BlockAction::Attach {
                    block_set,
                    link,
                    block,
                } => commands::block::attach(&ctx, block_set, link, block).await?,
                BlockAction::Detach { block_set, link } => {
                    commands::block::detach(&ctx, block_set, link).await?
                }
                BlockAction::List { workspace } => commands::block::list(&ctx, workspace).await?,
                BlockAction::Delete { block } => commands::block::delete(&ctx, block).await?,
            }
        }
        Commands::Context {
            block_set,
            chain_only,
        } => {
            let ctx = commands::Session::open(user).await?;
            commands::chain::context(&ctx, block_set, chain_only).await?
        }
        Commands::Execute { block_set } => {
            let ctx = commands::Session::open(user).await?;
            commands::chain::execute(&ctx, block_set).await?
        }
    }

    Ok(())
}
