//! `promptchain block-set`: Add, configure, move and delete block sets.

use promptchain_core::{BlockSetId, BlockSetOptions, PresetId};

use super::{print_json, Session};
use crate::OptionFlags;

pub async fn add(
    ctx: &Session,
    preset: PresetId,
    flags: &OptionFlags,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = flags.apply(BlockSetOptions::default());
    let bs = ctx.service.create_block_set(ctx.owner, preset, options).await?;
    println!("✅ Added block set {} at position {}", bs.id, bs.position);
    Ok(())
}

pub async fn options(
    ctx: &Session,
    block_set: BlockSetId,
    flags: &OptionFlags,
) -> Result<(), Box<dyn std::error::Error>> {
    let current = ctx.service.block_set(ctx.owner, block_set).await?;
    let bs = ctx
        .service
        .update_block_set_options(ctx.owner, block_set, flags.apply(current.options))
        .await?;
    print_json(&bs.options)
}

pub async fn move_to(
    ctx: &Session,
    moving: BlockSetId,
    slot: BlockSetId,
) -> Result<(), Box<dyn std::error::Error>> {
    let order = ctx.service.move_block_set(ctx.owner, moving, slot).await?;
    println!("✅ New order:");
    for bs in &order {
        let marker = if bs.id == moving { "  ←" } else { "" };
        println!("  #{:<3} {}{marker}", bs.position, bs.id);
    }
    Ok(())
}

pub async fn new_output(
    ctx: &Session,
    block_set: BlockSetId,
) -> Result<(), Box<dyn std::error::Error>> {
    let block = ctx.service.create_top_output_block(ctx.owner, block_set).await?;
    println!("✅ Linked empty output block {}", block.id);
    Ok(())
}

pub async fn delete(ctx: &Session, block_set: BlockSetId) -> Result<(), Box<dyn std::error::Error>> {
    ctx.service.delete_block_set(ctx.owner, block_set).await?;
    println!("🗑️  Deleted block set {block_set}");
    Ok(())
}
