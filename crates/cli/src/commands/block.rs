//! `promptchain block`: Prompt and completer blocks.

use promptchain_core::{Block, BlockId, BlockSetId, BlockSetLink, PromptRole, WorkspaceId};

use super::Session;

pub async fn create_prompt(
    ctx: &Session,
    workspace: WorkspaceId,
    role: PromptRole,
    content: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let block = ctx
        .service
        .create_prompt_block(ctx.owner, workspace, role, content)
        .await?;
    println!("✅ Created {} prompt block {}", block.role, block.id);
    Ok(())
}

pub async fn edit_prompt(
    ctx: &Session,
    block: BlockId,
    role: PromptRole,
    content: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let block = ctx
        .service
        .update_prompt_block(ctx.owner, block, role, content)
        .await?;
    println!("✅ Updated prompt block {}", block.id);
    Ok(())
}

pub async fn create_completer(
    ctx: &Session,
    workspace: WorkspaceId,
    model: Option<String>,
    temperature: Option<f32>,
    stop: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut block = ctx
        .service
        .create_completer_block(ctx.owner, workspace)
        .await?;

    if model.is_some() || temperature.is_some() || stop.is_some() {
        block = ctx
            .service
            .update_completer_block(
                ctx.owner,
                block.id,
                model.as_deref().unwrap_or(&block.model),
                temperature.unwrap_or(block.temperature),
                stop.as_deref().unwrap_or(&block.stop),
            )
            .await?;
    }

    println!(
        "✅ Created completer block {} ({}, t={})",
        block.id, block.model, block.temperature
    );
    Ok(())
}

pub async fn attach(
    ctx: &Session,
    block_set: BlockSetId,
    link: BlockSetLink,
    block: BlockId,
) -> Result<(), Box<dyn std::error::Error>> {
    ctx.service.attach(ctx.owner, block_set, link, block).await?;
    println!("✅ Linked {block} as {} of {block_set}", link.as_str());
    Ok(())
}

pub async fn detach(
    ctx: &Session,
    block_set: BlockSetId,
    link: BlockSetLink,
) -> Result<(), Box<dyn std::error::Error>> {
    ctx.service.detach(ctx.owner, block_set, link).await?;
    println!("✅ Cleared {} of {block_set}", link.as_str());
    Ok(())
}

pub async fn list(ctx: &Session, workspace: WorkspaceId) -> Result<(), Box<dyn std::error::Error>> {
    for block in ctx.service.workspace_blocks(ctx.owner, workspace).await? {
        match block {
            Block::Completer(c) => {
                let stop = if c.stop.is_empty() {
                    String::new()
                } else {
                    format!(" stop={:?}", c.stop)
                };
                println!("  {}  completer  {} t={}{stop}", c.id, c.model, c.temperature);
            }
            Block::Prompt(p) => {
                println!("  {}  {:<9}  {:?}", p.id, p.role.as_str(), p.content);
            }
        }
    }
    Ok(())
}

pub async fn delete(ctx: &Session, block: BlockId) -> Result<(), Box<dyn std::error::Error>> {
    ctx.service.delete_block(ctx.owner, block).await?;
    println!("🗑️  Deleted block {block}");
    Ok(())
}
