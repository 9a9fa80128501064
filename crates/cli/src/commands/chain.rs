//! `promptchain context` and `promptchain execute`.

use promptchain_core::{BlockSetId, LlmMessage};

use super::Session;

pub async fn context(
    ctx: &Session,
    block_set: BlockSetId,
    chain_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let messages = if chain_only {
        ctx.service.preceding_messages(ctx.owner, block_set).await?
    } else {
        ctx.service.build_messages(ctx.owner, block_set).await?
    };

    if messages.is_empty() {
        println!("(no messages)");
    }
    print_messages(&messages);
    Ok(())
}

pub async fn execute(ctx: &Session, block_set: BlockSetId) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "⏳ Executing {block_set} via {}...",
        ctx.config.default_provider
    );
    let output = ctx.service.execute_block_set(ctx.owner, block_set).await?;

    println!("✅ Output block {}", output.id);
    println!();
    println!("{}", output.content);
    Ok(())
}

fn print_messages(messages: &[LlmMessage]) {
    for (i, message) in messages.iter().enumerate() {
        println!("[{i}] {}:", message.role);
        for line in message.content.lines() {
            println!("    {line}");
        }
    }
}
