//! `promptchain workspace`: Create and list workspaces.

use super::Session;

pub async fn create(ctx: &Session, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let seed = ctx.service.create_workspace(ctx.owner, name).await?;

    println!("✅ Created workspace \"{}\"", seed.workspace.name);
    println!("   Workspace:  {}", seed.workspace.id);
    println!("   Preset:     {} ({})", seed.preset.id, seed.preset.name);
    println!("   Block set:  {}", seed.block_set.id);
    println!("   Input:      {}", seed.input.id);
    println!(
        "   Completer:  {} ({}, t={})",
        seed.completer.id, seed.completer.model, seed.completer.temperature
    );

    Ok(())
}

pub async fn list(ctx: &Session) -> Result<(), Box<dyn std::error::Error>> {
    let workspaces = ctx.service.list_workspaces(ctx.owner).await?;
    if workspaces.is_empty() {
        println!("No workspaces yet. Run `promptchain workspace create <name>`.");
        return Ok(());
    }

    for ws in &workspaces {
        println!(
            "  {}  {:<24} updated {}",
            ws.id,
            ws.name,
            ws.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
