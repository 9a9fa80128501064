//! `promptchain preset`: Create, list and show presets.

use promptchain_core::{PresetId, ResolvedBlockSet, WorkspaceId};

use super::Session;

pub async fn create(
    ctx: &Session,
    workspace: WorkspaceId,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let preset = ctx.service.create_preset(ctx.owner, workspace, name).await?;
    println!("✅ Created preset \"{}\": {}", preset.name, preset.id);
    Ok(())
}

pub async fn list(ctx: &Session, workspace: WorkspaceId) -> Result<(), Box<dyn std::error::Error>> {
    for preset in ctx.service.list_presets(ctx.owner, workspace).await? {
        println!(
            "  {}  {:<24} rev {}  updated {}",
            preset.id,
            preset.name,
            preset.revision,
            preset.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub async fn show(ctx: &Session, preset: PresetId) -> Result<(), Box<dyn std::error::Error>> {
    let block_sets = ctx.service.block_sets(ctx.owner, preset).await?;
    if block_sets.is_empty() {
        println!("Preset {preset} has no block sets.");
        return Ok(());
    }

    for bs in &block_sets {
        println!("{}", describe(bs));
    }
    Ok(())
}

fn describe(bs: &ResolvedBlockSet) -> String {
    let options = bs.options();
    let flags = [
        (options.is_input_including_previous_block_set_output, "prev"),
        (options.is_output_including_input_blocks, "out+in"),
        (options.is_repeating_current_block_set, "repeat"),
    ]
    .into_iter()
    .filter(|(on, _)| *on)
    .map(|(_, name)| name)
    .collect::<Vec<_>>()
    .join(",");

    let mut lines = vec![format!("#{:<3} {}  [{}]", bs.position(), bs.id(), flags)];
    if let Some(system) = &bs.system_prompt {
        lines.push(format!("      system:    {}", preview(&system.content)));
    }
    if let Some(input) = &bs.top_input {
        lines.push(format!("      input:     {}", preview(&input.content)));
    }
    match &bs.completer {
        Some(c) => lines.push(format!("      completer: {} (t={})", c.model, c.temperature)),
        None => lines.push("      completer: (none, not executable)".to_string()),
    }
    if let Some(output) = &bs.top_output {
        lines.push(format!("      output:    {}", preview(&output.content)));
    }
    lines.join("\n")
}

fn preview(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default();
    let mut short: String = line.chars().take(60).collect();
    if short.len() < content.len() {
        short.push('…');
    }
    short
}
