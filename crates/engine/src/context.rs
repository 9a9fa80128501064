//! Context builder: the full message list sent for one block set.
//!
//! Order: system prompt (as `system`), then the preceding chain when the
//! target includes previous output, then the target's top input (as `user`).

use promptchain_core::{CompletionRequest, Error, LlmMessage, ResolvedBlockSet, Result};

use crate::chain::collect_preceding_messages;

/// Assemble the messages for `target`.
///
/// `block_sets` are the resolved block sets of the target's preset; the
/// target may or may not be among them. Fails with `NotExecutable` when no
/// completer is attached, before anything is assembled.
pub fn build_messages(
    target: &ResolvedBlockSet,
    block_sets: &[ResolvedBlockSet],
) -> Result<Vec<LlmMessage>> {
    if target.completer.is_none() {
        return Err(Error::NotExecutable {
            block_set_id: target.id().to_string(),
        });
    }

    let mut messages = Vec::new();

    if let Some(system) = &target.system_prompt {
        messages.push(LlmMessage::system(system.content.clone()));
    }

    if target.options().is_input_including_previous_block_set_output {
        messages.extend(collect_preceding_messages(block_sets, target.position()));
    }

    if let Some(input) = &target.top_input {
        messages.push(LlmMessage::user(input.content.clone()));
    }

    Ok(messages)
}

/// The completion request for `target`: its messages plus its completer's
/// model, temperature and stop sequence.
pub fn build_request(
    target: &ResolvedBlockSet,
    block_sets: &[ResolvedBlockSet],
) -> Result<CompletionRequest> {
    let messages = build_messages(target, block_sets)?;
    let completer = target.completer.as_ref().ok_or_else(|| Error::NotExecutable {
        block_set_id: target.id().to_string(),
    })?;

    Ok(CompletionRequest {
        model: completer.model.clone(),
        temperature: completer.temperature,
        messages,
        stop: completer.stop.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ChainBuilder;
    use promptchain_core::PromptRole;

    fn contents(messages: &[LlmMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn no_completer_is_not_executable() {
        let chain = ChainBuilder::new().step(|s| s.input("hello")).build();
        let err = build_messages(&chain[0], &chain).unwrap_err();
        assert!(matches!(err, Error::NotExecutable { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn bare_executable_block_set_has_no_messages() {
        let chain = ChainBuilder::new().step(|s| s.completer("gpt-4o")).build();
        assert!(build_messages(&chain[0], &chain).unwrap().is_empty());
    }

    #[test]
    fn system_then_chain_then_input() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0").output_includes_input(true))
            .step(|s| s.input("in1").output("out1").output_includes_input(true))
            .step(|s| s.system("sys2").input("in2").completer("gpt-4o"))
            .build();
        let messages = build_messages(&chain[2], &chain).unwrap();
        assert_eq!(
            contents(&messages),
            ["sys2", "in0", "out0", "in1", "out1", "in2"]
        );
        assert_eq!(messages[0].role, PromptRole::System);
        assert_eq!(messages[5].role, PromptRole::User);
    }

    #[test]
    fn chain_skipped_when_target_excludes_previous() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0"))
            .step(|s| {
                s.input("in1")
                    .completer("gpt-4o")
                    .input_includes_previous(false)
            })
            .build();
        assert_eq!(contents(&build_messages(&chain[1], &chain).unwrap()), ["in1"]);
    }

    #[test]
    fn target_roles_are_normalised() {
        let chain = ChainBuilder::new()
            .step(|s| {
                s.input_with_role(PromptRole::Assistant, "seeded")
                    .completer("gpt-4o")
            })
            .build();
        let messages = build_messages(&chain[0], &chain).unwrap();
        assert_eq!(messages[0].role, PromptRole::User);
    }

    #[test]
    fn assembly_is_deterministic() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0").output_includes_input(true))
            .step(|s| s.input("in1").completer("gpt-4o"))
            .build();
        assert_eq!(
            build_messages(&chain[1], &chain).unwrap(),
            build_messages(&chain[1], &chain).unwrap()
        );
    }

    #[test]
    fn request_carries_completer_parameters() {
        let mut chain = ChainBuilder::new()
            .step(|s| s.input("q").completer("gpt-4o-mini"))
            .build();
        if let Some(c) = chain[0].completer.as_mut() {
            c.temperature = 0.3;
            c.stop = "END".into();
        }
        let request = build_request(&chain[0], &chain).unwrap();
        assert_eq!(request.model, "gpt-4o-mini");
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(request.stop_sequence(), Some("END"));
        assert_eq!(contents(&request.messages), ["q"]);
    }
}
