//! Chain walker: collects the messages that precede a block set's own input.
//!
//! The walk starts one position before the target and moves backward while
//! the flags of each visited block set say its predecessors still matter:
//!
//! 1. No block set at the cursor: stop.
//! 2. No top output: stop (nothing is contributed by this block set).
//! 3. Take the output.
//! 4. `is_output_including_input_blocks` is false: stop after the output.
//! 5. No top input and `is_input_including_previous_block_set_output` false:
//!    stop after the output.
//! 6. Take the top input, if any, ahead of the output.
//! 7. `is_input_including_previous_block_set_output` false: stop.
//! 8. Step the cursor back by one and repeat.
//!
//! Predecessors are matched by exact position, so a gap left by a deletion
//! ends the walk just like the start of the preset does.

use promptchain_core::{BlockSetId, LlmMessage, ResolvedBlockSet};
use serde::Serialize;

/// What one visited block set contributes, in walk order (newest first).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainStep {
    pub block_set_id: BlockSetId,
    pub position: i64,
    /// The block set's top input, when the walk takes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<LlmMessage>,
    pub output: LlmMessage,
}

/// Lazy backward walk over the block sets preceding a position.
///
/// Yields [`ChainStep`]s newest first. A clone continues independently from
/// the same point.
#[derive(Debug, Clone)]
pub struct PrecedingChain<'a> {
    block_sets: &'a [ResolvedBlockSet],
    cursor: Option<i64>,
}

impl<'a> PrecedingChain<'a> {
    /// Walk the block sets that precede `target_position` in `block_sets`.
    pub fn new(block_sets: &'a [ResolvedBlockSet], target_position: i64) -> Self {
        Self {
            block_sets,
            cursor: target_position.checked_sub(1),
        }
    }

    fn at(&self, position: i64) -> Option<&'a ResolvedBlockSet> {
        if position < 0 {
            return None;
        }
        self.block_sets.iter().find(|bs| bs.position() == position)
    }
}

impl Iterator for PrecedingChain<'_> {
    type Item = ChainStep;

    fn next(&mut self) -> Option<ChainStep> {
        let position = self.cursor.take()?;
        let block_set = self.at(position)?;
        let output = block_set.top_output.as_ref()?;

        let mut step = ChainStep {
            block_set_id: block_set.id(),
            position,
            input: None,
            output: output.to_message(),
        };

        let options = block_set.options();
        if !options.is_output_including_input_blocks {
            return Some(step);
        }
        if block_set.top_input.is_none() && !options.is_input_including_previous_block_set_output
        {
            return Some(step);
        }

        step.input = block_set.top_input.as_ref().map(|b| b.to_message());

        if options.is_input_including_previous_block_set_output {
            self.cursor = position.checked_sub(1);
        }
        Some(step)
    }
}

/// The messages preceding `target_position`, oldest first.
///
/// Each contributing block set's input (when taken) comes immediately before
/// its own output. Messages keep the role of the prompt block they came from.
pub fn collect_preceding_messages(
    block_sets: &[ResolvedBlockSet],
    target_position: i64,
) -> Vec<LlmMessage> {
    let steps: Vec<ChainStep> = PrecedingChain::new(block_sets, target_position).collect();
    let mut messages = Vec::with_capacity(steps.len() * 2);
    for step in steps.into_iter().rev() {
        messages.extend(step.input);
        messages.push(step.output);
    }
    messages
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
    fn target_at_zero_yields_nothing() {
        let chain = ChainBuilder::new().step(|s| s.input("in0").output("out0")).build();
        assert!(collect_preceding_messages(&chain, 0).is_empty());
    }

    #[test]
    fn missing_predecessor_yields_nothing() {
        let chain = ChainBuilder::new().step(|s| s.output("out0")).build();
        assert!(collect_preceding_messages(&chain, 5).is_empty());
    }

    #[test]
    fn predecessor_without_output_yields_nothing() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output_includes_input(true))
            .step(|s| s.input("in1"))
            .build();
        assert!(collect_preceding_messages(&chain, 1).is_empty());
    }

    #[test]
    fn output_only_when_output_excludes_input() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0").input_includes_previous(false))
            .step(|s| s.input("in1"))
            .build();
        assert_eq!(contents(&collect_preceding_messages(&chain, 1)), ["out0"]);
    }

    #[test]
    fn output_excluding_input_stops_even_if_earlier_outputs_exist() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0"))
            .step(|s| s.input("in1").output("out1"))
            .step(|s| s.input("in2"))
            .build();
        assert_eq!(contents(&collect_preceding_messages(&chain, 2)), ["out1"]);
    }

    #[test]
    fn full_chain_interleaves_input_and_output() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0").output_includes_input(true))
            .step(|s| s.input("in1").output("out1").output_includes_input(true))
            .step(|s| s.input("in2").output("out2").output_includes_input(true))
            .build();
        assert_eq!(
            contents(&collect_preceding_messages(&chain, 2)),
            ["in0", "out0", "in1", "out1"]
        );
    }

    #[test]
    fn input_without_previous_stops_after_input() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0").output_includes_input(true))
            .step(|s| {
                s.input("in1")
                    .output("out1")
                    .output_includes_input(true)
                    .input_includes_previous(false)
            })
            .step(|s| s.input("in2"))
            .build();
        assert_eq!(contents(&collect_preceding_messages(&chain, 2)), ["in1", "out1"]);
    }

    #[test]
    fn no_input_and_no_previous_keeps_output() {
        let chain = ChainBuilder::new()
            .step(|s| s.output("out0").output_includes_input(true))
            .step(|s| {
                s.output("out1")
                    .output_includes_input(true)
                    .input_includes_previous(false)
            })
            .step(|s| s.input("in2"))
            .build();
        assert_eq!(contents(&collect_preceding_messages(&chain, 2)), ["out1"]);
    }

    #[test]
    fn no_input_but_previous_keeps_walking() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0").output_includes_input(true))
            .step(|s| s.output("out1").output_includes_input(true))
            .step(|s| s.input("in2"))
            .build();
        assert_eq!(
            contents(&collect_preceding_messages(&chain, 2)),
            ["in0", "out0", "out1"]
        );
    }

    #[test]
    fn gap_ends_the_walk() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0").output_includes_input(true))
            .step(|s| s.input("in1").output("out1").output_includes_input(true))
            .step(|s| s.input("in2"))
            .remove_position(0)
            .build();
        assert_eq!(contents(&collect_preceding_messages(&chain, 2)), ["in1", "out1"]);

        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0").output_includes_input(true))
            .step(|s| s.input("in1").output("out1").output_includes_input(true))
            .step(|s| s.input("in2"))
            .remove_position(1)
            .build();
        assert!(collect_preceding_messages(&chain, 2).is_empty());
    }

    #[test]
    fn roles_come_from_the_blocks() {
        let chain = ChainBuilder::new()
            .step(|s| {
                s.input_with_role(PromptRole::System, "rules")
                    .output("answer")
                    .output_includes_input(true)
            })
            .step(|s| s.input("next"))
            .build();
        let messages = collect_preceding_messages(&chain, 1);
        assert_eq!(messages[0].role, PromptRole::System);
        assert_eq!(messages[1].role, PromptRole::Assistant);
    }

    #[test]
    fn walk_is_lazy_and_newest_first() {
        let chain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0").output_includes_input(true))
            .step(|s| s.input("in1").output("out1").output_includes_input(true))
            .step(|s| s.input("in2"))
            .build();
        let mut walk = PrecedingChain::new(&chain, 2);
        let first = walk.next().unwrap();
        assert_eq!(first.position, 1);
        assert_eq!(first.output.content, "out1");
        assert_eq!(first.input.unwrap().content, "in1");
        assert_eq!(walk.next().unwrap().position, 0);
        assert!(walk.next().is_none());
        assert!(walk.next().is_none());
    }

    #[test]
    fn repeating_flag_does_not_affect_walk() {
        let plain = ChainBuilder::new()
            .step(|s| s.input("in0").output("out0").output_includes_input(true))
            .step(|s| s.input("in1"))
            .build();
        let repeating = ChainBuilder::new()
            .step(|s| {
                s.input("in0")
                    .output("out0")
                    .output_includes_input(true)
                    .repeating(true)
            })
            .step(|s| s.input("in1"))
            .build();
        assert_eq!(
            collect_preceding_messages(&plain, 1),
            collect_preceding_messages(&repeating, 1)
        );
    }
}
