//! Merges streamed reply fragments into the open assistant message.
//!
//! The upstream streamer sometimes redelivers a prefix of text it already
//! sent. Each fragment is trimmed by the longest prefix that the accumulated
//! text already ends with, and the remainder is appended. This is a greedy
//! suffix/prefix match, not a diff: a coincidental match on repeated words at
//! the boundary is taken as an overlap, and that is the expected output.

use crate::conversation::{Conversation, TurnState};
use crate::error::Result;
use tracing::debug;

/// Byte length of the longest prefix of `fragment` that `accumulated` already
/// ends with. Lengths are compared in characters, so a prefix never splits a
/// UTF-8 sequence.
pub fn overlap_len(accumulated: &str, fragment: &str) -> usize {
    let max_overlap = accumulated.chars().count().min(fragment.chars().count());

    // End offset of the k-character prefix, for k = 1..=max_overlap.
    let prefix_ends: Vec<usize> = fragment
        .char_indices()
        .skip(1)
        .map(|(i, _)| i)
        .chain(std::iter::once(fragment.len()))
        .take(max_overlap)
        .collect();

    prefix_ends
        .into_iter()
        .rev()
        .find(|&end| accumulated.ends_with(&fragment[..end]))
        .unwrap_or(0)
}

/// Append the novel part of `fragment` to `accumulated` and return it.
pub fn merge_fragment<'f>(accumulated: &mut String, fragment: &'f str) -> &'f str {
    let overlap = overlap_len(accumulated, fragment);
    let novel = &fragment[overlap..];
    accumulated.push_str(novel);
    novel
}

/// Reconciliation context for one streamed reply.
///
/// Holds the conversation for the lifetime of the stream, so no other turn can
/// touch it meanwhile. The assistant message is opened on the first fragment.
pub struct StreamReconciler<'a> {
    conversation: &'a mut Conversation,
    fragments: usize,
    redelivered_bytes: usize,
}

impl<'a> StreamReconciler<'a> {
    pub fn new(conversation: &'a mut Conversation) -> Self {
        Self {
            conversation,
            fragments: 0,
            redelivered_bytes: 0,
        }
    }

    /// Merge one fragment and return the text it added.
    pub fn apply<'f>(&mut self, fragment: &'f str) -> Result<&'f str> {
        if self.conversation.state() == TurnState::AwaitingResponse {
            self.conversation.open_assistant_turn()?;
        }
        let message = self.conversation.open_message_mut()?;
        let novel = merge_fragment(&mut message.content, fragment);

        self.fragments += 1;
        let overlap = fragment.len() - novel.len();
        if overlap > 0 {
            self.redelivered_bytes += overlap;
            debug!(fragment = self.fragments, overlap, "dropped redelivered prefix");
        }
        Ok(novel)
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Close the streamed turn. Returns the number of fragments merged.
    pub fn finish(self) -> Result<usize> {
        self.conversation.finish_stream()?;
        debug!(
            fragments = self.fragments,
            redelivered_bytes = self.redelivered_bytes,
            "stream reconciled"
        );
        Ok(self.fragments)
    }
}
