//! Position-tracking handle for searching and editing one instruction stream.
//!
//! The cursor holds the stream by exclusive borrow for its whole lifetime, so nothing else can
//! shift positions underneath it and plain indices stay valid between operations.

use crate::pattern::Matcher;
use crate::{Error, Result};
use ilweave_core::{ExternRef, InstrId, Instruction, InstructionStream, StackEffect, ValueSource};
use std::sync::Arc;

/// Where the cursor currently points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Before the first instruction, no search performed yet.
    Unset,
    /// On the instruction at this position.
    Matched(usize),
    /// Between instructions, before the instruction at this position.
    Gap(usize),
    /// A search ran off the end of the stream.
    Exhausted,
}

/// What the last `remove_current` left behind for the insertion that follows it.
#[derive(Debug)]
struct PendingRemoval {
    effect: Option<StackEffect>,
    /// Branches that targeted the removed instruction.
    redirected: Vec<InstrId>,
    /// Where those branches point right now (the successor, or the removed id at the end).
    redirected_to: InstrId,
}

#[derive(Debug)]
pub struct Cursor<'a> {
    stream: &'a mut InstructionStream,
    state: CursorState,
    pending: Option<PendingRemoval>,
}

impl<'a> Cursor<'a> {
    pub fn new(stream: &'a mut InstructionStream) -> Self {
        Self {
            stream,
            state: CursorState::Unset,
            pending: None,
        }
    }

    /// Read access to the stream being edited.
    pub fn stream(&self) -> &InstructionStream {
        &*self.stream
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Position of the current instruction, if the cursor is on one.
    pub fn index(&self) -> Option<usize> {
        match self.state {
            CursorState::Matched(index) => Some(index),
            _ => None,
        }
    }

    pub fn current(&self) -> Option<&Instruction> {
        self.index().and_then(|index| self.stream.get(index))
    }

    /// Moves the cursor before the first instruction. Also resets an exhausted search.
    pub fn seek_first(&mut self) {
        self.state = CursorState::Unset;
        self.pending = None;
    }

    /// Moves onto the instruction at `index`. Returns false, leaving the cursor unchanged, when
    /// `index` is outside the stream.
    pub fn seek_to(&mut self, index: usize) -> bool {
        if index >= self.stream.len() {
            return false;
        }
        self.pending = None;
        self.state = CursorState::Matched(index);
        true
    }

    /// Advances to the next instruction accepted by `matcher`.
    ///
    /// The scan starts right after the current instruction, or at the instruction following the
    /// current gap. The first match wins. When nothing matches, the cursor becomes
    /// [`CursorState::Exhausted`] and every later call returns false without scanning until
    /// [`seek_first`](Self::seek_first) is called. The stream is never modified.
    pub fn find_next<M: Matcher + ?Sized>(&mut self, matcher: &M) -> bool {
        let Some(start) = self.scan_start() else {
            return false;
        };
        self.pending = None;

        let found = (start..self.stream.len())
            .find(|&index| self.stream.get(index).is_some_and(|i| matcher.matches(i)));
        self.settle(start, found)
    }

    /// Advances to the next window of consecutive instructions accepted by `window`, in order.
    /// The cursor lands on the first instruction of the window.
    ///
    /// An empty window never matches and leaves the cursor where it was.
    pub fn find_next_sequence(&mut self, window: &[&dyn Matcher]) -> bool {
        if window.is_empty() {
            return false;
        }
        let Some(start) = self.scan_start() else {
            return false;
        };
        self.pending = None;

        let len = self.stream.len();
        let found = (start..len)
            .take_while(|&index| index + window.len() <= len)
            .find(|&index| {
                window.iter().enumerate().all(|(offset, matcher)| {
                    self.stream
                        .get(index + offset)
                        .is_some_and(|i| matcher.matches(i))
                })
            });
        self.settle(start, found)
    }

    /// Moves `delta` instructions forward (or backward when negative) and lands on an
    /// instruction. From a gap, `+1` lands on the instruction right after it and `-1` on the one
    /// right before it. Returns false, leaving the cursor unchanged, when the target is outside
    /// the stream.
    pub fn move_by(&mut self, delta: isize) -> bool {
        let target = match self.state {
            CursorState::Matched(index) => index as isize + delta,
            CursorState::Gap(index) if delta > 0 => index as isize + delta - 1,
            CursorState::Gap(index) => index as isize + delta,
            CursorState::Unset if delta > 0 => delta - 1,
            CursorState::Unset | CursorState::Exhausted => return false,
        };
        if target < 0 || target as usize >= self.stream.len() {
            return false;
        }
        self.pending = None;
        self.state = CursorState::Matched(target as usize);
        true
    }

    /// Removes the instruction under the cursor and leaves the cursor in the gap it occupied.
    ///
    /// Branches that targeted the removed instruction are redirected to the instruction that now
    /// follows the gap; if an insertion at this gap comes next, they are moved on to the inserted
    /// instruction instead.
    ///
    /// # Errors
    /// `NoCurrentInstruction` unless the cursor is on an instruction.
    pub fn remove_current(&mut self) -> Result<Instruction> {
        let CursorState::Matched(index) = self.state else {
            tracing::warn!(
                "remove_current in {} with no current instruction ({:?})",
                self.stream.method(),
                self.state
            );
            return Err(Error::NoCurrentInstruction);
        };

        let effect = self
            .stream
            .get(index)
            .and_then(|instruction| self.stream.stack_effect(instruction));
        let (removed_id, removed) = self.stream.remove(index)?;

        let (redirected, redirected_to) = match self.stream.id_at(index) {
            Some(successor) => (self.stream.retarget(removed_id, successor), successor),
            None => (self.stream.referrers(removed_id), removed_id),
        };
        tracing::debug!(
            "Removed `{}` at {} in {} ({} branch(es) redirected)",
            removed,
            index,
            self.stream.method(),
            redirected.len()
        );

        self.pending = Some(PendingRemoval {
            effect,
            redirected,
            redirected_to,
        });
        self.state = CursorState::Gap(index);
        Ok(removed)
    }

    /// Binds `source` as an external and inserts a `call` to it at the cursor.
    ///
    /// Directly after [`remove_current`](Self::remove_current), the removed instruction must
    /// have popped nothing and pushed exactly one value of `source.value_type()`. Anywhere else
    /// the stack is only checked when the stream is committed.
    ///
    /// # Errors
    /// `StackEffectMismatch` when the call cannot stand in for the removed instruction. The
    /// stream is left unchanged in that case.
    pub fn insert_call(&mut self, source: Arc<dyn ValueSource>) -> Result<ExternRef> {
        if let Some(pending) = &self.pending {
            let provided = source.value_type();
            let fits = pending.effect.is_some_and(|effect| {
                effect.pops == 0 && effect.pushes == 1 && effect.pushed_type == Some(provided)
            });
            if !fits {
                let expected = pending
                    .effect
                    .map(|effect| effect.to_string())
                    .unwrap_or_else(|| "with an unknown stack effect".to_string());
                tracing::error!(
                    "Cannot replace instruction {} in {} with provider '{}' of type {}",
                    expected,
                    self.stream.method(),
                    source.name(),
                    provided
                );
                return Err(Error::StackEffectMismatch {
                    expected,
                    found: provided,
                });
            }
        }

        let name = source.name().to_string();
        let external = self.stream.bind_external(source)?;
        self.insert(Instruction::call(external))?;
        tracing::debug!("Inserted call to '{}' as {}", name, external.index());
        Ok(external)
    }

    /// Inserts `instruction` at the cursor and moves onto it.
    ///
    /// On an instruction, the new one goes before it. In a gap, it fills the gap. When unset it
    /// becomes the first instruction, and when exhausted it is appended.
    pub fn insert(&mut self, instruction: Instruction) -> Result<InstrId> {
        let at = match self.state {
            CursorState::Unset => 0,
            CursorState::Matched(index) | CursorState::Gap(index) => index,
            CursorState::Exhausted => self.stream.len(),
        };
        let id = self.stream.insert(at, instruction)?;

        if let Some(pending) = self.pending.take()
            && !pending.redirected.is_empty()
        {
            let moved = self
                .stream
                .retarget_only(&pending.redirected, pending.redirected_to, id);
            tracing::debug!("Moved {} branch(es) onto inserted instruction {}", moved, id);
        }

        self.state = CursorState::Matched(at);
        Ok(id)
    }

    fn scan_start(&self) -> Option<usize> {
        match self.state {
            CursorState::Unset => Some(0),
            CursorState::Gap(index) => Some(index),
            CursorState::Matched(index) => Some(index + 1),
            CursorState::Exhausted => None,
        }
    }

    fn settle(&mut self, start: usize, found: Option<usize>) -> bool {
        match found {
            Some(index) => {
                tracing::debug!("Matched position {} in {}", index, self.stream.method());
                self.state = CursorState::Matched(index);
                true
            }
            None => {
                tracing::debug!(
                    "No match from {} to the end of {}",
                    start,
                    self.stream.method()
                );
                self.state = CursorState::Exhausted;
                false
            }
        }
    }
}
