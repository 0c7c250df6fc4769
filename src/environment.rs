//! Frames and environments.
//!
//! Frames live in an arena owned by the interpreter and are addressed by
//! [`FrameId`]. Closures, thunks and child frames store ids, never copies, so
//! a `set!` or `define` through one holder is visible to every other holder.
//! Frames are never freed individually; the arena lives as long as its
//! interpreter.

use crate::Error;
use crate::ast::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Source of arena tags; each `Frames` takes the next one
static NEXT_ARENA: AtomicU32 = AtomicU32::new(0);

/// Index of a frame in the arena that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    arena: u32,
    index: usize,
}

/// Whether lookup rejects the unassigned marker left by `letrec`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupPolicy {
    /// Return whatever is bound, marker included
    Plain,
    /// Fail with `UnassignedVariable` when the binding holds the marker
    #[default]
    CheckUnassigned,
}

#[derive(Debug, Default)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<FrameId>,
}

/// Arena of frames forming acyclic parent chains.
///
/// Ids are tagged with the arena that minted them. Passing an id from another
/// arena, such as a closure taken from a different interpreter, fails with
/// `EvalError` instead of reaching an unrelated frame.
#[derive(Debug)]
pub struct Frames {
    arena: u32,
    frames: Vec<Frame>,
}

impl Default for Frames {
    fn default() -> Self {
        Self::new()
    }
}

fn foreign_frame(id: FrameId) -> Error {
    Error::EvalError(format!(
        "frame #{} does not belong to this interpreter",
        id.index
    ))
}

impl Frames {
    pub fn new() -> Self {
        Frames {
            arena: NEXT_ARENA.fetch_add(1, Ordering::Relaxed),
            frames: Vec::new(),
        }
    }

    /// Create a frame with no parent
    pub fn new_root<I>(&mut self, bindings: I) -> FrameId
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.push(bindings.into_iter().collect(), None)
    }

    /// Create a child of `parent` holding the given bindings
    pub fn extend<I>(&mut self, parent: FrameId, bindings: I) -> Result<FrameId, Error>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.frame(parent)?;
        Ok(self.push(bindings.into_iter().collect(), Some(parent)))
    }

    fn push(&mut self, bindings: HashMap<String, Value>, parent: Option<FrameId>) -> FrameId {
        let id = FrameId {
            arena: self.arena,
            index: self.frames.len(),
        };
        self.frames.push(Frame { bindings, parent });
        id
    }

    fn frame(&self, id: FrameId) -> Result<&Frame, Error> {
        self.frames
            .get(id.index)
            .filter(|_| id.arena == self.arena)
            .ok_or_else(|| foreign_frame(id))
    }

    fn frame_mut(&mut self, id: FrameId) -> Result<&mut Frame, Error> {
        if id.arena != self.arena {
            return Err(foreign_frame(id));
        }
        self.frames.get_mut(id.index).ok_or_else(|| foreign_frame(id))
    }

    pub fn parent(&self, id: FrameId) -> Result<Option<FrameId>, Error> {
        Ok(self.frame(id)?.parent)
    }

    /// Number of frames allocated so far
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Innermost frame on the chain from `start` that binds `name`
    fn find(&self, start: FrameId, name: &str) -> Result<Option<FrameId>, Error> {
        let mut current = Some(start);
        while let Some(id) = current {
            let frame = self.frame(id)?;
            if frame.bindings.contains_key(name) {
                return Ok(Some(id));
            }
            current = frame.parent;
        }
        Ok(None)
    }

    /// Look up `name`, walking outward from `frame`
    pub fn lookup(&self, frame: FrameId, name: &str, policy: LookupPolicy) -> Result<Value, Error> {
        let value = match self.find(frame, name)? {
            Some(id) => self.frame(id)?.bindings.get(name),
            None => None,
        }
        .ok_or_else(|| Error::UnboundVariable(name.to_owned()))?;

        if policy == LookupPolicy::CheckUnassigned && value.is_unassigned() {
            return Err(Error::UnassignedVariable(name.to_owned()));
        }
        Ok(value.clone())
    }

    /// Assign to the innermost existing binding of `name`
    pub fn set(&mut self, frame: FrameId, name: &str, value: Value) -> Result<(), Error> {
        let id = self
            .find(frame, name)?
            .ok_or_else(|| Error::UnboundVariable(name.to_owned()))?;
        self.frame_mut(id)?.bindings.insert(name.to_owned(), value);
        Ok(())
    }

    /// Bind `name` in `frame` itself, overwriting any existing binding there
    pub fn define(
        &mut self,
        frame: FrameId,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), Error> {
        self.frame_mut(frame)?.bindings.insert(name.into(), value);
        Ok(())
    }

    /// Get all bindings visible from `frame`
    /// Returns a Vec of (name, value) pairs sorted by name, inner bindings
    /// shadowing outer ones
    pub fn all_bindings(&self, frame: FrameId) -> Result<Vec<(String, Value)>, Error> {
        let mut chain = Vec::new();
        let mut current = Some(frame);
        while let Some(id) = current {
            let frame = self.frame(id)?;
            chain.push(frame);
            current = frame.parent;
        }

        let mut bindings = HashMap::new();
        // Outermost first so inner frames override
        for frame in chain.into_iter().rev() {
            for (name, value) in &frame.bindings {
                bindings.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(result)
    }
}
