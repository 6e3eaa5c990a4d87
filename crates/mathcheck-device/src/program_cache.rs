//! Cache of built programs
//!
//! Each (builtin, precision, vector width, build options) combination is
//! built once and shared by every worker. Lookups take a read lock; a miss
//! builds outside the lock and inserts under a write lock, keeping the first
//! program when two threads race.

use std::collections::HashMap;
use std::sync::Arc;

use mathcheck_core::Precision;
use parking_lot::RwLock;

use crate::device::{Device, ProgramHandle};
use crate::error::Result;

/// Identity of a built program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub function: &'static str,
    pub precision: Precision,
    pub vector_width: u32,
    pub build_options: String,
}

impl ProgramKey {
    pub fn new(function: &'static str, precision: Precision, vector_width: u32, build_options: impl Into<String>) -> Self {
        Self {
            function,
            precision,
            vector_width,
            build_options: build_options.into(),
        }
    }
}

/// A program together with the entry point it was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltProgram {
    pub handle: ProgramHandle,
    pub kernel_name: String,
}

/// Thread-safe program cache.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: RwLock<HashMap<ProgramKey, Arc<BuiltProgram>>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached program for `key`, building it with `build` on a miss.
    ///
    /// A failed build is not cached. When two threads build the same key, the
    /// loser's program is returned to `release` so the handle does not leak.
    pub fn get_or_try_create<F, R>(&self, key: &ProgramKey, build: F, release: R) -> Result<Arc<BuiltProgram>>
    where
        F: FnOnce() -> Result<BuiltProgram>,
        R: FnOnce(ProgramHandle) -> Result<()>,
    {
        if let Some(program) = self.programs.read().get(key) {
            return Ok(Arc::clone(program));
        }

        let built = Arc::new(build()?);

        let winner = {
            let mut guard = self.programs.write();
            Arc::clone(guard.entry(key.clone()).or_insert_with(|| Arc::clone(&built)))
        };
        if winner.handle != built.handle {
            release(built.handle)?;
        }
        Ok(winner)
    }

    /// Look up without building.
    pub fn get(&self, key: &ProgramKey) -> Option<Arc<BuiltProgram>> {
        self.programs.read().get(key).cloned()
    }

    /// Release every cached program on `device` and empty the cache.
    pub fn release_all<D: Device>(&self, device: &D) -> Result<()> {
        let drained: Vec<_> = self.programs.write().drain().collect();
        tracing::debug!(count = drained.len(), "releasing cached programs");
        for (_, program) in drained {
            device.release_program(program.handle)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.programs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
