//! Engine selection and the process-wide exclusivity guard.
//!
//! Some native engines allow only one live parse per process. [`PdfBackend`]
//! never blocks on that: [`PdfBackend::try_load`] either parses under the guard
//! or hands the payload back as [`PdfLoad::Busy`] so the caller can delegate the
//! work to a worker process.

use super::engine::{self, PdfEngine};
use super::error::PdfError;
use crate::core::config::PdfConfig;
use crate::core::mime::PDF_MIME_TYPE;
use crate::document::{Backing, PagedDocument};
use crate::{ExtractdError, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Which engine is loaded and from where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfBackendDescriptor {
    pub name: String,
    pub description: String,
    pub library_path: Option<PathBuf>,
    /// The library file was extracted to a temp location by this process.
    pub owns_library_file: bool,
}

/// Outcome of a guarded load.
#[derive(Debug)]
pub enum PdfLoad {
    Loaded(PagedDocument),
    /// The engine is in use; the payload is returned untouched.
    Busy(Backing),
}

pub struct PdfBackend {
    engine: Box<dyn PdfEngine>,
    descriptor: PdfBackendDescriptor,
    exclusive: bool,
    busy: AtomicBool,
    cleaned: AtomicBool,
}

impl PdfBackend {
    /// Resolve the configured engine by name and load it.
    pub fn select(config: &PdfConfig) -> Result<Self> {
        let engine = engine::load(config).map_err(ExtractdError::from)?;
        let exclusive = config.exclusive.unwrap_or_else(|| engine.exclusive());
        Ok(Self::with_engine(engine, exclusive))
    }

    pub fn with_engine(engine: Box<dyn PdfEngine>, exclusive: bool) -> Self {
        let descriptor = engine.descriptor();
        tracing::info!(
            engine = %descriptor.name,
            library = ?descriptor.library_path,
            exclusive,
            "PDF backend ready"
        );
        Self {
            engine,
            descriptor,
            exclusive,
            busy: AtomicBool::new(false),
            cleaned: AtomicBool::new(false),
        }
    }

    pub fn descriptor(&self) -> &PdfBackendDescriptor {
        &self.descriptor
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Non-blocking acquire of the engine. `None` while another parse holds it.
    pub fn try_acquire(&self) -> Option<EngineGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| EngineGuard { flag: &self.busy })
    }

    /// Parse `backing` in process if the engine is free. Blocking; call from a blocking task.
    pub fn try_load(&self, backing: Backing) -> Result<PdfLoad> {
        let _guard = if self.exclusive {
            match self.try_acquire() {
                Some(guard) => Some(guard),
                None => return Ok(PdfLoad::Busy(backing)),
            }
        } else {
            None
        };

        let parsed = if let Some(bytes) = backing.bytes() {
            self.engine.load(bytes)?
        } else if let Some(path) = backing.path() {
            self.engine.open(path)?
        } else {
            return Err(PdfError::InvalidPdf("document payload already released".to_string()).into());
        };

        Ok(PdfLoad::Loaded(PagedDocument::new(
            PDF_MIME_TYPE,
            parsed.pages,
            parsed.metadata,
            backing,
        )))
    }

    /// Remove a library file this process extracted. Runs at most once.
    pub fn cleanup(&self) {
        if !self.descriptor.owns_library_file || self.cleaned.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(path) = &self.descriptor.library_path {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::info!("Removed extracted PDF engine library {}", path.display()),
                Err(e) => tracing::warn!("Failed to remove extracted PDF engine library {}: {}", path.display(), e),
            }
        }
    }
}

impl std::fmt::Debug for PdfBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfBackend")
            .field("descriptor", &self.descriptor)
            .field("exclusive", &self.exclusive)
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .finish()
    }
}

/// Holds the engine until dropped.
#[derive(Debug)]
pub struct EngineGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
