//! Parsing engines and backend selection.
//!
//! Two engines store canonical tables: the classic row-major engine, always
//! available, and the columnar polars engine behind the `columnar` feature.
//! Callers request a [`Backend`]; [`select`] turns it into an [`Engine`],
//! falling back to the classic engine with an advisory when columnar support
//! is not compiled in.

pub mod classic;
#[cfg(feature = "columnar")]
pub mod columnar;

use std::fmt;
use tracing::warn;

use crate::model::Backend;

const FALLBACK_ADVISORY: &str =
    "backend='arrow' requested without columnar support. Falling back to backend='pandas'";

/// Concrete engine a table is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Columnar,
    Classic,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Columnar => f.write_str("columnar"),
            Engine::Classic => f.write_str("classic"),
        }
    }
}

/// Result of resolving a requested backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub requested: Backend,
    pub engine: Engine,
    /// Non-fatal notice emitted when the request could not be honoured.
    pub advisory: Option<String>,
}

impl Selection {
    pub fn fell_back(&self) -> bool {
        self.advisory.is_some()
    }
}

/// Whether the columnar engine was compiled into this build.
pub fn columnar_available() -> bool {
    cfg!(feature = "columnar")
}

/// Resolves `requested` against the engines available in this build.
pub fn select(requested: Backend) -> Selection {
    select_with(requested, columnar_available())
}

/// Same as [`select`] with the capability probe supplied by the caller.
pub fn select_with(requested: Backend, columnar_supported: bool) -> Selection {
    match requested {
        Backend::Pandas => Selection {
            requested,
            engine: Engine::Classic,
            advisory: None,
        },
        Backend::Arrow if columnar_supported => Selection {
            requested,
            engine: Engine::Columnar,
            advisory: None,
        },
        Backend::Arrow => {
            warn!(requested = %requested, fallback = %Engine::Classic, "{FALLBACK_ADVISORY}");
            Selection {
                requested,
                engine: Engine::Classic,
                advisory: Some(FALLBACK_ADVISORY.to_string()),
            }
        }
    }
}
