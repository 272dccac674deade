// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Falzwerk: Core types, configuration, progress and error definitions shared
// across all crates.

pub mod config;
pub mod error;
pub mod integrity;
pub mod progress;
pub mod types;

pub use config::{EncodingConfig, EngineConfig, RasterConfig, RenderConfig};
pub use error::{FalzwerkError, Result};
pub use progress::{CancelToken, OperationContext, ProgressFn, ProgressTracker};
pub use types::*;
