//! Loading pattern models from TOML
//!
//! A model file lists one `[[patterns]]` table per concrete pattern and a
//! `[priors]` table with every transition row. Parsed models are validated
//! before they are returned, so a loaded model can go straight into
//! [`EngineBuilder::model`](crate::EngineBuilder::model).
//!
//! # Example
//!
//! ```rust
//! use stalk::prelude::*;
//!
//! let text = PatternModel::builtin().to_toml_string().unwrap();
//! let model = PatternModel::from_toml_str(&text).unwrap();
//! let engine = EngineBuilder::new().model(model).build().unwrap();
//! assert_eq!(engine.hypotheses(Pattern::LargeSpike).unwrap().len(), 7);
//! ```

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::model::PatternModel;
use crate::{ForecastError, Result};

impl PatternModel {
  /// Parse and validate a model from TOML text.
  pub fn from_toml_str(text: &str) -> Result<Self> {
    let model: PatternModel =
      toml::from_str(text).map_err(|e| ForecastError::ConfigParse(e.to_string()))?;
    model.validate()?;
    Ok(model)
  }

  /// Read, parse and validate a model file.
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
      .map_err(|e| ForecastError::ConfigRead(format!("{}: {e}", path.display())))?;
    let model = Self::from_toml_str(&text)?;
    debug!(path = %path.display(), patterns = model.patterns.len(), "pattern model loaded");
    Ok(model)
  }

  /// Serialize the model, e.g. to dump the builtin table for editing.
  pub fn to_toml_string(&self) -> Result<String> {
    toml::to_string(self).map_err(|e| ForecastError::InvalidConfig(e.to_string()))
  }
}

// ============================================================
// TESTS
// ============================================================
