// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Engine settings.
//!
//! Everything that tunes a run lives here and is handed to
//! `Model::build`; nothing is read from process-wide state.

use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::config_err;

pub const DEFAULT_TOLERANCE: f64 = 1e-6;
pub const DEFAULT_ITERATION_LIMIT: usize = 100;

/// The closed time interval during which program overrides replace
/// parameter values.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct ProgramWindow {
    pub start: f64,
    pub end: f64,
}

impl ProgramWindow {
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// absolute tolerance used for junction emptiness, the
    /// initialization residual and negative initial sizes
    pub tolerance: f64,
    /// maximum number of junction flushing passes in a single step
    pub iteration_limit: usize,
    /// when set, program overrides are active inside this window
    pub programs: Option<ProgramWindow>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tolerance: DEFAULT_TOLERANCE,
            iteration_limit: DEFAULT_ITERATION_LIMIT,
            programs: None,
        }
    }
}

impl Settings {
    pub fn from_json(contents: &str) -> Result<Self> {
        match serde_json::from_str::<Settings>(contents) {
            Ok(settings) => Ok(settings),
            Err(err) => config_err!(BadSettings, format!("invalid settings: {err}")),
        }
    }

    pub fn with_programs(mut self, start: f64, end: f64) -> Self {
        self.programs = Some(ProgramWindow { start, end });
        self
    }
}

#[test]
fn test_settings_from_json() {
    let settings = Settings::from_json("{}").unwrap();
    assert_eq!(Settings::default(), settings);

    let settings =
        Settings::from_json(r#"{"iteration_limit": 7, "programs": {"start": 2020, "end": 2030}}"#)
            .unwrap();
    assert_eq!(7, settings.iteration_limit);
    assert_eq!(DEFAULT_TOLERANCE, settings.tolerance);
    let window = settings.programs.unwrap();
    assert!(window.contains(2020.0));
    assert!(window.contains(2030.0));
    assert!(!window.contains(2030.25));

    assert!(Settings::from_json("{\"tolerance\": \"tiny\"}").is_err());
}
