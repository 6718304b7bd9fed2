// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! A deterministic, time-stepped engine moving people between
//! compartments of one or more populations.
//!
//! A `Framework` declares what a population looks like: compartments,
//! characteristics summarizing them, parameters and the links they
//! drive.  A `ParameterSet` supplies the data for each population.
//! `Model::build` instantiates and initializes every population, and
//! `Model::process` steps the whole model over the time grid.

#![forbid(unsafe_code)]

mod ast;
pub mod batch;
mod builtins;
pub mod common;
mod compiler;
pub mod datamodel;
mod initialize;
pub mod model;
mod parser;
pub mod population;
pub mod programs;
pub mod results;
pub mod series;
pub mod settings;
mod sim;
#[doc(hidden)]
pub mod test_common;
mod token;
pub mod variable;

pub use self::batch::{Job, run_many};
pub use self::common::{Error, ErrorCode, ErrorKind, Result};
pub use self::datamodel::{Framework, ParameterSet, SimSpecs, Units};
pub use self::model::Model;
pub use self::population::Population;
pub use self::programs::{Overrides, ParameterId, ProgramOverride};
pub use self::results::{Results, SeriesKey, VarKind};
pub use self::settings::{ProgramWindow, Settings};
pub use self::variable::VarRef;
