// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Common test infrastructure for building test frameworks
//!
//! This module provides a builder-based API for declaring a single
//! population type together with its data, used by unit tests,
//! integration tests and benches.

use std::collections::BTreeMap;

use crate::common::Result;
use crate::datamodel::{
    self, Framework, ParameterSet, ParameterValues, PopulationDecl, PopulationType, SimSpecs,
    Units,
};
use crate::model::Model;
use crate::programs::ProgramOverride;
use crate::series::TimeSeries;
use crate::settings::Settings;

/// Name of the single population every test framework instantiates
pub const POPULATION: &str = "adults";

/// Builder for a one-population framework and its parameter set
#[derive(Clone, Debug)]
pub struct TestFramework {
    pub pop_type: PopulationType,
    pub data: BTreeMap<String, ParameterValues>,
    pub sim_specs: SimSpecs,
    pub settings: Settings,
}

impl Default for TestFramework {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFramework {
    /// Create a new builder simulating 2000 to 2010 in quarter years
    pub fn new() -> Self {
        TestFramework {
            pop_type: PopulationType {
                name: "default".to_owned(),
                ..PopulationType::default()
            },
            data: BTreeMap::new(),
            sim_specs: SimSpecs::new(2000.0, 2010.0, 0.25),
            settings: Settings::default(),
        }
    }

    /// Set simulation time parameters
    pub fn with_sim_time(mut self, start: f64, stop: f64, dt: f64) -> Self {
        self.sim_specs = SimSpecs::new(start, stop, dt);
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Add a compartment with explicit flags
    pub fn comp_with(mut self, name: &str, is_source: bool, is_sink: bool, is_junction: bool) -> Self {
        self.pop_type.compartments.push(datamodel::Compartment {
            name: name.to_owned(),
            is_source,
            is_sink,
            is_junction,
        });
        self
    }

    /// Add an ordinary compartment
    pub fn comp(self, name: &str) -> Self {
        self.comp_with(name, false, false, false)
    }

    pub fn source(self, name: &str) -> Self {
        self.comp_with(name, true, false, false)
    }

    pub fn sink(self, name: &str) -> Self {
        self.comp_with(name, false, true, false)
    }

    pub fn junction(self, name: &str) -> Self {
        self.comp_with(name, false, false, true)
    }

    /// Add a characteristic summing `includes`, optionally divided by
    /// `denominator`
    pub fn charac(mut self, name: &str, includes: &[&str], denominator: Option<&str>) -> Self {
        self.pop_type.characteristics.push(datamodel::Characteristic {
            name: name.to_owned(),
            includes: includes.iter().map(|s| s.to_string()).collect(),
            denominator: denominator.map(|s| s.to_owned()),
        });
        self
    }

    /// Add a parameter, computed from `expression` when given and read
    /// from data otherwise
    pub fn par(self, name: &str, expression: Option<&str>, units: Units) -> Self {
        self.par_with(datamodel::Parameter {
            name: name.to_owned(),
            expression: expression.map(|s| s.to_owned()),
            units: Some(units),
            ..datamodel::Parameter::default()
        })
    }

    /// Add a fully specified parameter declaration
    pub fn par_with(mut self, decl: datamodel::Parameter) -> Self {
        self.pop_type.parameters.push(decl);
        self
    }

    pub fn link(mut self, parameter: &str, source: &str, dest: &str) -> Self {
        self.pop_type.links.push(datamodel::Link {
            parameter: parameter.to_owned(),
            source: source.to_owned(),
            dest: dest.to_owned(),
        });
        self
    }

    /// Set constant data for a parameter or an initialization target
    pub fn data(self, name: &str, value: f64) -> Self {
        self.series(name, &[0.0], &[value])
    }

    /// Set time-varying data for a parameter or an initialization target
    pub fn series(mut self, name: &str, t: &[f64], y: &[f64]) -> Self {
        self.data.insert(
            name.to_owned(),
            ParameterValues {
                series: TimeSeries::new(t.to_vec(), y.to_vec()),
                y_factor: 1.0,
                units: None,
            },
        );
        self
    }

    /// Scale existing data for `name`
    pub fn y_factor(mut self, name: &str, y_factor: f64) -> Self {
        if let Some(values) = self.data.get_mut(name) {
            values.y_factor = y_factor;
        }
        self
    }

    pub fn framework(&self) -> Framework {
        Framework {
            population_types: vec![self.pop_type.clone()],
        }
    }

    pub fn parset(&self) -> ParameterSet {
        let mut parset = ParameterSet {
            populations: vec![PopulationDecl {
                name: POPULATION.to_owned(),
                pop_type: self.pop_type.name.clone(),
            }],
            ..ParameterSet::default()
        };
        for (name, values) in self.data.iter() {
            parset.set(name, POPULATION, values.clone());
        }
        parset
    }

    pub fn build_model(&self) -> Result<Model> {
        Model::build(
            &self.framework(),
            &self.parset(),
            &self.sim_specs,
            self.settings.clone(),
            None,
        )
    }

    pub fn build_with_programs(&self, programs: Box<dyn ProgramOverride + Send>) -> Result<Model> {
        Model::build(
            &self.framework(),
            &self.parset(),
            &self.sim_specs,
            self.settings.clone(),
            Some(programs),
        )
    }

    /// Build and process the model
    pub fn run(&self) -> Result<Model> {
        let mut model = self.build_model()?;
        model.process()?;
        Ok(model)
    }
}
