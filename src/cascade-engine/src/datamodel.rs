// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The static inputs to a model run: the framework (what a population
//! looks like), the parameter set (data for every population) and the
//! simulation time grid.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::config_err;
use crate::series::TimeSeries;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Number,
    Fraction,
    Probability,
    Duration,
    #[default]
    Unknown,
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Units::Number => "number",
            Units::Fraction => "fraction",
            Units::Probability => "probability",
            Units::Duration => "duration",
            Units::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Compartment {
    pub name: String,
    #[serde(default)]
    pub is_source: bool,
    #[serde(default)]
    pub is_sink: bool,
    #[serde(default)]
    pub is_junction: bool,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Characteristic {
    pub name: String,
    pub includes: Vec<String>,
    #[serde(default)]
    pub denominator: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// used at every time point when the parameter set has no entry
    #[serde(default)]
    pub default_value: Option<f64>,
    /// units used when the parameter set doesn't declare any
    #[serde(default)]
    pub units: Option<Units>,
}

/// a flow edge declaration: people move from `source` to `dest` at the
/// rate given by `parameter`
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Link {
    pub parameter: String,
    pub source: String,
    pub dest: String,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct PopulationType {
    pub name: String,
    pub compartments: Vec<Compartment>,
    #[serde(default)]
    pub characteristics: Vec<Characteristic>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Framework {
    pub population_types: Vec<PopulationType>,
}

impl Framework {
    pub fn get_population_type(&self, name: &str) -> Option<&PopulationType> {
        self.population_types.iter().find(|pt| pt.name == name)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        match serde_json::from_str::<Framework>(contents) {
            Ok(framework) => Ok(framework),
            Err(err) => config_err!(BadSettings, format!("invalid framework: {err}")),
        }
    }
}

fn default_y_factor() -> f64 {
    1.0
}

/// the data for one (parameter, population) pair
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ParameterValues {
    pub series: TimeSeries,
    #[serde(default = "default_y_factor")]
    pub y_factor: f64,
    #[serde(default)]
    pub units: Option<Units>,
}

impl ParameterValues {
    pub fn new(series: TimeSeries, units: Units) -> Self {
        ParameterValues {
            series,
            y_factor: 1.0,
            units: Some(units),
        }
    }

    pub fn constant(value: f64, units: Units) -> Self {
        ParameterValues::new(TimeSeries::constant(value), units)
    }

    pub fn with_y_factor(mut self, y_factor: f64) -> Self {
        self.y_factor = y_factor;
        self
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PopulationDecl {
    pub name: String,
    pub pop_type: String,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct TransferPair {
    pub from: String,
    pub to: String,
    pub values: ParameterValues,
}

/// a kind of cross-population movement (aging, migration, ...)
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct TransferSpec {
    pub name: String,
    pub pairs: Vec<TransferPair>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct ParameterSet {
    pub populations: Vec<PopulationDecl>,
    /// keyed by parameter (or characteristic/compartment) name, then by
    /// population name
    #[serde(default)]
    pub pars: BTreeMap<String, BTreeMap<String, ParameterValues>>,
    #[serde(default)]
    pub transfers: Vec<TransferSpec>,
    #[serde(default)]
    pub contacts: BTreeMap<String, BTreeMap<String, f64>>,
}

impl ParameterSet {
    pub fn get(&self, name: &str, pop: &str) -> Option<&ParameterValues> {
        self.pars.get(name).and_then(|pops| pops.get(pop))
    }

    pub fn set(&mut self, name: &str, pop: &str, values: ParameterValues) {
        self.pars
            .entry(name.to_owned())
            .or_default()
            .insert(pop.to_owned(), values);
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        match serde_json::from_str::<ParameterSet>(contents) {
            Ok(parset) => Ok(parset),
            Err(err) => config_err!(BadSettings, format!("invalid parameter set: {err}")),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SimSpecs {
    pub start: f64,
    pub stop: f64,
    pub dt: f64,
}

impl Default for SimSpecs {
    fn default() -> Self {
        SimSpecs {
            start: 2000.0,
            stop: 2030.0,
            dt: 0.25,
        }
    }
}

impl SimSpecs {
    pub fn new(start: f64, stop: f64, dt: f64) -> Self {
        SimSpecs { start, stop, dt }
    }

    /// tvec returns the shared time grid: start, start+dt, ... up to stop.
    pub fn tvec(&self) -> Result<Vec<f64>> {
        if !(self.start.is_finite() && self.stop.is_finite() && self.dt.is_finite()) {
            return config_err!(BadSimSpecs, "non-finite simulation times".to_owned());
        }
        if self.stop < self.start {
            return config_err!(
                BadSimSpecs,
                "end time has to be after start time".to_owned()
            );
        }
        if self.dt <= 0.0 {
            return config_err!(BadSimSpecs, "dt must be greater than 0".to_owned());
        }
        let n_steps = ((self.stop - self.start) / self.dt).round() as usize;
        Ok((0..=n_steps)
            .map(|i| self.start + (i as f64) * self.dt)
            .collect())
    }
}

#[test]
fn test_tvec() {
    let tvec = SimSpecs::new(2000.0, 2001.0, 0.25).tvec().unwrap();
    assert_eq!(vec![2000.0, 2000.25, 2000.5, 2000.75, 2001.0], tvec);

    assert!(SimSpecs::new(2001.0, 2000.0, 0.25).tvec().is_err());
    assert!(SimSpecs::new(2000.0, 2001.0, 0.0).tvec().is_err());
    assert!(SimSpecs::new(2000.0, f64::INFINITY, 1.0).tvec().is_err());
}

#[test]
fn test_parameter_set_json() {
    let parset = ParameterSet::from_json(
        r#"{
            "populations": [{"name": "adults", "pop_type": "default"}],
            "pars": {
                "b_rate": {
                    "adults": {"series": {"t": [2000], "y": [0.02]}, "units": "probability"}
                }
            }
        }"#,
    )
    .unwrap();

    let values = parset.get("b_rate", "adults").unwrap();
    assert_eq!(Some(Units::Probability), values.units);
    assert_eq!(1.0, values.y_factor);
    assert!(parset.get("b_rate", "children").is_none());
    assert!(parset.transfers.is_empty());
}
