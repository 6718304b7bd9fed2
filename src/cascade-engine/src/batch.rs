// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Independent runs of one framework over many parameter sets.

use rayon::prelude::*;
use tracing::debug;

use crate::common::Result;
use crate::datamodel::{Framework, ParameterSet, SimSpecs};
use crate::model::Model;
use crate::programs::ProgramOverride;
use crate::settings::Settings;

/// The inputs owned by a single run.
pub struct Job {
    pub parset: ParameterSet,
    pub settings: Settings,
    pub programs: Option<Box<dyn ProgramOverride + Send>>,
}

impl Job {
    pub fn new(parset: ParameterSet, settings: Settings) -> Self {
        Job {
            parset,
            settings,
            programs: None,
        }
    }

    pub fn with_programs(mut self, programs: Box<dyn ProgramOverride + Send>) -> Self {
        self.programs = Some(programs);
        self
    }
}

/// run_many builds and processes every job on the rayon thread pool.
/// Results come back in job order.
pub fn run_many(framework: &Framework, specs: &SimSpecs, jobs: Vec<Job>) -> Vec<Result<Model>> {
    debug!(jobs = jobs.len(), "batch started");
    jobs.into_par_iter()
        .map(|job| {
            let mut model = Model::build(framework, &job.parset, specs, job.settings, job.programs)?;
            model.process()?;
            Ok(model)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::datamodel::{ParameterValues, Units};
    use crate::test_common::TestFramework;

    #[test]
    fn test_run_many() {
        let tf = TestFramework::new()
            .comp("sus")
            .comp("inf")
            .par("foi", None, Units::Probability)
            .data("foi", 0.1)
            .link("foi", "sus", "inf")
            .data("sus", 100.0)
            .data("inf", 0.0);
        let framework = tf.framework();

        let jobs: Vec<Job> = [0.0, 0.1, 0.5, -1.0]
            .iter()
            .map(|&foi| {
                let mut parset = tf.parset();
                let values = if foi < 0.0 {
                    ParameterValues::constant(foi, Units::Duration)
                } else {
                    ParameterValues::constant(foi, Units::Probability)
                };
                parset.set("foi", "adults", values);
                Job::new(parset, Settings::default())
            })
            .collect();

        let results = run_many(&framework, &tf.sim_specs, jobs);
        assert_eq!(4, results.len());

        let infected: Vec<f64> = results[..3]
            .iter()
            .map(|r| {
                let model = r.as_ref().unwrap();
                let inf = &model.get_pop("adults").unwrap().comp("inf").unwrap().vals;
                inf[inf.len() - 1]
            })
            .collect();
        assert_eq!(0.0, infected[0]);
        assert!(infected[0] < infected[1] && infected[1] < infected[2]);

        let err = results[3].as_ref().unwrap_err();
        assert_eq!(ErrorCode::UnknownUnits, err.code);
    }
}
