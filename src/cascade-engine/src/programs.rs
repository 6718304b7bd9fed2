// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The program-spending override hook.
//!
//! While the model time is inside the configured `ProgramWindow`, the
//! engine asks the override source for replacement parameter values once
//! per time index.  A parameter named in the returned map takes that
//! value, regardless of its data or expression, before clamping.

use std::collections::HashMap;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ParameterId {
    pub population: String,
    pub parameter: String,
}

impl ParameterId {
    pub fn new(population: &str, parameter: &str) -> Self {
        ParameterId {
            population: population.to_owned(),
            parameter: parameter.to_owned(),
        }
    }
}

pub type Overrides = HashMap<ParameterId, f64>;

pub trait ProgramOverride {
    fn compute_pars(&mut self, ti: usize, t: f64) -> Overrides;
}

impl<F> ProgramOverride for F
where
    F: FnMut(usize, f64) -> Overrides,
{
    fn compute_pars(&mut self, ti: usize, t: f64) -> Overrides {
        self(ti, t)
    }
}

/// ProgramCache remembers the overrides returned for each time index so
/// the source is never asked twice about the same step.
pub(crate) struct ProgramCache {
    source: Box<dyn ProgramOverride + Send>,
    computed: Vec<Option<Overrides>>,
}

impl ProgramCache {
    pub(crate) fn new(source: Box<dyn ProgramOverride + Send>, len: usize) -> Self {
        ProgramCache {
            source,
            computed: (0..len).map(|_| None).collect(),
        }
    }

    pub(crate) fn get(&mut self, ti: usize, t: f64) -> &Overrides {
        let source = &mut self.source;
        self.computed[ti].get_or_insert_with(|| source.compute_pars(ti, t))
    }

    /// overrides already computed for `ti`, if any
    pub(crate) fn cached(&self, ti: usize) -> Option<&Overrides> {
        self.computed.get(ti).and_then(Option::as_ref)
    }
}

#[test]
fn test_program_cache() {
    let mut calls = 0;
    let source = move |ti: usize, _t: f64| -> Overrides {
        calls += 1;
        let mut overrides = Overrides::new();
        overrides.insert(ParameterId::new("adults", "b_rate"), (ti * 100 + calls) as f64);
        overrides
    };
    let mut cache = ProgramCache::new(Box::new(source), 3);
    let id = ParameterId::new("adults", "b_rate");

    assert!(cache.cached(1).is_none());
    assert_eq!(Some(&101.0), cache.get(1, 2000.25).get(&id));
    // a second query for the same index doesn't call the source again
    assert_eq!(Some(&101.0), cache.get(1, 2000.25).get(&id));
    assert_eq!(Some(&202.0), cache.get(2, 2000.5).get(&id));
    assert_eq!(Some(&101.0), cache.cached(1).and_then(|o| o.get(&id)));
}
