// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The instantiated entities of a population network.
//!
//! Entities live in flat per-population arenas and refer to each other by
//! index.  Within a population a plain `usize` is enough; references that
//! may cross populations (link endpoints, compartment inlinks) carry the
//! population index as well.

use std::cell::{Cell, OnceCell};

use smallvec::SmallVec;

use crate::compiler::CompiledExpr;
use crate::datamodel::Units;

/// A compartment in some population of the model.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CompId {
    pub pop: usize,
    pub idx: usize,
}

/// A link in some population of the model.  Links are stored in the
/// population their source compartment belongs to.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LinkId {
    pub pop: usize,
    pub idx: usize,
}

/// a series with every slot unset except the first
pub(crate) fn preallocated(len: usize, init: f64) -> Vec<f64> {
    let mut vals = vec![f64::NAN; len];
    if let Some(first) = vals.first_mut() {
        *first = init;
    }
    vals
}

#[derive(Debug)]
pub struct Compartment {
    pub name: String,
    pub is_source: bool,
    pub is_sink: bool,
    pub is_junction: bool,
    pub vals: Vec<f64>,
    /// indices into the owning population's links
    pub outlinks: SmallVec<[usize; 4]>,
    pub inlinks: Vec<LinkId>,
}

impl Compartment {
    pub fn new(name: &str, is_source: bool, is_sink: bool, is_junction: bool) -> Self {
        Compartment {
            name: name.to_owned(),
            is_source,
            is_sink,
            is_junction,
            vals: vec![],
            outlinks: SmallVec::new(),
            inlinks: vec![],
        }
    }

    pub fn preallocate(&mut self, len: usize, init: f64) {
        self.vals = preallocated(len, init);
    }

    /// outflow_total sums the planned flow out of this compartment at `ti`.
    pub fn outflow_total(&self, links: &[Link], ti: usize) -> f64 {
        self.outlinks.iter().map(|&l| links[l].vals[ti]).sum()
    }

    /// people in a source or sink aren't part of the modelled population
    pub fn is_alive(&self) -> bool {
        !(self.is_source || self.is_sink)
    }
}

/// Something a characteristic can sum over or divide by.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Include {
    Comp(usize),
    Charac(usize),
}

/// Storage for a characteristic's series.
///
/// A characteristic somebody reads during the run is `Materialized` and
/// written every step.  Otherwise it is `Lazy`: the series is computed
/// from the completed compartment series the first time it is read after
/// the run has finished.
#[derive(Debug)]
pub enum CharValues {
    Lazy(OnceCell<Vec<f64>>),
    Materialized(Vec<f64>),
}

#[derive(Debug)]
pub struct Characteristic {
    pub name: String,
    pub includes: Vec<Include>,
    pub denominator: Option<Include>,
    pub is_dependency: bool,
    pub values: CharValues,
}

impl Characteristic {
    pub fn new(name: &str) -> Self {
        Characteristic {
            name: name.to_owned(),
            includes: vec![],
            denominator: None,
            is_dependency: false,
            values: CharValues::Lazy(OnceCell::new()),
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self.values, CharValues::Materialized(_))
    }
}

/// characteristic_ratio divides a characteristic's sum by its
/// denominator, if it has one.  0/0 (within `tol`) is 0; x/0 is +inf.
pub(crate) fn characteristic_ratio(numerator: f64, denominator: Option<f64>, tol: f64) -> f64 {
    match denominator {
        None => numerator,
        Some(d) if d.abs() <= tol && numerator.abs() <= tol => 0.0,
        Some(d) if d == 0.0 => f64::INFINITY,
        Some(d) => numerator / d,
    }
}

/// What a parameter expression reads, resolved by name at build time.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Dep {
    Comp(usize),
    Charac(usize),
    Par(usize),
    /// every link sharing a tag; the value read is their summed flow
    /// divided by dt
    Links(Vec<usize>),
}

impl Dep {
    pub fn is_flow(&self) -> bool {
        matches!(self, Dep::Links(_))
    }
}

#[derive(Debug)]
pub struct Parameter {
    pub name: String,
    pub units: Units,
    pub scale_factor: f64,
    pub limits: (Option<f64>, Option<f64>),
    pub expression: Option<CompiledExpr>,
    /// parallel to the slots `expression` was compiled with
    pub deps: Vec<Dep>,
    pub is_dependency: bool,
    /// indices into the owning population's links
    pub links: Vec<usize>,
    pub vals: Vec<f64>,
    popsize_cache: Cell<Option<(usize, f64)>>,
}

impl Parameter {
    pub fn new(name: &str, units: Units) -> Self {
        Parameter {
            name: name.to_owned(),
            units,
            scale_factor: 1.0,
            limits: (None, None),
            expression: None,
            deps: vec![],
            is_dependency: false,
            links: vec![],
            vals: vec![],
            popsize_cache: Cell::new(None),
        }
    }

    /// a dynamic parameter is recomputed every step; anything else is an
    /// output quantity evaluated once the run is over
    pub fn is_dynamic(&self) -> bool {
        self.is_dependency || !self.links.is_empty()
    }

    pub fn depends_on_flow(&self) -> bool {
        self.deps.iter().any(Dep::is_flow)
    }

    pub fn constrain(&self, value: f64) -> f64 {
        let (min, max) = self.limits;
        let value = match min {
            Some(min) if value < min => min,
            _ => value,
        };
        match max {
            Some(max) if value > max => max,
            _ => value,
        }
    }

    /// source_popsize sums the stock at `ti` of the source compartment of
    /// every link this parameter drives.  The result is memoized per `ti`.
    pub fn source_popsize(&self, comps: &[Compartment], links: &[Link], ti: usize) -> f64 {
        if let Some((cached_ti, size)) = self.popsize_cache.get() {
            if cached_ti == ti {
                return size;
            }
        }
        let size = self
            .links
            .iter()
            .map(|&l| comps[links[l].source.idx].vals[ti])
            .sum();
        self.popsize_cache.set(Some((ti, size)));
        size
    }
}

#[derive(Debug)]
pub struct Link {
    pub parameter: usize,
    pub source: CompId,
    pub dest: CompId,
    /// shared by every link deriving from the same parameter
    pub tag: String,
    pub is_transfer: bool,
    pub vals: Vec<f64>,
}

impl Link {
    pub fn new(parameter: usize, par_name: &str, source: CompId, dest: CompId) -> Self {
        Link {
            parameter,
            source,
            dest,
            tag: format!("{par_name}:flow"),
            is_transfer: false,
            vals: vec![],
        }
    }
}

/// A borrowed view of any named entity in a population.
#[derive(Debug)]
pub enum VarRef<'a> {
    Comp(&'a Compartment),
    Charac(&'a Characteristic),
    Par(&'a Parameter),
    Links(Vec<&'a Link>),
}

#[test]
fn test_characteristic_ratio() {
    let tol = 1e-6;
    assert_eq!(30.0, characteristic_ratio(30.0, None, tol));
    assert_eq!(0.25, characteristic_ratio(25.0, Some(100.0), tol));
    assert_eq!(0.0, characteristic_ratio(0.0, Some(0.0), tol));
    assert_eq!(0.0, characteristic_ratio(1e-9, Some(1e-9), tol));
    assert_eq!(f64::INFINITY, characteristic_ratio(5.0, Some(0.0), tol));
}

#[test]
fn test_constrain() {
    let mut par = Parameter::new("p", Units::Probability);
    assert_eq!(2.0, par.constrain(2.0));
    par.limits = (Some(0.0), Some(1.0));
    assert_eq!(1.0, par.constrain(2.0));
    assert_eq!(0.0, par.constrain(-0.5));
    assert_eq!(0.5, par.constrain(0.5));
}

#[test]
fn test_source_popsize() {
    let mut comps = vec![
        Compartment::new("sus", false, false, false),
        Compartment::new("inf", false, false, false),
    ];
    comps[0].vals = vec![10.0, 20.0];
    comps[1].vals = vec![5.0, 7.0];
    let link = |src: usize| Link::new(0, "p", CompId { pop: 0, idx: src }, CompId { pop: 1, idx: src });
    let links = vec![link(0), link(1)];

    let mut par = Parameter::new("p", Units::Number);
    par.links = vec![0, 1];
    assert_eq!(15.0, par.source_popsize(&comps, &links, 0));
    assert_eq!(27.0, par.source_popsize(&comps, &links, 1));

    // memoized for the current index
    comps[0].vals[1] = 0.0;
    assert_eq!(27.0, par.source_popsize(&comps, &links, 1));
}
