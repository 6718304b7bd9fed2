// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};

use smallvec::SmallVec;
use tracing::debug;

use crate::builtins::is_0_arity_builtin_fn;
use crate::common::{Result, topo_sort};
use crate::compiler::{Env, compile};
use crate::datamodel::{self, ParameterSet, PopulationType, Units};
use crate::parser::parse;
use crate::programs::{Overrides, ParameterId};
use crate::variable::{
    CharValues, Characteristic, CompId, Compartment, Dep, Include, Link, LinkId, Parameter,
    VarRef, characteristic_ratio,
};
use crate::spec_err;

/// One population's instantiated network.
#[derive(Debug)]
pub struct Population {
    pub name: String,
    pub pop_type: String,
    /// position of this population in the model
    pub index: usize,
    pub comps: Vec<Compartment>,
    pub characs: Vec<Characteristic>,
    pub pars: Vec<Parameter>,
    pub links: Vec<Link>,

    len: usize,
    tolerance: f64,
    finished: bool,

    comp_index: HashMap<String, usize>,
    charac_index: HashMap<String, usize>,
    par_index: HashMap<String, usize>,
    link_index: HashMap<String, Vec<usize>>,

    /// materialized characteristics, dependencies first
    pub(crate) charac_order: Vec<usize>,
    /// dynamic parameters, dependencies first
    pub(crate) par_order: Vec<usize>,
    /// parameters evaluated after the run
    pub(crate) output_pars: Vec<usize>,
    /// junction compartments, upstream first
    pub(crate) junction_order: Vec<usize>,
}

impl Population {
    /// gen_cascade instantiates a population network from its type
    /// declaration and the parameter data for this population.
    ///
    /// Compartments are created first, then characteristics (created, then
    /// wired by name), then parameters with their links (created, then
    /// wired to expressions and data).
    pub fn gen_cascade(
        index: usize,
        name: &str,
        pop_type: &PopulationType,
        parset: &ParameterSet,
        tvec: &[f64],
        tolerance: f64,
    ) -> Result<Population> {
        let len = tvec.len();
        let mut pop = Population {
            name: name.to_owned(),
            pop_type: pop_type.name.clone(),
            index,
            comps: vec![],
            characs: vec![],
            pars: vec![],
            links: vec![],
            len,
            tolerance,
            finished: false,
            comp_index: HashMap::new(),
            charac_index: HashMap::new(),
            par_index: HashMap::new(),
            link_index: HashMap::new(),
            charac_order: vec![],
            par_order: vec![],
            output_pars: vec![],
            junction_order: vec![],
        };

        for decl in pop_type.compartments.iter() {
            pop.check_unique(&decl.name)?;
            let mut comp =
                Compartment::new(&decl.name, decl.is_source, decl.is_sink, decl.is_junction);
            comp.preallocate(len, 0.0);
            pop.comp_index.insert(decl.name.clone(), pop.comps.len());
            pop.comps.push(comp);
        }

        for decl in pop_type.characteristics.iter() {
            pop.check_unique(&decl.name)?;
            pop.charac_index
                .insert(decl.name.clone(), pop.characs.len());
            pop.characs.push(Characteristic::new(&decl.name));
        }
        for (j, decl) in pop_type.characteristics.iter().enumerate() {
            pop.wire_characteristic(j, decl)?;
        }

        for decl in pop_type.parameters.iter() {
            pop.check_unique(&decl.name)?;
            let units = parset
                .get(&decl.name, name)
                .and_then(|v| v.units)
                .or(decl.units)
                .unwrap_or_default();
            let mut par = Parameter::new(&decl.name, units);
            par.limits = (decl.min, decl.max);
            pop.par_index.insert(decl.name.clone(), pop.pars.len());
            pop.pars.push(par);
        }
        for decl in pop_type.links.iter() {
            pop.add_declared_link(decl)?;
        }
        for (k, decl) in pop_type.parameters.iter().enumerate() {
            pop.wire_parameter(k, decl, parset, tvec)?;
        }

        pop.finalize()?;

        debug!(
            population = name,
            compartments = pop.comps.len(),
            characteristics = pop.characs.len(),
            parameters = pop.pars.len(),
            links = pop.links.len(),
            "population built"
        );

        Ok(pop)
    }

    fn check_unique(&self, name: &str) -> Result<()> {
        if self.comp_index.contains_key(name)
            || self.charac_index.contains_key(name)
            || self.par_index.contains_key(name)
        {
            return spec_err!(
                DuplicateName,
                format!("population '{}': '{}' is declared twice", self.name, name)
            );
        }
        Ok(())
    }

    fn resolve_include(&self, name: &str, owner: &str) -> Result<Include> {
        if let Some(&i) = self.comp_index.get(name) {
            Ok(Include::Comp(i))
        } else if let Some(&j) = self.charac_index.get(name) {
            Ok(Include::Charac(j))
        } else {
            spec_err!(
                NotFound,
                format!(
                    "population '{}', characteristic '{}': no compartment or characteristic named '{}'",
                    self.name, owner, name
                )
            )
        }
    }

    fn wire_characteristic(&mut self, j: usize, decl: &datamodel::Characteristic) -> Result<()> {
        let mut includes = Vec::with_capacity(decl.includes.len());
        for name in decl.includes.iter() {
            includes.push(self.resolve_include(name, &decl.name)?);
        }
        let denominator = match decl.denominator {
            Some(ref name) => Some(self.resolve_include(name, &decl.name)?),
            None => None,
        };

        // anything a characteristic reads has to be available at every step
        for inc in includes.iter().chain(denominator.iter()) {
            if let Include::Charac(other) = *inc {
                self.characs[other].is_dependency = true;
            }
        }

        let charac = &mut self.characs[j];
        charac.includes = includes;
        charac.denominator = denominator;
        Ok(())
    }

    fn add_declared_link(&mut self, decl: &datamodel::Link) -> Result<()> {
        let not_found = |what: &str, name: &str| {
            spec_err!(
                NotFound,
                format!(
                    "population '{}', link '{}' ({} -> {}): no {} named '{}'",
                    self.name, decl.parameter, decl.source, decl.dest, what, name
                )
            )
        };
        let Some(&par) = self.par_index.get(&decl.parameter) else {
            return not_found("parameter", &decl.parameter);
        };
        let Some(&src) = self.comp_index.get(&decl.source) else {
            return not_found("compartment", &decl.source);
        };
        let Some(&dst) = self.comp_index.get(&decl.dest) else {
            return not_found("compartment", &decl.dest);
        };

        let source = CompId {
            pop: self.index,
            idx: src,
        };
        let dest = CompId {
            pop: self.index,
            idx: dst,
        };
        let link = Link::new(par, &decl.parameter, source, dest);
        let l = self.add_link(link);
        self.comps[dst].inlinks.push(LinkId {
            pop: self.index,
            idx: l,
        });
        Ok(())
    }

    /// add_link stores a link whose source is in this population.  The
    /// caller records the link on its destination compartment, which may
    /// live in another population.
    pub(crate) fn add_link(&mut self, mut link: Link) -> usize {
        let l = self.links.len();
        link.vals = vec![f64::NAN; self.len];
        self.pars[link.parameter].links.push(l);
        self.comps[link.source.idx].outlinks.push(l);
        self.link_index.entry(link.tag.clone()).or_default().push(l);
        self.links.push(link);
        l
    }

    /// add_parameter stores a data-driven parameter built outside of the
    /// population's own declarations (transfers).
    pub(crate) fn add_parameter(&mut self, par: Parameter) -> Result<usize> {
        self.check_unique(&par.name)?;
        let k = self.pars.len();
        self.par_index.insert(par.name.clone(), k);
        self.pars.push(par);
        Ok(k)
    }

    fn wire_parameter(
        &mut self,
        k: usize,
        decl: &datamodel::Parameter,
        parset: &ParameterSet,
        tvec: &[f64],
    ) -> Result<()> {
        let data = parset.get(&decl.name, &self.name);
        let len = self.len;

        let Some(ref source) = decl.expression else {
            let vals = match (data, decl.default_value) {
                (Some(values), _) => {
                    values.series.validate(&format!(
                        "population '{}', parameter '{}'",
                        self.name, decl.name
                    ))?;
                    values
                        .series
                        .interpolate(tvec)
                        .into_iter()
                        .map(|v| v * values.y_factor)
                        .collect()
                }
                (None, Some(default)) => vec![default; len],
                (None, None) => {
                    return spec_err!(
                        MissingData,
                        format!(
                            "population '{}', parameter '{}': no data, default or expression",
                            self.name, decl.name
                        )
                    );
                }
            };
            let par = &mut self.pars[k];
            par.scale_factor = data.map(|v| v.y_factor).unwrap_or(1.0);
            par.vals = vals;
            return Ok(());
        };

        let expr = match parse(source) {
            Ok(expr) => expr,
            Err(err) => {
                return spec_err!(
                    BadEquation,
                    format!(
                        "population '{}', parameter '{}': {} in '{}'",
                        self.name, decl.name, err, source
                    )
                );
            }
        };

        // declared dependencies come first so slot order is stable
        let mut names: Vec<String> = decl
            .dependencies
            .iter()
            .filter(|name| !is_0_arity_builtin_fn(name))
            .cloned()
            .collect();
        let declared = names.len();
        for ident in expr.idents() {
            if !names.contains(&ident) {
                names.push(ident);
            }
        }

        let mut deps = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            deps.push(self.resolve_dep(k, name, i < declared)?);
        }

        let compiled = match compile(&expr, &names) {
            Ok(compiled) => compiled,
            Err(err) => {
                return spec_err!(
                    UnknownDependency,
                    format!(
                        "population '{}', parameter '{}': {} in '{}'",
                        self.name, decl.name, err, source
                    )
                );
            }
        };

        let par = &mut self.pars[k];
        par.scale_factor = data.map(|v| v.y_factor).unwrap_or(1.0);
        par.expression = Some(compiled);
        par.deps = deps;
        par.vals = vec![f64::NAN; len];
        Ok(())
    }

    /// resolve_dep finds what `name` refers to.  A missing declared
    /// dependency is `NotFound`; a name only the expression uses is
    /// `UnknownDependency`.
    fn resolve_dep(&mut self, k: usize, name: &str, declared: bool) -> Result<Dep> {
        if let Some(&i) = self.comp_index.get(name) {
            return Ok(Dep::Comp(i));
        }
        if let Some(&j) = self.charac_index.get(name) {
            self.characs[j].is_dependency = true;
            return Ok(Dep::Charac(j));
        }
        if let Some(&p) = self.par_index.get(name) {
            if p == k {
                return spec_err!(
                    CircularDependency,
                    format!(
                        "population '{}', parameter '{}' depends on itself",
                        self.name, name
                    )
                );
            }
            self.pars[p].is_dependency = true;
            return Ok(Dep::Par(p));
        }
        if name.ends_with(":flow") {
            if let Some(links) = self.link_index.get(name) {
                return Ok(Dep::Links(links.clone()));
            }
        }
        let details = format!(
            "population '{}', parameter '{}': unknown dependency '{}'",
            self.name, self.pars[k].name, name
        );
        if declared {
            spec_err!(NotFound, details)
        } else {
            spec_err!(UnknownDependency, details)
        }
    }

    /// finalize checks the wired network and fixes evaluation orders.
    fn finalize(&mut self) -> Result<()> {
        for par in self.pars.iter() {
            if par.depends_on_flow() && par.is_dynamic() {
                return spec_err!(
                    DependsOnFlow,
                    format!(
                        "population '{}', parameter '{}': a parameter computed from flows can't drive links or feed other quantities",
                        self.name, par.name
                    )
                );
            }
        }

        let charac_deps = |j: usize| -> BTreeSet<usize> {
            let c = &self.characs[j];
            c.includes
                .iter()
                .chain(c.denominator.iter())
                .filter_map(|inc| match inc {
                    Include::Charac(other) => Some(*other),
                    Include::Comp(_) => None,
                })
                .collect()
        };
        // every characteristic takes part in the cycle check, even the
        // lazy ones
        let all: Vec<usize> = (0..self.characs.len()).collect();
        if let Err(j) = topo_sort(&all, charac_deps) {
            return spec_err!(
                CircularDependency,
                format!(
                    "population '{}', characteristic '{}' includes itself",
                    self.name, self.characs[j].name
                )
            );
        }
        let materialized: Vec<usize> = all
            .iter()
            .copied()
            .filter(|&j| self.characs[j].is_dependency)
            .collect();
        self.charac_order = topo_sort(&materialized, charac_deps).unwrap_or(materialized);

        let dynamic: Vec<usize> = (0..self.pars.len())
            .filter(|&k| self.pars[k].is_dynamic())
            .collect();
        let par_deps = |k: usize| -> BTreeSet<usize> {
            self.pars[k]
                .deps
                .iter()
                .filter_map(|dep| match dep {
                    Dep::Par(p) => Some(*p),
                    _ => None,
                })
                .collect()
        };
        self.par_order = match topo_sort(&dynamic, par_deps) {
            Ok(order) => order,
            Err(k) => {
                return spec_err!(
                    CircularDependency,
                    format!(
                        "population '{}', parameter '{}' is part of a dependency cycle",
                        self.name, self.pars[k].name
                    )
                );
            }
        };
        self.output_pars = (0..self.pars.len())
            .filter(|&k| !self.pars[k].is_dynamic())
            .collect();

        for &j in self.charac_order.iter() {
            self.characs[j].values = CharValues::Materialized(vec![f64::NAN; self.len]);
        }

        self.junction_order = self.upstream_junction_order();

        Ok(())
    }

    /// upstream_junction_order returns the junctions ordered so that a
    /// junction comes after every junction feeding it.  Edges that close a
    /// cycle are ignored.
    fn upstream_junction_order(&self) -> Vec<usize> {
        fn visit(
            pop: &Population,
            j: usize,
            visited: &mut HashSet<usize>,
            order: &mut Vec<usize>,
        ) {
            if !visited.insert(j) {
                return;
            }
            for inlink in pop.comps[j].inlinks.iter() {
                if inlink.pop != pop.index {
                    continue;
                }
                let src = pop.links[inlink.idx].source.idx;
                if pop.comps[src].is_junction {
                    visit(pop, src, visited, order);
                }
            }
            order.push(j);
        }

        let mut visited = HashSet::new();
        let mut order = vec![];
        for (j, comp) in self.comps.iter().enumerate() {
            if comp.is_junction {
                visit(self, j, &mut visited, &mut order);
            }
        }
        order
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn set_finished(&mut self) {
        self.finished = true;
    }

    pub(crate) fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn comp_idx(&self, name: &str) -> Option<usize> {
        self.comp_index.get(name).copied()
    }

    pub fn charac_idx(&self, name: &str) -> Option<usize> {
        self.charac_index.get(name).copied()
    }

    pub fn par_idx(&self, name: &str) -> Option<usize> {
        self.par_index.get(name).copied()
    }

    pub fn comp(&self, name: &str) -> Option<&Compartment> {
        self.comp_idx(name).map(|i| &self.comps[i])
    }

    pub fn charac(&self, name: &str) -> Option<&Characteristic> {
        self.charac_idx(name).map(|j| &self.characs[j])
    }

    pub fn par(&self, name: &str) -> Option<&Parameter> {
        self.par_idx(name).map(|k| &self.pars[k])
    }

    /// link_indices resolves a link name:
    ///
    /// * `"par:flow"`: every link with that tag
    /// * `"src:dst"`: links from compartment `src` to compartment `dst`;
    ///   an empty side matches any compartment
    /// * otherwise a parameter name, giving every link it drives
    pub fn link_indices(&self, name: &str) -> Vec<usize> {
        if name.ends_with(":flow") {
            return self.link_index.get(name).cloned().unwrap_or_default();
        }
        if let Some((src, dst)) = name.split_once(':') {
            return (0..self.links.len())
                .filter(|&l| {
                    let link = &self.links[l];
                    // transfer links join same-named compartments, so a
                    // destination in another population shares the source's name
                    let dest_name = if link.dest.pop == self.index {
                        &self.comps[link.dest.idx].name
                    } else {
                        &self.comps[link.source.idx].name
                    };
                    (src.is_empty() || self.comps[link.source.idx].name == src)
                        && (dst.is_empty() || *dest_name == dst)
                })
                .collect();
        }
        match self.par_idx(name) {
            Some(k) => self.pars[k].links.clone(),
            None => vec![],
        }
    }

    pub fn links(&self, name: &str) -> Vec<&Link> {
        self.link_indices(name)
            .into_iter()
            .map(|l| &self.links[l])
            .collect()
    }

    pub fn get_variable(&self, name: &str) -> Result<VarRef<'_>> {
        if let Some(comp) = self.comp(name) {
            return Ok(VarRef::Comp(comp));
        }
        if let Some(charac) = self.charac(name) {
            return Ok(VarRef::Charac(charac));
        }
        if let Some(par) = self.par(name) {
            return Ok(VarRef::Par(par));
        }
        let links = self.links(name);
        if !links.is_empty() {
            return Ok(VarRef::Links(links));
        }
        spec_err!(
            NotFound,
            format!("population '{}': nothing named '{}'", self.name, name)
        )
    }

    fn include_value(&self, inc: Include, ti: usize) -> f64 {
        match inc {
            Include::Comp(i) => self.comps[i].vals[ti],
            Include::Charac(j) => self.charac_at(j, ti),
        }
    }

    /// evaluate_charac computes characteristic `j` at `ti` from current
    /// compartment values.  Both storage modes go through here.
    pub(crate) fn evaluate_charac(&self, j: usize, ti: usize) -> f64 {
        let c = &self.characs[j];
        let numerator: f64 = c
            .includes
            .iter()
            .map(|&inc| self.include_value(inc, ti))
            .sum();
        let denominator = c.denominator.map(|inc| self.include_value(inc, ti));
        characteristic_ratio(numerator, denominator, self.tolerance)
    }

    fn charac_at(&self, j: usize, ti: usize) -> f64 {
        match self.characs[j].values {
            CharValues::Materialized(ref vals) => vals[ti],
            CharValues::Lazy(ref cell) => match cell.get() {
                Some(vals) => vals[ti],
                None => self.evaluate_charac(j, ti),
            },
        }
    }

    /// characteristic_values returns the full series of characteristic
    /// `j`.  Lazy series are computed on demand and cached once the run
    /// has finished.
    pub fn characteristic_values(&self, j: usize) -> Cow<'_, [f64]> {
        let compute = || -> Vec<f64> { (0..self.len).map(|ti| self.evaluate_charac(j, ti)).collect() };
        match self.characs[j].values {
            CharValues::Materialized(ref vals) => Cow::Borrowed(vals.as_slice()),
            CharValues::Lazy(ref cell) if self.finished => {
                Cow::Borrowed(cell.get_or_init(compute).as_slice())
            }
            CharValues::Lazy(_) => Cow::Owned(compute()),
        }
    }

    /// update_characteristic writes the current value of a materialized
    /// characteristic.
    pub(crate) fn update_characteristic(&mut self, j: usize, ti: usize) {
        let value = self.evaluate_charac(j, ti);
        if let CharValues::Materialized(ref mut vals) = self.characs[j].values {
            vals[ti] = value;
        }
    }

    fn dep_value(&self, dep: &Dep, ti: usize, dt: f64) -> f64 {
        match dep {
            Dep::Comp(i) => self.comps[*i].vals[ti],
            Dep::Charac(j) => self.charac_at(*j, ti),
            Dep::Par(k) => self.pars[*k].vals[ti],
            Dep::Links(links) => links.iter().map(|&l| self.links[l].vals[ti]).sum::<f64>() / dt,
        }
    }

    /// evaluate_par computes parameter `k` at `ti`: its expression (or
    /// data) times the scale factor, then any program override, then the
    /// parameter's limits.
    pub(crate) fn evaluate_par(
        &self,
        k: usize,
        ti: usize,
        t: f64,
        dt: f64,
        overrides: Option<&Overrides>,
    ) -> f64 {
        let par = &self.pars[k];
        let value = match par.expression {
            Some(ref expr) => {
                let slots: SmallVec<[f64; 8]> =
                    par.deps.iter().map(|dep| self.dep_value(dep, ti, dt)).collect();
                expr.eval(&Env {
                    slots: &slots,
                    t,
                    dt,
                }) * par.scale_factor
            }
            // data was scaled when it was interpolated
            None => par.vals[ti],
        };
        let value = match overrides {
            Some(overrides) if !overrides.is_empty() => {
                let id = ParameterId::new(&self.name, &par.name);
                overrides.get(&id).copied().unwrap_or(value)
            }
            _ => value,
        };
        par.constrain(value)
    }

    /// update_pars recomputes materialized characteristics, then dynamic
    /// parameters, at `ti`.
    pub(crate) fn update_pars(&mut self, ti: usize, t: f64, dt: f64, overrides: Option<&Overrides>) {
        for idx in 0..self.charac_order.len() {
            let j = self.charac_order[idx];
            self.update_characteristic(j, ti);
        }
        for idx in 0..self.par_order.len() {
            let k = self.par_order[idx];
            let value = self.evaluate_par(k, ti, t, dt, overrides);
            self.pars[k].vals[ti] = value;
        }
    }

    /// update_outputs fills the whole series of every output parameter.
    pub(crate) fn update_outputs<'a, F>(&mut self, tvec: &[f64], dt: f64, overrides: F)
    where
        F: Fn(usize) -> Option<&'a Overrides>,
    {
        for idx in 0..self.output_pars.len() {
            let k = self.output_pars[idx];
            for (ti, &t) in tvec.iter().enumerate() {
                let value = self.evaluate_par(k, ti, t, dt, overrides(ti));
                self.pars[k].vals[ti] = value;
            }
        }
    }

    /// total_alive sums every compartment that isn't a source or sink
    pub fn total_alive(&self, ti: usize) -> f64 {
        self.comps
            .iter()
            .filter(|c| c.is_alive())
            .map(|c| c.vals[ti])
            .sum()
    }
}

/// a parameter built from transfer data, owned by the source population
pub(crate) fn transfer_parameter(
    name: &str,
    values: &datamodel::ParameterValues,
    tvec: &[f64],
) -> Result<Parameter> {
    values
        .series
        .validate(&format!("transfer parameter '{name}'"))?;
    let mut par = Parameter::new(name, values.units.unwrap_or(Units::Number));
    par.scale_factor = values.y_factor;
    par.vals = values
        .series
        .interpolate(tvec)
        .into_iter()
        .map(|v| v * values.y_factor)
        .collect();
    Ok(par)
}
