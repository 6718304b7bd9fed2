// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The time-stepping engine.
//!
//! Every step runs the same fixed sequence: parameters (characteristics
//! first), junction flushing, link flows, then compartment updates into
//! the next slot.  Time index 0 is primed with an extra parameter pass so
//! that junction contents left by initialization are drained before the
//! first flows are computed.

use smallvec::SmallVec;
use tracing::{debug, info};

use crate::common::Result;
use crate::datamodel::Units;
use crate::model::Model;
use crate::population::Population;
use crate::sim_err;
use crate::variable::CompId;

impl Model {
    /// process runs the model from time index 0 to the end of the time
    /// grid.  A finished model is left untouched.
    pub fn process(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let steps = self.tvec.len();
        info!(populations = self.pops.len(), steps, "run started");

        self.update_pars();
        self.update_junctions()?;
        self.update_pars();
        self.update_links()?;

        while self.ti + 1 < steps {
            self.update_comps();
            self.ti += 1;
            self.update_pars();
            self.update_junctions()?;
            self.update_links()?;
        }

        self.update_outputs();
        for pop in self.pops.iter_mut() {
            pop.set_finished();
        }
        self.finished = true;

        info!(t = self.tvec[self.ti], "run finished");
        Ok(())
    }

    /// update_pars recomputes every dependent characteristic and dynamic
    /// parameter at the current time index, applying program overrides
    /// inside the program window.
    pub fn update_pars(&mut self) {
        let ti = self.ti;
        let t = self.tvec[ti];
        let dt = self.dt;
        let overrides = match (self.programs.as_mut(), self.settings.programs) {
            (Some(cache), Some(window)) if window.contains(t) => Some(cache.get(ti, t)),
            _ => None,
        };
        for pop in self.pops.iter_mut() {
            pop.update_pars(ti, t, dt, overrides);
        }
    }

    /// update_junctions drains every junction at the current time index
    /// into its destinations, repeating until no junction receives
    /// anything.  Shares are read from the previous time index.
    pub fn update_junctions(&mut self) -> Result<()> {
        let ti = self.ti;
        let par_ti = ti.saturating_sub(1);
        let limit = self.settings.iteration_limit;

        let mut passes = 0;
        loop {
            if passes >= limit {
                return sim_err!(
                    JunctionIterationLimit,
                    format!(
                        "junctions still receiving people after {} passes at ti={} (t={}), check for a junction cycle",
                        limit, ti, self.tvec[ti]
                    )
                );
            }
            passes += 1;

            let mut again = false;
            for p in 0..self.pops.len() {
                for idx in 0..self.pops[p].junction_order.len() {
                    let j = self.pops[p].junction_order[idx];
                    let moves = self.pops[p].flush_junction(j, ti, par_ti, self.tvec[ti])?;
                    for (dest, amount) in moves {
                        let comp = &mut self.pops[dest.pop].comps[dest.idx];
                        comp.vals[ti] += amount;
                        if comp.is_junction && amount > 0.0 {
                            again = true;
                        }
                    }
                }
            }
            if !again {
                break;
            }
        }

        if passes > 1 {
            debug!(ti, passes, "junctions flushed");
        }
        Ok(())
    }

    /// update_links computes every link's flow at the current time index:
    /// ordinary compartments first, then junctions upstream-first passing
    /// their inflow straight through.
    pub fn update_links(&mut self) -> Result<()> {
        let ti = self.ti;
        let t = self.tvec[ti];
        let dt = self.dt;
        let total_alive: f64 = self.pops.iter().map(|pop| pop.total_alive(ti)).sum();

        for pop in self.pops.iter_mut() {
            pop.update_outflows(ti, t, dt, total_alive)?;
        }

        for pop in self.pops.iter_mut() {
            pop.clear_junction_links(ti);
        }
        for p in 0..self.pops.len() {
            for idx in 0..self.pops[p].junction_order.len() {
                let j = self.pops[p].junction_order[idx];
                let inflow: f64 = self.pops[p].comps[j]
                    .inlinks
                    .iter()
                    .map(|id| self.pops[id.pop].links[id.idx].vals[ti])
                    .sum();
                self.pops[p].pass_through(j, ti, t, inflow)?;
            }
        }
        Ok(())
    }

    /// update_comps moves every link's flow at the current time index into
    /// the next slot of its compartments.
    pub fn update_comps(&mut self) {
        let ti = self.ti;
        if ti + 1 >= self.tvec.len() {
            return;
        }

        for pop in self.pops.iter_mut() {
            for comp in pop.comps.iter_mut() {
                comp.vals[ti + 1] = comp.vals[ti];
            }
        }
        for p in 0..self.pops.len() {
            for l in 0..self.pops[p].links.len() {
                let (source, dest, flow) = {
                    let link = &self.pops[p].links[l];
                    (link.source, link.dest, link.vals[ti])
                };
                self.pops[source.pop].comps[source.idx].vals[ti + 1] -= flow;
                self.pops[dest.pop].comps[dest.idx].vals[ti + 1] += flow;
            }
        }
        // floating point residue
        for pop in self.pops.iter_mut() {
            for comp in pop.comps.iter_mut() {
                if comp.vals[ti + 1] < 0.0 {
                    comp.vals[ti + 1] = 0.0;
                }
            }
        }
    }

    fn update_outputs(&mut self) {
        let tvec = &self.tvec;
        let window = self.settings.programs;
        let programs = self.programs.as_ref();
        let overrides = |ti: usize| match (programs, window) {
            (Some(cache), Some(window)) if window.contains(tvec[ti]) => cache.cached(ti),
            _ => None,
        };
        for pop in self.pops.iter_mut() {
            pop.update_outputs(tvec, self.dt, overrides);
        }
    }
}

impl Population {
    /// link_value is the value of the parameter driving link `l` at `ti`,
    /// which has to be a finite number.
    fn link_value(&self, l: usize, ti: usize, t: f64) -> Result<f64> {
        let link = &self.links[l];
        let par = &self.pars[link.parameter];
        let value = par.vals[ti];
        if !value.is_finite() {
            return sim_err!(
                NonFiniteValue,
                format!(
                    "population '{}', parameter '{}' is {} at ti={} (t={}), driving the flow from '{}' to '{}'",
                    self.name,
                    par.name,
                    value,
                    ti,
                    t,
                    self.comps[link.source.idx].name,
                    self.comps[link.dest.idx].name
                )
            );
        }
        Ok(value)
    }

    fn negative_flow_err<T>(&self, l: usize, flow: f64, ti: usize, t: f64) -> Result<T> {
        let link = &self.links[l];
        sim_err!(
            NegativeFlow,
            format!(
                "population '{}', parameter '{}': negative flow {} from '{}' to '{}' at ti={} (t={})",
                self.name,
                self.pars[link.parameter].name,
                flow,
                self.comps[link.source.idx].name,
                self.comps[link.dest.idx].name,
                ti,
                t
            )
        )
    }

    fn junction_shares(&self, j: usize, ti: usize, t: f64) -> Result<SmallVec<[f64; 4]>> {
        let mut shares = SmallVec::with_capacity(self.comps[j].outlinks.len());
        for &l in self.comps[j].outlinks.iter() {
            let share = self.link_value(l, ti, t)?;
            if share < 0.0 {
                return self.negative_flow_err(l, share, ti, t);
            }
            shares.push(share);
        }
        Ok(shares)
    }

    fn zero_outflow_err<T>(&self, j: usize, ti: usize, t: f64) -> Result<T> {
        sim_err!(
            ZeroJunctionOutflow,
            format!(
                "population '{}', junction '{}': outgoing shares sum to zero at ti={} (t={})",
                self.name, self.comps[j].name, ti, t
            )
        )
    }

    /// flush_junction empties junction `j` at `ti`, returning how much
    /// goes to each destination.  Contents within tolerance of zero are
    /// discarded.
    fn flush_junction(
        &mut self,
        j: usize,
        ti: usize,
        par_ti: usize,
        t: f64,
    ) -> Result<SmallVec<[(CompId, f64); 4]>> {
        let mut moves = SmallVec::new();
        let content = self.comps[j].vals[ti];
        if content <= self.tolerance() {
            self.comps[j].vals[ti] = 0.0;
            return Ok(moves);
        }

        let shares = self.junction_shares(j, par_ti, t)?;
        let total: f64 = shares.iter().sum();
        if total == 0.0 {
            return self.zero_outflow_err(j, ti, t);
        }
        for (&l, share) in self.comps[j].outlinks.iter().zip(shares) {
            moves.push((self.links[l].dest, content * share / total));
        }
        self.comps[j].vals[ti] = 0.0;
        Ok(moves)
    }

    fn link_flow(&self, l: usize, ti: usize, t: f64, dt: f64, total_alive: f64) -> Result<f64> {
        let value = self.link_value(l, ti, t)?;
        let link = &self.links[l];
        let par = &self.pars[link.parameter];
        if value == 0.0 {
            return Ok(0.0);
        }
        let source = &self.comps[link.source.idx];

        match par.units {
            Units::Probability | Units::Fraction => {
                let p = value.clamp(0.0, 1.0);
                let stock = if source.is_source {
                    total_alive
                } else {
                    source.vals[ti]
                };
                Ok((1.0 - (1.0 - p).powf(dt)) * stock)
            }
            Units::Number => {
                let flow = value * dt;
                if flow < 0.0 {
                    return self.negative_flow_err(l, flow, ti, t);
                }
                if !link.is_transfer {
                    return Ok(flow);
                }
                let popsize = par.source_popsize(&self.comps, &self.links, ti);
                if popsize > 0.0 {
                    Ok(flow * source.vals[ti] / popsize)
                } else {
                    Ok(0.0)
                }
            }
            units => sim_err!(
                UnknownUnits,
                format!(
                    "population '{}', parameter '{}': can't turn '{}' units into a flow from '{}' at ti={} (t={})",
                    self.name, par.name, units, source.name, ti, t
                )
            ),
        }
    }

    /// update_outflows sets the flow of every link leaving an ordinary
    /// compartment, downscaling a compartment's outflows when together
    /// they would take more than its stock.
    fn update_outflows(&mut self, ti: usize, t: f64, dt: f64, total_alive: f64) -> Result<()> {
        for i in 0..self.comps.len() {
            if self.comps[i].is_junction {
                continue;
            }
            let outlinks = self.comps[i].outlinks.clone();
            let mut flows: SmallVec<[f64; 4]> = SmallVec::with_capacity(outlinks.len());
            for &l in outlinks.iter() {
                flows.push(self.link_flow(l, ti, t, dt, total_alive)?);
            }

            let comp = &self.comps[i];
            let requested: f64 = flows.iter().sum();
            let stock = comp.vals[ti].max(0.0);
            let scale = if !comp.is_source && requested > stock {
                stock / requested
            } else {
                1.0
            };
            for (&l, flow) in outlinks.iter().zip(flows) {
                self.links[l].vals[ti] = flow * scale;
            }
        }
        Ok(())
    }

    fn clear_junction_links(&mut self, ti: usize) {
        for j in 0..self.comps.len() {
            if !self.comps[j].is_junction {
                continue;
            }
            for idx in 0..self.comps[j].outlinks.len() {
                let l = self.comps[j].outlinks[idx];
                self.links[l].vals[ti] = 0.0;
            }
        }
    }

    /// pass_through splits this step's inflow into junction `j` across its
    /// outgoing links by share.
    fn pass_through(&mut self, j: usize, ti: usize, t: f64, inflow: f64) -> Result<()> {
        let shares = self.junction_shares(j, ti, t)?;
        let total: f64 = shares.iter().sum();
        if total == 0.0 {
            if inflow.abs() > self.tolerance() {
                return self.zero_outflow_err(j, ti, t);
            }
            return Ok(());
        }
        let outlinks = self.comps[j].outlinks.clone();
        for (l, share) in outlinks.into_iter().zip(shares) {
            self.links[l].vals[ti] = inflow * share / total;
        }
        Ok(())
    }
}
