// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::{debug, info};

use crate::common::Result;
use crate::datamodel::{Framework, ParameterSet, SimSpecs, TransferPair, TransferSpec};
use crate::population::{Population, transfer_parameter};
use crate::programs::{ProgramCache, ProgramOverride};
use crate::settings::Settings;
use crate::variable::{CompId, Link, LinkId};
use crate::{config_err, spec_err};

/// A set of populations advanced together over a shared time grid.
pub struct Model {
    pub(crate) pops: Vec<Population>,
    pub(crate) contacts: BTreeMap<String, BTreeMap<String, f64>>,
    pub(crate) tvec: Vec<f64>,
    pub(crate) dt: f64,
    /// current time index
    pub(crate) ti: usize,
    pub(crate) settings: Settings,
    pub(crate) programs: Option<ProgramCache>,
    pub(crate) finished: bool,
    pop_index: HashMap<String, usize>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("pops", &self.pops)
            .field("tvec", &self.tvec)
            .field("ti", &self.ti)
            .field("settings", &self.settings)
            .field("programs", &self.programs.is_some())
            .field("finished", &self.finished)
            .finish()
    }
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if !(settings.tolerance.is_finite() && settings.tolerance > 0.0) {
        return config_err!(
            BadSettings,
            format!("tolerance must be positive, not {}", settings.tolerance)
        );
    }
    if settings.iteration_limit == 0 {
        return config_err!(
            BadSettings,
            "junction iteration limit must be at least 1".to_owned()
        );
    }
    if let Some(window) = settings.programs {
        if window.start > window.end {
            return config_err!(
                BadSettings,
                format!(
                    "program window [{}, {}] is empty",
                    window.start, window.end
                )
            );
        }
    }
    Ok(())
}

impl Model {
    /// build instantiates every population declared in `parset`,
    /// initializes their compartments and wires the transfers between
    /// them.  The model is ready for `process`.
    pub fn build(
        framework: &Framework,
        parset: &ParameterSet,
        specs: &SimSpecs,
        settings: Settings,
        programs: Option<Box<dyn ProgramOverride + Send>>,
    ) -> Result<Model> {
        let tvec = specs.tvec()?;
        validate_settings(&settings)?;

        if settings.programs.is_some() && programs.is_none() {
            return config_err!(
                ProgramsNotSupplied,
                "program overrides are enabled in settings but no program source was supplied"
                    .to_owned()
            );
        }

        let mut model = Model {
            pops: vec![],
            contacts: BTreeMap::new(),
            dt: specs.dt,
            ti: 0,
            programs: programs.map(|source| ProgramCache::new(source, tvec.len())),
            finished: false,
            pop_index: HashMap::new(),
            tvec,
            settings,
        };

        for decl in parset.populations.iter() {
            if model.pop_index.contains_key(&decl.name) {
                return spec_err!(
                    DuplicateName,
                    format!("population '{}' is declared twice", decl.name)
                );
            }
            let Some(pop_type) = framework.get_population_type(&decl.pop_type) else {
                return spec_err!(
                    NotFound,
                    format!(
                        "population '{}': no population type named '{}'",
                        decl.name, decl.pop_type
                    )
                );
            };
            let index = model.pops.len();
            let mut pop = Population::gen_cascade(
                index,
                &decl.name,
                pop_type,
                parset,
                &model.tvec,
                model.settings.tolerance,
            )?;
            pop.initialize_compartments(parset, model.tvec[0])?;
            model.pop_index.insert(decl.name.clone(), index);
            model.pops.push(pop);
        }

        for transfer in parset.transfers.iter() {
            for pair in transfer.pairs.iter() {
                model.add_transfer(transfer, pair)?;
            }
        }

        for (from, weights) in parset.contacts.iter() {
            for name in std::iter::once(from).chain(weights.keys()) {
                if !model.pop_index.contains_key(name) {
                    return spec_err!(
                        NotFound,
                        format!("contacts: no population named '{name}'")
                    );
                }
            }
        }
        model.contacts = parset.contacts.clone();

        info!(
            populations = model.pops.len(),
            steps = model.tvec.len(),
            dt = model.dt,
            "model built"
        );

        Ok(model)
    }

    fn pop_idx(&self, name: &str, what: &str) -> Result<usize> {
        match self.pop_index.get(name) {
            Some(&p) => Ok(p),
            None => spec_err!(
                NotFound,
                format!("{what}: no population named '{name}'")
            ),
        }
    }

    /// add_transfer creates the transfer parameter in the source
    /// population and links every living, non-junction compartment to
    /// its namesake in the destination.
    fn add_transfer(&mut self, transfer: &TransferSpec, pair: &TransferPair) -> Result<()> {
        let what = format!("transfer '{}'", transfer.name);
        let from = self.pop_idx(&pair.from, &what)?;
        let to = self.pop_idx(&pair.to, &what)?;

        let name = format!("{}_{}_to_{}", transfer.name, pair.from, pair.to);
        let par = transfer_parameter(&name, &pair.values, &self.tvec)?;
        let k = self.pops[from].add_parameter(par)?;

        let sources: Vec<usize> = (0..self.pops[from].comps.len())
            .filter(|&i| {
                let comp = &self.pops[from].comps[i];
                comp.is_alive() && !comp.is_junction
            })
            .collect();
        for i in sources {
            let comp_name = &self.pops[from].comps[i].name;
            let Some(j) = self.pops[to].comp_idx(comp_name) else {
                return spec_err!(
                    NotFound,
                    format!(
                        "{what}: population '{}' has no compartment '{}'",
                        pair.to, comp_name
                    )
                );
            };
            let mut link = Link::new(
                k,
                &name,
                CompId { pop: from, idx: i },
                CompId { pop: to, idx: j },
            );
            link.is_transfer = true;
            let l = self.pops[from].add_link(link);
            self.pops[to].comps[j]
                .inlinks
                .push(LinkId { pop: from, idx: l });
        }

        let pop = &mut self.pops[from];
        if pop.pars[k].is_dynamic() {
            pop.par_order.push(k);
        }

        debug!(
            transfer = %transfer.name,
            from = %pair.from,
            to = %pair.to,
            links = self.pops[from].pars[k].links.len(),
            "transfer wired"
        );
        Ok(())
    }

    pub fn get_pop(&self, name: &str) -> Result<&Population> {
        let p = self.pop_idx(name, "lookup")?;
        Ok(&self.pops[p])
    }

    pub fn pops(&self) -> &[Population] {
        &self.pops
    }

    pub fn tvec(&self) -> &[f64] {
        &self.tvec
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// the current time index
    pub fn t_index(&self) -> usize {
        self.ti
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn contacts(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.contacts
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
