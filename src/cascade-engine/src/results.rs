// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use crate::model::Model;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum VarKind {
    Compartment,
    Characteristic,
    Parameter,
    Link,
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SeriesKey {
    pub population: String,
    pub kind: VarKind,
    pub name: String,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.population, self.name)
    }
}

/// Results is an owned copy of every series in a model: compartments,
/// characteristics, parameters, and link flows summed per tag.
#[derive(Clone, PartialEq, Debug)]
pub struct Results {
    pub tvec: Vec<f64>,
    pub series: BTreeMap<SeriesKey, Vec<f64>>,
}

impl Results {
    /// get looks a series up by name, trying compartments, then
    /// characteristics, parameters and link tags.
    pub fn get(&self, population: &str, name: &str) -> Option<&[f64]> {
        [
            VarKind::Compartment,
            VarKind::Characteristic,
            VarKind::Parameter,
            VarKind::Link,
        ]
        .into_iter()
        .find_map(|kind| {
            let key = SeriesKey {
                population: population.to_owned(),
                kind,
                name: name.to_owned(),
            };
            self.series.get(&key).map(Vec::as_slice)
        })
    }

    pub fn write_tsv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "time")?;
        for key in self.series.keys() {
            write!(out, "\t{key}")?;
        }
        writeln!(out)?;

        for (ti, t) in self.tvec.iter().enumerate() {
            write!(out, "{t}")?;
            for vals in self.series.values() {
                write!(out, "\t{}", vals[ti])?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn print_tsv(&self) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(err) = self.write_tsv(&mut out) {
            eprintln!("error writing results: {err}");
        }
    }

    /// write_csv writes one row per time point, with a header naming each
    /// series `population.name`.
    #[cfg(feature = "file_io")]
    pub fn write_csv<W: Write>(&self, out: W) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut wtr = csv::Writer::from_writer(out);
        let mut header = vec!["time".to_owned()];
        header.extend(self.series.keys().map(|key| key.to_string()));
        wtr.write_record(&header)?;
        for (ti, t) in self.tvec.iter().enumerate() {
            let mut record = vec![t.to_string()];
            record.extend(self.series.values().map(|vals| vals[ti].to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl Model {
    /// results copies every series out of the model.  Lazy
    /// characteristics are computed as part of the copy.
    pub fn results(&self) -> Results {
        let mut series = BTreeMap::new();
        for pop in self.pops.iter() {
            let key = |kind: VarKind, name: &str| SeriesKey {
                population: pop.name.clone(),
                kind,
                name: name.to_owned(),
            };
            for comp in pop.comps.iter() {
                series.insert(key(VarKind::Compartment, &comp.name), comp.vals.clone());
            }
            for (j, charac) in pop.characs.iter().enumerate() {
                series.insert(
                    key(VarKind::Characteristic, &charac.name),
                    pop.characteristic_values(j).into_owned(),
                );
            }
            for par in pop.pars.iter() {
                series.insert(key(VarKind::Parameter, &par.name), par.vals.clone());
            }
            let mut flows: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
            for link in pop.links.iter() {
                let sum = flows
                    .entry(link.tag.as_str())
                    .or_insert_with(|| vec![0.0; link.vals.len()]);
                for (total, v) in sum.iter_mut().zip(link.vals.iter()) {
                    *total += v;
                }
            }
            for (tag, vals) in flows {
                series.insert(key(VarKind::Link, tag), vals);
            }
        }

        Results {
            tvec: self.tvec.clone(),
            series,
        }
    }
}
