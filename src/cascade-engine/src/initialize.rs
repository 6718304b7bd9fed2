// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Initial compartment sizes.
//!
//! Data gives targets for some characteristics and compartments at the
//! start time, not the compartment sizes themselves.  Each target is a
//! row of a linear system over the unknown compartment sizes; the system
//! is solved in the least-squares sense and has to be both full rank and
//! consistent.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::common::Result;
use crate::datamodel::ParameterSet;
use crate::init_err;
use crate::population::Population;
use crate::variable::Include;

struct Row {
    /// characteristic or compartment name
    name: String,
    coeffs: Vec<f64>,
    target: f64,
}

impl Population {
    /// initialize_compartments solves for every compartment size at `t0`
    /// and writes it into slot 0.  Source and sink compartments always
    /// start empty.
    pub fn initialize_compartments(&mut self, parset: &ParameterSet, t0: f64) -> Result<()> {
        let tol = self.tolerance();

        // the unknowns: every compartment that isn't a source or sink
        let unknowns: Vec<usize> = (0..self.comps.len())
            .filter(|&i| self.comps[i].is_alive())
            .collect();
        let mut column = vec![None; self.comps.len()];
        for (col, &i) in unknowns.iter().enumerate() {
            column[i] = Some(col);
        }
        let n = unknowns.len();

        for comp in self.comps.iter_mut().filter(|c| !c.is_alive()) {
            comp.vals[0] = 0.0;
        }
        if n == 0 {
            return Ok(());
        }

        let mut rows: Vec<Row> = vec![];
        for j in 0..self.characs.len() {
            let name = &self.characs[j].name;
            let Some(value) = self.target(parset, name, t0)? else {
                continue;
            };
            let scale = match self.characs[j].denominator {
                Some(inc) => self.absolute_target(parset, inc, t0, name)?,
                None => 1.0,
            };
            let mut coeffs = vec![0.0; n];
            self.expand(Include::Charac(j), &column, &mut coeffs);
            rows.push(Row {
                name: name.clone(),
                coeffs,
                target: value * scale,
            });
        }
        for &i in unknowns.iter() {
            let name = &self.comps[i].name;
            let Some(value) = self.target(parset, name, t0)? else {
                continue;
            };
            let mut coeffs = vec![0.0; n];
            self.expand(Include::Comp(i), &column, &mut coeffs);
            rows.push(Row {
                name: name.clone(),
                coeffs,
                target: value,
            });
        }

        let m = rows.len();
        if m < n {
            return init_err!(
                RankDeficient,
                format!(
                    "population '{}': {} initialization targets for {} compartments, cannot determine unique initialization",
                    self.name, m, n
                )
            );
        }

        let a = DMatrix::from_fn(m, n, |r, c| rows[r].coeffs[c]);
        let b = DVector::from_iterator(m, rows.iter().map(|row| row.target));

        let svd = a.clone().svd(true, true);
        let max_sv = svd.singular_values.max();
        let eps = max_sv * (m.max(n) as f64) * f64::EPSILON;
        let rank = svd.rank(eps);
        if rank < n {
            return init_err!(
                RankDeficient,
                format!(
                    "population '{}': characteristics have rank {} for {} compartments, cannot determine unique initialization",
                    self.name, rank, n
                )
            );
        }
        let x = match svd.solve(&b, eps) {
            Ok(x) => x,
            Err(err) => {
                return init_err!(
                    RankDeficient,
                    format!("population '{}': {}", self.name, err)
                );
            }
        };

        let reconstructed = &a * &x;
        let residual = (&reconstructed - &b).norm();
        debug!(population = %self.name, residual, rank, "initialization solved");

        let mut mismatched = false;
        for (r, row) in rows.iter().enumerate() {
            let diff = reconstructed[r] - row.target;
            if diff.abs() > tol {
                mismatched = true;
                warn!(
                    population = %self.name,
                    target = %row.name,
                    expected = row.target,
                    reconstructed = reconstructed[r],
                    "initialization target not matched"
                );
            }
        }

        let mut negative = false;
        for (col, &i) in unknowns.iter().enumerate() {
            if x[col] < -tol {
                negative = true;
                warn!(
                    population = %self.name,
                    compartment = %self.comps[i].name,
                    value = x[col],
                    referenced_by = %self.referencing_characteristics(i).join(", "),
                    "negative initial compartment size"
                );
            }
        }

        if mismatched || residual > tol {
            return init_err!(
                InconsistentInitialization,
                format!(
                    "population '{}': initialization targets are inconsistent (residual {:e})",
                    self.name, residual
                )
            );
        }
        if negative {
            return init_err!(
                NegativeInitialization,
                format!("population '{}': negative initial popsizes", self.name)
            );
        }

        for (col, &i) in unknowns.iter().enumerate() {
            self.comps[i].vals[0] = x[col].max(0.0);
        }

        Ok(())
    }

    fn target(&self, parset: &ParameterSet, name: &str, t0: f64) -> Result<Option<f64>> {
        let Some(values) = parset.get(name, &self.name) else {
            return Ok(None);
        };
        values.series.validate(&format!(
            "population '{}', initialization target '{}'",
            self.name, name
        ))?;
        Ok(Some(values.series.value_at(t0) * values.y_factor))
    }

    /// absolute_target is the head count a denominator stands for: its
    /// own target, scaled by its denominator in turn.
    fn absolute_target(
        &self,
        parset: &ParameterSet,
        inc: Include,
        t0: f64,
        owner: &str,
    ) -> Result<f64> {
        let (name, denominator) = match inc {
            Include::Comp(i) => (&self.comps[i].name, None),
            Include::Charac(j) => (&self.characs[j].name, self.characs[j].denominator),
        };
        let Some(value) = self.target(parset, name, t0)? else {
            return init_err!(
                MissingData,
                format!(
                    "population '{}', characteristic '{}': denominator '{}' has no initialization target",
                    self.name, owner, name
                )
            );
        };
        match denominator {
            Some(inc) => Ok(value * self.absolute_target(parset, inc, t0, name)?),
            None => Ok(value),
        }
    }

    /// expand adds the compartments `inc` sums over into `coeffs`,
    /// recursing through nested characteristics.
    fn expand(&self, inc: Include, column: &[Option<usize>], coeffs: &mut [f64]) {
        match inc {
            Include::Comp(i) => {
                if let Some(col) = column[i] {
                    coeffs[col] += 1.0;
                }
            }
            Include::Charac(j) => {
                for &inner in self.characs[j].includes.iter() {
                    self.expand(inner, column, coeffs);
                }
            }
        }
    }

    /// names of the characteristics whose sum includes compartment `i`
    fn referencing_characteristics(&self, i: usize) -> Vec<String> {
        let column: Vec<Option<usize>> = (0..self.comps.len())
            .map(|c| if c == i { Some(0) } else { None })
            .collect();
        self.characs
            .iter()
            .enumerate()
            .filter(|(j, _)| {
                let mut coeffs = [0.0];
                self.expand(Include::Charac(*j), &column, &mut coeffs);
                coeffs[0] > 0.0
            })
            .map(|(_, c)| c.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use crate::common::ErrorCode;
    use crate::datamodel::Units;
    use crate::population::Population;
    use crate::test_common::TestFramework;

    fn sir() -> TestFramework {
        TestFramework::new()
            .comp_with("births", true, false, false)
            .comp("sus")
            .comp("inf")
            .comp("rec")
            .comp_with("dead", false, true, false)
            .charac("alive", &["sus", "inf", "rec"], None)
            .charac("prev", &["inf"], Some("alive"))
            .par("b_rate", None, Units::Number)
            .data("b_rate", 10.0)
            .link("b_rate", "births", "sus")
    }

    fn initialize(tf: &TestFramework) -> crate::common::Result<Population> {
        let tvec = tf.sim_specs.tvec()?;
        let parset = tf.parset();
        let mut pop = Population::gen_cascade(
            0,
            "adults",
            &tf.framework().population_types[0],
            &parset,
            &tvec,
            1e-6,
        )?;
        pop.initialize_compartments(&parset, tvec[0])?;
        Ok(pop)
    }

    fn initial(pop: &Population, name: &str) -> f64 {
        pop.comp(name).unwrap().vals[0]
    }

    #[test]
    fn test_initialize() {
        let pop = initialize(
            &sir()
                .data("alive", 1000.0)
                .data("prev", 0.1)
                .data("rec", 100.0),
        )
        .unwrap();
        assert!(approx_eq!(f64, 800.0, initial(&pop, "sus"), epsilon = 1e-9));
        assert!(approx_eq!(f64, 100.0, initial(&pop, "inf"), epsilon = 1e-9));
        assert!(approx_eq!(f64, 100.0, initial(&pop, "rec"), epsilon = 1e-9));
        assert_eq!(0.0, initial(&pop, "births"));
        assert_eq!(0.0, initial(&pop, "dead"));
    }

    #[test]
    fn test_nested_characteristics() {
        let pop = initialize(
            &sir()
                .charac("ever_infected", &["inf", "rec"], Some("alive"))
                .charac("recovered_share", &["rec"], Some("ever_infected"))
                .data("alive", 1000.0)
                .data("ever_infected", 0.5)
                .data("recovered_share", 0.2),
        )
        .unwrap();
        // ever infected = 500, of whom 100 recovered
        assert!(approx_eq!(f64, 500.0, initial(&pop, "sus"), epsilon = 1e-9));
        assert!(approx_eq!(f64, 400.0, initial(&pop, "inf"), epsilon = 1e-9));
        assert!(approx_eq!(f64, 100.0, initial(&pop, "rec"), epsilon = 1e-9));
    }

    #[test]
    fn test_initialize_errors() {
        let err = initialize(&sir().data("alive", 1000.0)).unwrap_err();
        assert_eq!(ErrorCode::RankDeficient, err.code);

        // sus + inf + rec can't be both 1000 and 1050
        let err = initialize(
            &sir()
                .data("alive", 1000.0)
                .data("sus", 900.0)
                .data("inf", 50.0)
                .data("rec", 100.0),
        )
        .unwrap_err();
        assert_eq!(ErrorCode::InconsistentInitialization, err.code);

        let err = initialize(
            &sir()
                .data("alive", 100.0)
                .data("inf", 80.0)
                .data("rec", 50.0),
        )
        .unwrap_err();
        assert_eq!(ErrorCode::NegativeInitialization, err.code);

        let err = initialize(
            &sir()
                .data("prev", 0.1)
                .data("sus", 900.0)
                .data("rec", 0.0),
        )
        .unwrap_err();
        assert_eq!(ErrorCode::MissingData, err.code);
    }

    #[test]
    fn test_referencing_characteristics() {
        let pop = initialize(
            &sir()
                .data("sus", 1.0)
                .data("inf", 2.0)
                .data("rec", 3.0),
        )
        .unwrap();
        let inf = pop.comp_idx("inf").unwrap();
        assert_eq!(
            vec!["alive".to_owned(), "prev".to_owned()],
            pop.referencing_characteristics(inf)
        );
    }
}
