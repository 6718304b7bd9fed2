// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use proptest::prelude::*;

use cascade_engine::datamodel::{self, Units};
use cascade_engine::test_common::TestFramework;
use cascade_engine::{Model, Population};

#[derive(Clone, Debug)]
struct Rates {
    n: f64,
    prevalence: f64,
    recovered: f64,
    beta: f64,
    recovery: f64,
    death: f64,
    waning: f64,
    birth: f64,
    treated: f64,
    cured_share: f64,
    relapse_share: f64,
    dt: f64,
}

fn rates_strategy() -> impl Strategy<Value = Rates> {
    (
        (100.0..1e5f64, 0.0..0.5f64, 0.0..0.4f64, 0.0..5.0f64),
        (0.0..1.0f64, 0.0..0.3f64, 0.0..1e5f64, 0.0..0.1f64),
        (0.0..1.0f64, 0.01..1.0f64, 0.01..1.0f64),
        prop::sample::select(vec![0.1, 0.25, 0.5, 1.0]),
    )
        .prop_map(
            |(
                (n, prevalence, recovered, beta),
                (recovery, death, waning, birth),
                (treated, cured_share, relapse_share),
                dt,
            )| Rates {
                n,
                prevalence,
                recovered,
                beta,
                recovery,
                death,
                waning,
                birth,
                treated,
                cured_share,
                relapse_share,
                dt,
            },
        )
}

/// an SIR-style network with births, deaths, a count-based waning flow
/// that can ask for more people than there are, and a treatment junction
fn framework(r: &Rates) -> TestFramework {
    TestFramework::new()
        .with_sim_time(2000.0, 2010.0, r.dt)
        .source("births")
        .comp("sus")
        .comp("inf")
        .comp("rec")
        .junction("treatment")
        .sink("dead")
        .charac("alive", &["sus", "inf", "rec"], None)
        .charac("prev", &["inf"], Some("alive"))
        .par("beta", None, Units::Number)
        .par_with(datamodel::Parameter {
            name: "foi".to_owned(),
            expression: Some("beta * prev".to_owned()),
            max: Some(1.0),
            units: Some(Units::Probability),
            ..datamodel::Parameter::default()
        })
        .par("recovery", None, Units::Probability)
        .par("death", None, Units::Probability)
        .par("waning", None, Units::Number)
        .par("b_rate", None, Units::Probability)
        .par("treated", None, Units::Probability)
        .par("cured", None, Units::Fraction)
        .par("relapse", None, Units::Fraction)
        .link("b_rate", "births", "sus")
        .link("foi", "sus", "inf")
        .link("recovery", "inf", "rec")
        .link("death", "sus", "dead")
        .link("death", "inf", "dead")
        .link("death", "rec", "dead")
        .link("waning", "rec", "sus")
        .link("treated", "inf", "treatment")
        .link("cured", "treatment", "rec")
        .link("relapse", "treatment", "sus")
        .data("beta", r.beta)
        .data("recovery", r.recovery)
        .data("death", r.death)
        .data("waning", r.waning)
        .data("b_rate", r.birth)
        .data("treated", r.treated)
        .data("cured", r.cured_share)
        .data("relapse", r.relapse_share)
        .data("alive", r.n)
        .data("prev", r.prevalence)
        .data("rec", r.n * r.recovered)
        .data("treatment", 0.0)
}

fn adults(model: &Model) -> &Population {
    model.get_pop("adults").unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn compartments_stay_non_negative(r in rates_strategy()) {
        let model = framework(&r).run().unwrap();
        for comp in adults(&model).comps.iter() {
            for (ti, &v) in comp.vals.iter().enumerate() {
                prop_assert!(v >= 0.0, "{} at ti={} is {}", comp.name, ti, v);
            }
        }
    }

    #[test]
    fn people_are_conserved(r in rates_strategy()) {
        let model = framework(&r).run().unwrap();
        let pop = adults(&model);
        let tol = 1e-6 * r.n.max(1.0);

        for ti in 0..model.tvec().len() - 1 {
            let mut net = 0.0;
            for link in pop.links.iter() {
                if pop.comps[link.source.idx].is_source {
                    net += link.vals[ti];
                }
                if pop.comps[link.dest.idx].is_sink {
                    net -= link.vals[ti];
                }
            }
            let change = pop.total_alive(ti + 1) - pop.total_alive(ti);
            prop_assert!((change - net).abs() <= tol, "ti={}: change {} vs net {}", ti, change, net);
        }
    }

    #[test]
    fn junctions_are_empty(r in rates_strategy()) {
        let model = framework(&r).run().unwrap();
        let treatment = adults(&model).comp("treatment").unwrap();
        prop_assert!(treatment.vals.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn outflows_never_exceed_stock(r in rates_strategy()) {
        let model = framework(&r).run().unwrap();
        let pop = adults(&model);
        for comp in pop.comps.iter().filter(|c| !c.is_source && !c.is_junction) {
            for ti in 0..model.tvec().len() {
                let out = comp.outflow_total(&pop.links, ti);
                let stock = comp.vals[ti];
                prop_assert!(out <= stock + 1e-9 * stock.max(1.0), "{} at ti={}: {} > {}", comp.name, ti, out, stock);
            }
        }
    }

    #[test]
    fn lazy_and_eager_characteristics_agree(r in rates_strategy()) {
        // a characteristic is only materialized when something reads it;
        // reading it from an output parameter doesn't change the dynamics
        let lazy_tf = framework(&r).charac("ever_infected", &["inf", "rec"], Some("alive"));
        let eager_tf = lazy_tf.clone().par("ever_infected_share", Some("ever_infected"), Units::Fraction);

        let lazy = lazy_tf.run().unwrap();
        let eager = eager_tf.run().unwrap();
        let (lazy_pop, eager_pop) = (adults(&lazy), adults(&eager));
        let j = lazy_pop.charac_idx("ever_infected").unwrap();
        prop_assert!(!lazy_pop.characs[j].is_materialized());
        prop_assert!(eager_pop.characs[j].is_materialized());
        prop_assert_eq!(lazy_pop.characteristic_values(j), eager_pop.characteristic_values(j));
    }
}

#[test]
fn downscaled_outflow_equals_stock() {
    // waning asks for far more than is recovered
    let r = Rates {
        n: 1000.0,
        prevalence: 0.1,
        recovered: 0.2,
        beta: 0.0,
        recovery: 0.0,
        death: 0.1,
        waning: 1e6,
        birth: 0.0,
        treated: 0.0,
        cured_share: 0.5,
        relapse_share: 0.5,
        dt: 0.25,
    };
    let model = framework(&r).run().unwrap();
    let pop = adults(&model);
    let rec = pop.comp("rec").unwrap();
    let out = rec.outflow_total(&pop.links, 0);
    assert!((out - 200.0).abs() < 1e-9);
    assert!(rec.vals[1].abs() < 1e-9);
}
