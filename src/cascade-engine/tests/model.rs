// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use float_cmp::approx_eq;

use cascade_engine::common::ErrorCode;
use cascade_engine::datamodel::{
    self, ParameterSet, ParameterValues, PopulationDecl, TransferPair, TransferSpec, Units,
};
use cascade_engine::test_common::TestFramework;
use cascade_engine::{Model, Overrides, ParameterId, Settings, SimSpecs};

fn sir() -> TestFramework {
    TestFramework::new()
        .comp("sus")
        .comp("inf")
        .par_with(datamodel::Parameter {
            name: "foi".to_owned(),
            max: Some(0.3),
            units: Some(Units::Probability),
            ..datamodel::Parameter::default()
        })
        .data("foi", 0.1)
        .link("foi", "sus", "inf")
        .par("doubled_foi", Some("2 * foi"), Units::Number)
        .data("sus", 990.0)
        .data("inf", 10.0)
}

#[test]
fn program_overrides_apply_inside_window() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let programs = move |_ti: usize, _t: f64| -> Overrides {
        counter.fetch_add(1, Ordering::SeqCst);
        let mut overrides = Overrides::new();
        overrides.insert(ParameterId::new("adults", "foi"), 0.2);
        overrides
    };

    let tf = sir().with_settings(Settings::default().with_programs(2002.0, 2004.0));
    let mut model = tf.build_with_programs(Box::new(programs)).unwrap();
    model.process().unwrap();

    // asked once for each of 2002, 2002.25, ..., 2004
    assert_eq!(9, calls.load(Ordering::SeqCst));

    let pop = model.get_pop("adults").unwrap();
    let foi = &pop.par("foi").unwrap().vals;
    let doubled = &pop.par("doubled_foi").unwrap().vals;
    for (ti, &t) in model.tvec().iter().enumerate() {
        let expected = if (2002.0..=2004.0).contains(&t) { 0.2 } else { 0.1 };
        assert_eq!(expected, foi[ti], "t={t}");
        assert_eq!(2.0 * expected, doubled[ti], "t={t}");
    }
}

#[test]
fn program_overrides_are_clamped() {
    let programs = |_ti: usize, _t: f64| -> Overrides {
        let mut overrides = Overrides::new();
        overrides.insert(ParameterId::new("adults", "foi"), 0.9);
        // not a parameter anywhere; ignored
        overrides.insert(ParameterId::new("children", "foi"), 0.5);
        overrides
    };
    let tf = sir().with_settings(Settings::default().with_programs(2000.0, 2010.0));
    let mut model = tf.build_with_programs(Box::new(programs)).unwrap();
    model.process().unwrap();

    let pop = model.get_pop("adults").unwrap();
    assert!(pop.par("foi").unwrap().vals.iter().all(|&v| v == 0.3));
}

#[test]
fn programs_without_window_are_never_asked() {
    let programs = |_ti: usize, _t: f64| -> Overrides { panic!("programs aren't enabled") };
    let mut model = sir().build_with_programs(Box::new(programs)).unwrap();
    model.process().unwrap();
}

#[test]
fn programs_must_be_supplied() {
    let tf = sir().with_settings(Settings::default().with_programs(2002.0, 2004.0));
    let err = tf.build_model().unwrap_err();
    assert_eq!(ErrorCode::ProgramsNotSupplied, err.code);
}

/// children and adults of the same type, with children aging into adults
fn aging(rate: f64) -> (datamodel::Framework, ParameterSet) {
    let tf = TestFramework::new()
        .comp("sus")
        .comp("inf")
        .par("foi", None, Units::Probability)
        .data("foi", 0.1)
        .link("foi", "sus", "inf");
    let mut parset = tf.parset();
    parset.populations.push(PopulationDecl {
        name: "children".to_owned(),
        pop_type: tf.pop_type.name.clone(),
    });
    for (pop, sus, inf) in [("adults", 500.0, 0.0), ("children", 60.0, 40.0)] {
        parset.set("foi", pop, ParameterValues::constant(0.1, Units::Probability));
        parset.set("sus", pop, ParameterValues::constant(sus, Units::Number));
        parset.set("inf", pop, ParameterValues::constant(inf, Units::Number));
    }
    parset.transfers.push(TransferSpec {
        name: "aging".to_owned(),
        pairs: vec![TransferPair {
            from: "children".to_owned(),
            to: "adults".to_owned(),
            values: ParameterValues::constant(rate, Units::Number),
        }],
    });
    (tf.framework(), parset)
}

fn run(framework: &datamodel::Framework, parset: &ParameterSet) -> Model {
    let mut model = Model::build(
        framework,
        parset,
        &SimSpecs::new(2000.0, 2005.0, 0.25),
        Settings::default(),
        None,
    )
    .unwrap();
    model.process().unwrap();
    model
}

#[test]
fn transfers_move_people_in_proportion() {
    let (framework, parset) = aging(20.0);
    let model = run(&framework, &parset);
    let children = model.get_pop("children").unwrap();

    // 20 a year is 5 a quarter, taken from sus and inf by size
    let sus = children.links("sus:sus")[0].vals[0];
    let inf = children.links("inf:inf")[0].vals[0];
    assert!(approx_eq!(f64, 3.0, sus, epsilon = 1e-9));
    assert!(approx_eq!(f64, 2.0, inf, epsilon = 1e-9));
    assert_eq!(2, children.links("aging_children_to_adults:flow").len());

    // nobody enters or leaves the two populations together
    let total = |ti: usize| -> f64 { model.pops().iter().map(|p| p.total_alive(ti)).sum() };
    for ti in 0..model.tvec().len() {
        assert!(approx_eq!(f64, 600.0, total(ti), epsilon = 1e-6), "ti={ti}");
    }
}

#[test]
fn transfers_are_downscaled() {
    let (framework, parset) = aging(1e6);
    let model = run(&framework, &parset);
    let children = model.get_pop("children").unwrap();
    let adults = model.get_pop("adults").unwrap();

    // everyone leaves, but infections in the same step still land in inf
    let infected = children.links("foi:flow")[0].vals[0];
    assert!(infected > 0.0);
    let sus = children.comp("sus").unwrap().vals[1];
    assert!(approx_eq!(f64, 0.0, sus, epsilon = 1e-9));
    assert!(approx_eq!(f64, infected, children.total_alive(1), epsilon = 1e-9));
    assert!(approx_eq!(
        f64,
        600.0,
        adults.total_alive(1) + children.total_alive(1),
        epsilon = 1e-6
    ));
}

#[test]
fn transfers_need_matching_compartments() {
    let (mut framework, mut parset) = aging(20.0);
    let mut other = framework.population_types[0].clone();
    other.name = "elderly".to_owned();
    other.compartments.retain(|c| c.name != "inf");
    other.links.clear();
    other.parameters.clear();
    framework.population_types.push(other);
    parset.populations.push(PopulationDecl {
        name: "elders".to_owned(),
        pop_type: "elderly".to_owned(),
    });
    parset.set("sus", "elders", ParameterValues::constant(10.0, Units::Number));
    parset.transfers[0].pairs.push(TransferPair {
        from: "adults".to_owned(),
        to: "elders".to_owned(),
        values: ParameterValues::constant(1.0, Units::Number),
    });

    let err = Model::build(
        &framework,
        &parset,
        &SimSpecs::new(2000.0, 2005.0, 0.25),
        Settings::default(),
        None,
    )
    .unwrap_err();
    assert_eq!(ErrorCode::NotFound, err.code);
    assert!(err.get_details().unwrap().contains("'inf'"));
}
