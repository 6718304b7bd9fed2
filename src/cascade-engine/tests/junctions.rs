// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use float_cmp::approx_eq;

use cascade_engine::common::ErrorCode;
use cascade_engine::datamodel::Units;
use cascade_engine::test_common::TestFramework;
use cascade_engine::{Model, Settings};

/// `a` drains into junction `b`, which splits evenly into junctions `c`
/// and `d`, which split evenly into `e`, `f`, `g` and `h`.  `c` and `d`
/// start with 500 people each, and `a` and `c` both get 100 people a
/// year from outside.
fn network() -> TestFramework {
    TestFramework::new()
        .source("src")
        .comp("a")
        .junction("b")
        .junction("c")
        .junction("d")
        .comp("e")
        .comp("f")
        .comp("g")
        .comp("h")
        .par("births_a", None, Units::Number)
        .par("births_c", None, Units::Number)
        .par("a1", None, Units::Probability)
        .data("births_a", 100.0)
        .data("births_c", 100.0)
        .data("a1", 1.0)
        .link("births_a", "src", "a")
        .link("births_c", "src", "c")
        .link("a1", "a", "b")
        .split("b", "jb", "c", "d")
        .split("c", "jc", "e", "f")
        .split("d", "jd", "g", "h")
        .data("a", 0.0)
        .data("b", 0.0)
        .data("c", 500.0)
        .data("d", 500.0)
        .data("e", 125.0)
        .data("f", 125.0)
        .data("g", 125.0)
        .data("h", 125.0)
}

trait Split {
    fn split(self, junction: &str, prefix: &str, left: &str, right: &str) -> Self;
}

impl Split for TestFramework {
    fn split(self, junction: &str, prefix: &str, left: &str, right: &str) -> Self {
        let (p1, p2) = (format!("{prefix}1"), format!("{prefix}2"));
        self.par(&p1, None, Units::Fraction)
            .par(&p2, None, Units::Fraction)
            .data(&p1, 0.5)
            .data(&p2, 0.5)
            .link(&p1, junction, left)
            .link(&p2, junction, right)
    }
}

fn comp(model: &Model, name: &str) -> Vec<f64> {
    model
        .get_pop("adults")
        .unwrap()
        .comp(name)
        .unwrap()
        .vals
        .clone()
}

fn flow(model: &Model, tag: &str) -> Vec<f64> {
    let links = model.get_pop("adults").unwrap().links(tag);
    assert_eq!(1, links.len(), "{tag}");
    links[0].vals.clone()
}

fn near(expected: f64, actual: f64) -> bool {
    approx_eq!(f64, expected, actual, epsilon = 1e-9)
}

#[test]
fn junctions_are_drained_at_start() {
    let model = network().run().unwrap();

    for name in ["e", "f", "g", "h"] {
        assert!(near(375.0, comp(&model, name)[0]), "{name}");
    }
    for name in ["b", "c", "d"] {
        assert_eq!(0.0, comp(&model, name)[0], "{name}");
    }

    // births into c pass straight through in the first step
    assert!(near(12.5, flow(&model, "jc1:flow")[0]));
    assert!(near(12.5, flow(&model, "jc2:flow")[0]));
    assert!(near(0.0, flow(&model, "jd1:flow")[0]));
    assert!(near(0.0, flow(&model, "jd2:flow")[0]));
}

#[test]
fn junction_flows_stabilize() {
    let model = network().run().unwrap();

    assert!(near(25.0, flow(&model, "a1:flow")[1]));
    assert!(near(12.5, flow(&model, "jb1:flow")[1]));
    assert!(near(12.5, flow(&model, "jb2:flow")[1]));

    let steps = model.tvec().len();
    for ti in 1..steps {
        assert!(near(18.75, flow(&model, "jc1:flow")[ti]), "ti={ti}");
        assert!(near(18.75, flow(&model, "jc2:flow")[ti]), "ti={ti}");
        assert!(near(6.25, flow(&model, "jd1:flow")[ti]), "ti={ti}");
        assert!(near(6.25, flow(&model, "jd2:flow")[ti]), "ti={ti}");
    }

    for name in ["b", "c", "d"] {
        assert!(comp(&model, name).iter().all(|&v| v == 0.0), "{name}");
    }
    let e = comp(&model, "e");
    assert!(near(375.0 + 12.5 + 18.75 * (steps - 2) as f64, e[steps - 1]));
}

#[test]
fn link_lookup_by_endpoints() {
    let model = network().run().unwrap();
    let pop = model.get_pop("adults").unwrap();
    assert_eq!(2, pop.links("c:").len());
    assert_eq!(1, pop.links("c:e").len());
    assert_eq!(2, pop.links("src:").len());
    assert_eq!(2, pop.links(":c").len());
}

#[test]
fn junction_chain_needs_another_pass() {
    // with a single pass allowed, b can't empty into c and have c
    // emptied in turn
    let chain = network().data("b", 100.0).data("c", 400.0);
    let settings = Settings {
        iteration_limit: 1,
        ..Settings::default()
    };
    let err = chain.clone().with_settings(settings).run().unwrap_err();
    assert_eq!(ErrorCode::JunctionIterationLimit, err.code);

    let model = chain.run().unwrap();
    for name in ["b", "c", "d"] {
        assert_eq!(0.0, comp(&model, name)[0], "{name}");
    }
    // 100 through b splits into 50 for c and 50 for d
    assert!(near(125.0 + 225.0, comp(&model, "e")[0]));
    assert!(near(125.0 + 275.0, comp(&model, "g")[0]));
}

#[test]
fn junction_cycle_hits_iteration_limit() {
    let cycle = TestFramework::new()
        .comp("a")
        .junction("j1")
        .junction("j2")
        .par("p", None, Units::Fraction)
        .data("p", 1.0)
        .link("p", "j1", "j2")
        .link("p", "j2", "j1")
        .data("a", 10.0)
        .data("j1", 5.0)
        .data("j2", 0.0);
    let err = cycle.run().unwrap_err();
    assert_eq!(ErrorCode::JunctionIterationLimit, err.code);
    assert!(err.get_details().unwrap().contains("100 passes"));
}

#[test]
fn zero_junction_shares() {
    let tf = network().data("jc1", 0.0).data("jc2", 0.0);
    let err = tf.run().unwrap_err();
    assert_eq!(ErrorCode::ZeroJunctionOutflow, err.code);
    let details = err.get_details().unwrap();
    assert!(details.contains("junction 'c'"), "{details}");
    assert!(details.contains("ti=0"), "{details}");
}
