// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::{error, result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    NotFound,
    DuplicateName,
    CircularDependency,
    DependsOnFlow,
    UnknownDependency,
    BadEquation,
    MissingData,
    BadTimeSeries,
    BadSimSpecs,
    BadSettings,
    RankDeficient,
    InconsistentInitialization,
    NegativeInitialization,
    UnknownUnits,
    ZeroJunctionOutflow,
    JunctionIterationLimit,
    NegativeFlow,
    NonFiniteValue,
    ProgramsNotSupplied,
    // equation-level codes, reported with a span
    InvalidToken,
    UnrecognizedEof,
    UnrecognizedToken,
    ExtraToken,
    UnclosedComment,
    UnclosedQuotedIdent,
    ExpectedNumber,
    UnknownBuiltin,
    BadBuiltinArgs,
    EmptyEquation,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            NotFound => "not_found",
            DuplicateName => "duplicate_name",
            CircularDependency => "circular_dependency",
            DependsOnFlow => "depends_on_flow",
            UnknownDependency => "unknown_dependency",
            BadEquation => "bad_equation",
            MissingData => "missing_data",
            BadTimeSeries => "bad_time_series",
            BadSimSpecs => "bad_sim_specs",
            BadSettings => "bad_settings",
            RankDeficient => "rank_deficient",
            InconsistentInitialization => "inconsistent_initialization",
            NegativeInitialization => "negative_initialization",
            UnknownUnits => "unknown_units",
            ZeroJunctionOutflow => "zero_junction_outflow",
            JunctionIterationLimit => "junction_iteration_limit",
            NegativeFlow => "negative_flow",
            NonFiniteValue => "non_finite_value",
            ProgramsNotSupplied => "programs_not_supplied",
            InvalidToken => "invalid_token",
            UnrecognizedEof => "unrecognized_eof",
            UnrecognizedToken => "unrecognized_token",
            ExtraToken => "extra_token",
            UnclosedComment => "unclosed_comment",
            UnclosedQuotedIdent => "unclosed_quoted_ident",
            ExpectedNumber => "expected_number",
            UnknownBuiltin => "unknown_builtin",
            BadBuiltinArgs => "bad_builtin_args",
            EmptyEquation => "empty_equation",
        };

        write!(f, "{name}")
    }
}

/// EquationError locates a problem inside a single expression string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EquationError {
    pub start: u16,
    pub end: u16,
    pub code: ErrorCode,
}

impl fmt::Display for EquationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Specification,
    Initialization,
    Simulation,
    Configuration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Specification => "SpecificationError",
            ErrorKind::Initialization => "InitializationError",
            ErrorKind::Simulation => "SimulationError",
            ErrorKind::Configuration => "ConfigurationError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;
pub type EquationResult<T> = result::Result<T, EquationError>;

#[macro_export]
macro_rules! spec_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Specification,
            ErrorCode::$code,
            Some($str),
        ))
    }};
}

#[macro_export]
macro_rules! init_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Initialization,
            ErrorCode::$code,
            Some($str),
        ))
    }};
}

#[macro_export]
macro_rules! sim_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Simulation,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Simulation, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! config_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Configuration,
            ErrorCode::$code,
            Some($str),
        ))
    }};
}

#[macro_export]
macro_rules! eqn_err(
    ($code:tt, $start:expr, $end:expr) => {{
        use $crate::common::{EquationError, ErrorCode};
        Err(EquationError{ start: $start, end: $end, code: ErrorCode::$code})
    }}
);

/// topo_sort orders `runlist` so that every entry comes after the
/// entries it depends on.  `deps(i)` returns the direct dependencies of
/// entry `i`; only dependencies that are themselves in the runlist are
/// followed.  Ties are broken by runlist order.  On a cycle the error
/// holds the entry at which the cycle was detected.
pub fn topo_sort<F>(runlist: &[usize], deps: F) -> result::Result<Vec<usize>, usize>
where
    F: Fn(usize) -> BTreeSet<usize>,
{
    let members: HashSet<usize> = runlist.iter().copied().collect();
    let mut result: Vec<usize> = Vec::with_capacity(runlist.len());
    let mut used: HashSet<usize> = HashSet::new();
    let mut processing: HashSet<usize> = HashSet::new();

    // We want to do a postorder, recursive traversal of variables to ensure
    // dependencies are calculated before the variables that reference them.
    fn add<F: Fn(usize) -> BTreeSet<usize>>(
        deps: &F,
        members: &HashSet<usize>,
        result: &mut Vec<usize>,
        used: &mut HashSet<usize>,
        processing: &mut HashSet<usize>,
        id: usize,
    ) -> result::Result<(), usize> {
        if used.contains(&id) {
            return Ok(());
        }
        if !processing.insert(id) {
            return Err(id);
        }
        for dep in deps(id).into_iter().filter(|d| members.contains(d)) {
            add(deps, members, result, used, processing, dep)?;
        }
        processing.remove(&id);
        used.insert(id);
        result.push(id);
        Ok(())
    }

    for &id in runlist.iter() {
        add(&deps, &members, &mut result, &mut used, &mut processing, id)?;
    }

    Ok(result)
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Simulation,
        ErrorCode::ZeroJunctionOutflow,
        Some("population 'adults', junction 'b', ti=3 (t=2000.75)".to_owned()),
    );
    assert_eq!(
        "SimulationError{zero_junction_outflow: population 'adults', junction 'b', ti=3 (t=2000.75)}",
        format!("{err}")
    );

    let err = Error::new(ErrorKind::Configuration, ErrorCode::BadSimSpecs, None);
    assert_eq!("ConfigurationError{bad_sim_specs}", format!("{err}"));
}

#[test]
fn test_topo_sort() {
    use std::collections::HashMap;

    // 0 <- 2 <- 1, 3 stands alone
    let deps: HashMap<usize, BTreeSet<usize>> = [
        (0, BTreeSet::new()),
        (1, [2].into_iter().collect()),
        (2, [0].into_iter().collect()),
        (3, BTreeSet::new()),
    ]
    .into_iter()
    .collect();

    let order = topo_sort(&[1, 0, 2, 3], |i| deps[&i].clone()).unwrap();
    assert_eq!(vec![0, 2, 1, 3], order);

    // entries outside the runlist are not followed
    let order = topo_sort(&[1, 3], |i| deps[&i].clone()).unwrap();
    assert_eq!(vec![1, 3], order);

    let cyclic: HashMap<usize, BTreeSet<usize>> = [
        (0, [1].into_iter().collect()),
        (1, [0].into_iter().collect()),
    ]
    .into_iter()
    .collect();
    assert!(topo_sort(&[0, 1], |i| cyclic[&i].clone()).is_err());
}
