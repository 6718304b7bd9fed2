// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use float_cmp::approx_eq;
use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::spec_err;

/// TimeSeries is sparse input data: values `y` observed at times `t`.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct TimeSeries {
    pub t: Vec<f64>,
    pub y: Vec<f64>,
}

impl TimeSeries {
    pub fn new(t: Vec<f64>, y: Vec<f64>) -> Self {
        TimeSeries { t, y }
    }

    /// a series holding the same value at every time
    pub fn constant(y: f64) -> Self {
        TimeSeries {
            t: vec![0.0],
            y: vec![y],
        }
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// validate checks the series can be interpolated; `what` names the
    /// owner for the error message.
    pub fn validate(&self, what: &str) -> Result<()> {
        if self.t.is_empty() {
            return spec_err!(BadTimeSeries, format!("{what}: no data points"));
        }
        if self.t.len() != self.y.len() {
            return spec_err!(
                BadTimeSeries,
                format!(
                    "{what}: {} time points but {} values",
                    self.t.len(),
                    self.y.len()
                )
            );
        }
        if self.t.iter().chain(self.y.iter()).any(|v| !v.is_finite()) {
            return spec_err!(BadTimeSeries, format!("{what}: non-finite data"));
        }
        if self.t.windows(2).any(|w| w[1] <= w[0]) {
            return spec_err!(
                BadTimeSeries,
                format!("{what}: times must be strictly increasing")
            );
        }
        Ok(())
    }

    pub fn value_at(&self, t: f64) -> f64 {
        lookup(&self.t, &self.y, t)
    }

    pub fn interpolate(&self, tvec: &[f64]) -> Vec<f64> {
        tvec.iter().map(|t| self.value_at(*t)).collect()
    }
}

/// piecewise-linear interpolation with flat extrapolation past either end
fn lookup(xs: &[f64], ys: &[f64], index: f64) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }

    if index.is_nan() {
        // things get wonky below if we try to binary search for NaN
        return f64::NAN;
    }

    // check if index is below the start of the table
    if index < xs[0] {
        return ys[0];
    }

    let size = xs.len();
    if index > xs[size - 1] {
        return ys[size - 1];
    }

    // binary search seems to be the most appropriate choice here.
    let mut low = 0;
    let mut high = size;
    while low < high {
        let mid = low + (high - low) / 2;
        if xs[mid] < index {
            low = mid + 1;
        } else {
            high = mid;
        }
    }

    let i = low;
    if approx_eq!(f64, xs[i], index) || i == 0 {
        ys[i]
    } else {
        // slope = deltaY/deltaX
        let slope = (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
        // y = m*x + b
        (index - xs[i - 1]) * slope + ys[i - 1]
    }
}

#[test]
fn test_interpolate() {
    let series = TimeSeries::new(vec![2000.0, 2010.0], vec![10.0, 20.0]);
    let tvec = [1990.0, 2000.0, 2005.0, 2010.0, 2020.0];
    assert_eq!(vec![10.0, 10.0, 15.0, 20.0, 20.0], series.interpolate(&tvec));

    let constant = TimeSeries::constant(4.5);
    assert_eq!(vec![4.5; 5], constant.interpolate(&tvec));

    assert!(series.value_at(f64::NAN).is_nan());
}

#[test]
fn test_validate() {
    assert!(TimeSeries::constant(1.0).validate("p").is_ok());
    assert!(TimeSeries::default().validate("p").is_err());
    assert!(
        TimeSeries::new(vec![1.0, 2.0], vec![1.0])
            .validate("p")
            .is_err()
    );
    assert!(
        TimeSeries::new(vec![2.0, 1.0], vec![1.0, 1.0])
            .validate("p")
            .is_err()
    );
    let err = TimeSeries::new(vec![1.0], vec![f64::NAN])
        .validate("population 'adults', parameter 'b_rate'")
        .unwrap_err();
    assert_eq!(crate::common::ErrorCode::BadTimeSeries, err.code);
    assert!(err.get_details().unwrap().contains("b_rate"));
}
