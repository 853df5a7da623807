//! Ready-made criteria for the usual comparisons.
//!
//! Missing inputs fail the criterion: a prediction with nothing to compare
//! against is not evidence of viability.

use crate::criterion::{Criterion, Evaluation};
use crate::state::SystemState;

/// Passes while `|prediction - measurement| <= k * sigma`.
#[must_use]
pub fn within_sigma(name: &str, prediction: &str, measurement: &str, k: f64) -> Criterion {
    let prediction = prediction.to_string();
    let measurement = measurement.to_string();
    Criterion::new(
        name,
        format!("{prediction} within {k} sigma of measured {measurement}"),
        move |state: &SystemState| {
            let (Some(&predicted), Some(measured)) = (
                state.predictions.get(&prediction),
                state.measurements.get(&measurement),
            ) else {
                return Evaluation::fail();
            };
            let deviation = (predicted - measured.value).abs();
            let allowed = k * measured.uncertainty;
            Evaluation {
                passed: deviation <= allowed,
                ..Evaluation::default()
            }
            .with_margin(allowed - deviation)
            .with_input("prediction", predicted)
            .with_input("measurement", measured.value)
            .with_input("uncertainty", measured.uncertainty)
            .with_input("k", k)
        },
    )
}

/// Passes while `|prediction - measurement| / |measurement| <= max_relative`.
#[must_use]
pub fn relative_deviation(
    name: &str,
    prediction: &str,
    measurement: &str,
    max_relative: f64,
) -> Criterion {
    let prediction = prediction.to_string();
    let measurement = measurement.to_string();
    Criterion::new(
        name,
        format!("{prediction} within relative {max_relative:e} of measured {measurement}"),
        move |state: &SystemState| {
            let (Some(&predicted), Some(measured)) = (
                state.predictions.get(&prediction),
                state.measurements.get(&measurement),
            ) else {
                return Evaluation::fail();
            };
            let relative = if measured.value == 0.0 {
                predicted.abs()
            } else {
                ((predicted - measured.value) / measured.value).abs()
            };
            Evaluation {
                passed: relative <= max_relative,
                ..Evaluation::default()
            }
            .with_margin(max_relative - relative)
            .with_input("prediction", predicted)
            .with_input("measurement", measured.value)
            .with_input("relative_deviation", relative)
        },
    )
}

/// Passes while the derivation for `output` produced a finite value.
#[must_use]
pub fn derived_value_present(name: &str, output: &str) -> Criterion {
    let output = output.to_string();
    Criterion::new(
        name,
        format!("derivation of {output} yields a finite value"),
        move |state: &SystemState| match state.derived_values.get(&output) {
            Some(value) if value.is_finite() => Evaluation::pass().with_input(output.clone(), *value),
            _ => Evaluation::fail(),
        },
    )
}
