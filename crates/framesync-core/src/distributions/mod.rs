// SPDX-License-Identifier: Apache-2.0
//! Adaptive probability models: the building blocks every encoded frame is
//! made of, from a single symbol up to a predictor-aware integer field.

mod curve;
mod field;
mod integer;
mod symbol;

pub use curve::CurvePredictor;
pub use field::FieldDistribution;
pub use integer::IntegerDistribution;
pub use symbol::SymbolDistribution;
