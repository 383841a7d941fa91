//! Post-processing of SIMION particle trajectory tables: per-variable
//! histograms, Gaussian peak fits, correlation and emittance maps, and a
//! fixed-width results report.

pub mod analysis;
pub mod config;
pub mod domain;
pub mod expression;
pub mod fitting;
pub mod histogram;
pub mod plotting;
pub mod records;
pub mod report;
