//! Gradient-boosted regression trees.
//!
//! Training follows the second-order scheme popularised by XGBoost for a
//! squared-error objective: every round fits one tree to the gradients of the
//! current ensemble, with leaf weights `-G / (H + lambda)` shrunk by the
//! learning rate. Split search is exact and greedy over sorted feature values.
//!
//! Inference sums the base score and one leaf per tree. Rows go left when
//! `x[feature] < threshold`.

pub mod booster;
pub mod tree;

pub use booster::{rmse, BoosterParams, FitError, GradientBoostedRegressor};
pub use tree::{Node, Tree};
