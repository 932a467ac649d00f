//! Vela Core
//!
//! Declarative model of a cloud network topology: constructs are declared
//! against an explicit [`Stack`], validated as they are declared, and
//! synthesized into a dependency-ordered [`DeploymentUnit`].

pub mod blueprint;
pub mod cidr;
pub mod config;
pub mod diagnostic;
pub mod graph;
pub mod resource;
pub mod schema;
pub mod stack;
pub mod topology;

pub use diagnostic::{Diagnostic, DiagnosticKind, Severity};
pub use resource::{Resource, ResourceId, Value};
pub use stack::{DeploymentUnit, Environment, Stack, StackError, UnitSummary};
