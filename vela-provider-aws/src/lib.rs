//! Vela AWS Provider
//!
//! Renders a synthesized deployment unit as an AWS CloudFormation template.
//!
//! ## Module Structure
//!
//! - `schemas` - Resource schemas and CloudFormation type names
//! - `case_convert` - Attribute name and value conversion
//! - `validation` - Checks run before rendering
//! - `template` - The template model

pub mod case_convert;
pub mod schemas;
pub mod template;
pub mod validation;

pub use template::Template;
pub use validation::ValidationError;

use vela_core::DeploymentUnit;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("Template validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate and render `unit`
pub fn render(unit: &DeploymentUnit) -> Result<Template, TemplateError> {
    Template::from_unit(unit)
}
