//! Validation of a deployment unit before rendering
//!
//! Checks logical ids against CloudFormation's naming rule and every
//! resource's attributes against its schema.

use std::sync::LazyLock;

use regex::Regex;
use vela_core::DeploymentUnit;

use crate::schemas;

static LOGICAL_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{1,255}$").ok());

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation
pub type ValidationResult = Result<(), Vec<ValidationError>>;

pub fn is_valid_logical_id(id: &str) -> bool {
    LOGICAL_ID.as_ref().is_some_and(|re| re.is_match(id))
}

/// Validate every resource and output of `unit`
pub fn validate_unit(unit: &DeploymentUnit) -> ValidationResult {
    let mut errors = Vec::new();

    for resource in &unit.resources {
        let path = resource.id.to_string();
        if !is_valid_logical_id(resource.logical_id()) {
            errors.push(ValidationError {
                path: path.clone(),
                message: "logical id must be 1-255 ASCII letters or digits".to_string(),
            });
        }

        let Some(config) = schemas::config_for(resource.resource_type()) else {
            errors.push(ValidationError {
                path,
                message: format!("unsupported resource type '{}'", resource.resource_type()),
            });
            continue;
        };
        if let Err(type_errors) = config.schema.validate(&resource.attributes) {
            errors.extend(type_errors.into_iter().map(|e| ValidationError {
                path: path.clone(),
                message: e.to_string(),
            }));
        }
    }

    for output in &unit.outputs {
        if !is_valid_logical_id(&output.id) {
            errors.push(ValidationError {
                path: format!("output.{}", output.id),
                message: "output name must be 1-255 ASCII letters or digits".to_string(),
            });
        }
    }

    if errors.is_empty() {
        log::debug!("validated {} resources", unit.resources.len());
        Ok(())
    } else {
        Err(errors)
    }
}
