//! Deployment outputs exposed to consumers of the stack

use crate::resource::Value;
use crate::stack::{Stack, StackError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputProps {
    pub description: Option<String>,
    /// Cross-stack export name
    pub export_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub id: String,
    /// A resource attribute reference or a literal string
    pub value: Value,
    pub description: Option<String>,
    pub export_name: Option<String>,
}

impl Output {
    pub fn declare(stack: &mut Stack, id: &str, value: Value) -> Result<(), StackError> {
        Self::declare_with(stack, id, value, OutputProps::default())
    }

    pub fn declare_with(
        stack: &mut Stack,
        id: &str,
        value: Value,
        props: OutputProps,
    ) -> Result<(), StackError> {
        if !matches!(value, Value::ResourceRef(..) | Value::String(_)) {
            return Err(StackError::InvalidOutputValue {
                output: id.to_string(),
            });
        }
        if stack.outputs.iter().any(|o| o.id == id) {
            return Err(StackError::DuplicateOutput(id.to_string()));
        }
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StackError::InvalidId(id.to_string()));
        }

        log::debug!("declared output {}", id);
        stack.outputs.push(Output {
            id: id.to_string(),
            value,
            description: props.description,
            export_name: props.export_name,
        });
        Ok(())
    }
}
