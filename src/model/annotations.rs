use serde::Serialize;
use std::collections::HashMap;

use crate::error::ApiError;

/// Data annotations declared on one attribute of a type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AttributeDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            max_length: None,
            display_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    /// Name used in validation messages
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDescriptor {
    pub type_name: String,
    pub attributes: Vec<AttributeDescriptor>,
}

impl TypeDescriptor {
    pub fn new(type_name: &str, attributes: Vec<AttributeDescriptor>) -> Self {
        Self {
            type_name: type_name.to_string(),
            attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Explicit lookup of type descriptions.
///
/// A type can be associated with a separate metadata type whose attribute
/// annotations replace the base type's annotations of the same name. This
/// keeps annotations out of generated entity types.
#[derive(Debug, Clone, Default)]
pub struct MetadataTypeRegistry {
    types: HashMap<String, TypeDescriptor>,
    associated: HashMap<String, String>,
}

impl MetadataTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_type(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.type_name.clone(), descriptor);
    }

    /// Associate `metadata_type` with `type_name`. The metadata type must
    /// already be registered.
    pub fn associate_metadata_type(
        &mut self,
        type_name: &str,
        metadata_type: &str,
    ) -> Result<(), ApiError> {
        if !self.types.contains_key(metadata_type) {
            return Err(ApiError::Internal(anyhow::anyhow!(
                "metadata type '{}' for '{}' is not registered",
                metadata_type,
                type_name
            )));
        }
        self.associated
            .insert(type_name.to_string(), metadata_type.to_string());
        Ok(())
    }

    pub fn associated_metadata_type(&self, type_name: &str) -> Option<&str> {
        self.associated.get(type_name).map(|s| s.as_str())
    }

    /// Describe the attribute set of `type_name`, with associated metadata
    /// type annotations applied on top.
    pub fn describe(&self, type_name: &str) -> Option<TypeDescriptor> {
        let base = self.types.get(type_name)?;
        let Some(metadata) = self
            .associated_metadata_type(type_name)
            .and_then(|name| self.types.get(name))
        else {
            return Some(base.clone());
        };

        let attributes = base
            .attributes
            .iter()
            .map(|attribute| {
                metadata
                    .attribute(&attribute.name)
                    .cloned()
                    .unwrap_or_else(|| attribute.clone())
            })
            .collect();

        Some(TypeDescriptor {
            type_name: base.type_name.clone(),
            attributes,
        })
    }
}
