use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission code.
///
/// Permissions are modeled as opaque strings (e.g. "inventory:manage").
/// Codes are unique within the catalog and compared byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Catalog entry describing a permission (for audit/display).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    pub code: Permission,
    pub name: String,
    pub description: Option<String>,
    /// Module/category tag, e.g. "inventory".
    pub module: Option<String>,
}

impl PermissionDefinition {
    /// Definition whose module defaults to the prefix before `:` in the code.
    pub fn new(code: impl Into<Permission>, name: impl Into<String>) -> Self {
        let code = code.into();
        let module = code
            .as_str()
            .split_once(':')
            .map(|(module, _)| module.to_string());
        Self {
            code,
            name: name.into(),
            description: None,
            module,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
