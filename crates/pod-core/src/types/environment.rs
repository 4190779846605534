//! Target platform environments.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PodError;

/// Filter property key of the operating system
pub const OS_KEY: &str = "os";
/// Filter property key of the windowing system
pub const WS_KEY: &str = "ws";
/// Filter property key of the CPU architecture
pub const ARCH_KEY: &str = "arch";
/// Filter property key of the language
pub const NL_KEY: &str = "nl";

/// Platform tuple (os, ws, arch, nl) plus extra properties
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetEnvironment {
    pub os: String,
    pub ws: String,
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nl: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl TargetEnvironment {
    pub fn new(os: impl Into<String>, ws: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            ws: ws.into(),
            arch: arch.into(),
            nl: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_nl(mut self, nl: impl Into<String>) -> Self {
        self.nl = Some(nl.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Properties visible to filters. The reserved platform keys take precedence
    /// over extra properties of the same name.
    pub fn to_filter_properties(&self) -> BTreeMap<String, String> {
        let mut properties = self.extra.clone();
        properties.insert(OS_KEY.to_string(), self.os.clone());
        properties.insert(WS_KEY.to_string(), self.ws.clone());
        properties.insert(ARCH_KEY.to_string(), self.arch.clone());
        if let Some(nl) = &self.nl {
            properties.insert(NL_KEY.to_string(), nl.clone());
        }
        properties
    }
}

impl fmt::Display for TargetEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.os, self.ws, self.arch)?;
        if let Some(nl) = &self.nl {
            write!(f, "/{}", nl)?;
        }
        Ok(())
    }
}

impl FromStr for TargetEnvironment {
    type Err = PodError;

    /// Parse `os/ws/arch` or `os/ws/arch/nl`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').map(str::trim).collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(PodError::config("environment", format!("'{}' has an empty segment", s)));
        }

        match parts.as_slice() {
            [os, ws, arch] => Ok(Self::new(*os, *ws, *arch)),
            [os, ws, arch, nl] => Ok(Self::new(*os, *ws, *arch).with_nl(*nl)),
            _ => Err(PodError::config(
                "environment",
                format!("'{}' is not of the form os/ws/arch[/nl]", s),
            )),
        }
    }
}
