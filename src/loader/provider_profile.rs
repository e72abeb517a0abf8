//! Provider profile loader, ported from `original_source/provider_profile.py`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ClaimError, Result};

/// One resource type's inventory block within a provider profile, before
/// defaults are applied.
#[derive(Debug, Clone, Deserialize)]
struct RawInventorySpec {
    total: i64,
    reserved: Option<i64>,
    min_unit: Option<i64>,
    max_unit: Option<i64>,
    step_size: Option<i64>,
    allocation_ratio: Option<f64>,
}

/// A fully-defaulted inventory spec for one resource type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InventorySpec {
    pub total: i64,
    pub reserved: i64,
    pub min_unit: i64,
    pub max_unit: i64,
    pub step_size: i64,
    pub allocation_ratio: f64,
}

impl From<RawInventorySpec> for InventorySpec {
    fn from(raw: RawInventorySpec) -> Self {
        InventorySpec {
            total: raw.total,
            reserved: raw.reserved.unwrap_or(0),
            min_unit: raw.min_unit.unwrap_or(1),
            max_unit: raw.max_unit.unwrap_or(raw.total),
            step_size: raw.step_size.unwrap_or(1),
            allocation_ratio: raw.allocation_ratio.unwrap_or(1.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    #[serde(default)]
    capabilities: Vec<String>,
    inventory: HashMap<String, RawInventorySpec>,
}

/// Describes the inventory and capabilities a deployment-config provider
/// should be given. Same defaulting rules as the original Python loader:
/// `min_unit=1`, `max_unit=total`, `step_size=1`, `allocation_ratio=1.0`,
/// `reserved=0`.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub name: String,
    pub capabilities: Vec<String>,
    pub inventory: HashMap<String, InventorySpec>,
}

impl ProviderProfile {
    pub fn from_yaml_str(name: &str, contents: &str) -> Result<Self> {
        let raw: RawProfile =
            serde_yaml::from_str(contents).map_err(|e| ClaimError::Config(e.to_string()))?;
        let inventory = raw
            .inventory
            .into_iter()
            .map(|(code, spec)| (code, InventorySpec::from(spec)))
            .collect();
        Ok(ProviderProfile {
            name: name.to_string(),
            capabilities: raw.capabilities,
            inventory,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClaimError::Config(format!("{}: {e}", path.display())))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("profile")
            .to_string();
        Self::from_yaml_str(&name, &contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_defaults() {
        let yaml = "
capabilities: [HW_GPU_NVIDIA]
inventory:
  VCPU:
    total: 8
";
        let profile = ProviderProfile::from_yaml_str("gpu-node", yaml).unwrap();
        let vcpu = profile.inventory.get("VCPU").unwrap();
        assert_eq!(vcpu.total, 8);
        assert_eq!(vcpu.min_unit, 1);
        assert_eq!(vcpu.max_unit, 8);
        assert_eq!(vcpu.step_size, 1);
        assert_eq!(vcpu.allocation_ratio, 1.0);
        assert_eq!(vcpu.reserved, 0);
    }
}
