//! Claim config loader, ported from `original_source/claim_config.py`:
//! parses a YAML block of request groups into `ClaimRequestGroup` values.

use std::path::Path;

use serde::Deserialize;

use crate::error::{ClaimError, Result};
use crate::request::{CapabilityConstraint, ClaimRequestGroup, ClaimRequestGroupOptions, ResourceConstraint};

#[derive(Debug, Deserialize)]
struct RawCapabilityBlock {
    #[serde(default)]
    require: Vec<String>,
    #[serde(default)]
    forbid: Vec<String>,
    #[serde(default)]
    any: Vec<String>,
}

impl From<RawCapabilityBlock> for CapabilityConstraint {
    fn from(raw: RawCapabilityBlock) -> Self {
        CapabilityConstraint {
            require: raw.require,
            forbid: raw.forbid,
            any: raw.any,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawResourceRequest {
    min: Option<i64>,
    max: Option<i64>,
    capabilities: Option<RawCapabilityBlock>,
}

#[derive(Debug, Deserialize)]
struct RawRequestGroup {
    name: Option<String>,
    resources: std::collections::HashMap<String, RawResourceRequest>,
    #[serde(default)]
    capabilities: Vec<RawCapabilityBlock>,
    #[serde(default)]
    single_provider: bool,
}

#[derive(Debug, Deserialize)]
struct RawClaimConfig {
    request_groups: Vec<RawRequestGroup>,
}

/// A loaded claim configuration: one or more request groups ready to be
/// embedded in a `ClaimRequest`.
pub struct ClaimConfig {
    pub groups: Vec<ClaimRequestGroup>,
}

impl ClaimConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let raw: RawClaimConfig =
            serde_yaml::from_str(contents).map_err(|e| ClaimError::Config(e.to_string()))?;

        let mut groups = Vec::with_capacity(raw.request_groups.len());
        for (index, raw_group) in raw.request_groups.into_iter().enumerate() {
            let mut resources = Vec::with_capacity(raw_group.resources.len());
            for (code, req) in raw_group.resources {
                let amount = req.max.or(req.min).ok_or_else(|| {
                    ClaimError::Config(format!("resource {code} needs a min or max amount"))
                })?;
                resources.push(ResourceConstraint {
                    resource_type_code: code,
                    amount,
                    capability: req.capabilities.map(CapabilityConstraint::from),
                });
            }

            let capabilities = raw_group.capabilities.into_iter().map(CapabilityConstraint::from).collect();

            groups.push(ClaimRequestGroup {
                name: raw_group.name.unwrap_or_else(|| format!("group{index}")),
                resources,
                capabilities,
                provider_groups: Vec::new(),
                distances: Vec::new(),
                options: ClaimRequestGroupOptions {
                    single_provider: raw_group.single_provider,
                    isolate_from: false,
                },
            });
        }

        Ok(ClaimConfig { groups })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClaimError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_groups() {
        let yaml = "
request_groups:
  - name: compute
    resources:
      VCPU:
        min: 2
        max: 4
    capabilities:
      - require: [HW_GPU_NVIDIA]
";
        let cfg = ClaimConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.groups.len(), 1);
        assert_eq!(cfg.groups[0].resources[0].amount, 4);
        assert_eq!(cfg.groups[0].capabilities[0].require, vec!["HW_GPU_NVIDIA"]);
    }

    #[test]
    fn forbid_only_block_parses_with_empty_require_and_any() {
        let yaml = "
request_groups:
  - resources:
      VCPU:
        max: 1
    capabilities:
      - forbid: [c_forbidden]
";
        let cfg = ClaimConfig::from_yaml_str(yaml).unwrap();
        let cap = &cfg.groups[0].capabilities[0];
        assert!(cap.require.is_empty());
        assert!(cap.any.is_empty());
        assert_eq!(cap.forbid, vec!["c_forbidden"]);
    }
}
