//! Deployment config loader, ported from
//! `original_source/deployment_config.py`: expands a `sites` /
//! `rows_per_site` / `racks_per_row` / `nodes_per_rack` layout into a flat
//! list of providers under a site/row/rack naming convention.
//!
//! Distance computation (`_calculate_distances` in the original) is not
//! reproduced: distance constraints are accepted by the request schema but
//! not enforced by the matcher (see DESIGN.md), so building the full
//! distance matrix here would be dead weight.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ClaimError, Result};

use super::provider_profile::ProviderProfile;

#[derive(Debug, Deserialize)]
struct Layout {
    sites: Vec<String>,
    #[serde(default)]
    rows_per_site: u32,
    #[serde(default)]
    racks_per_row: u32,
    #[serde(default)]
    nodes_per_rack: u32,
}

#[derive(Debug, Deserialize)]
struct RawDeploymentConfig {
    layout: Layout,
    default_provider_profile: String,
    #[serde(default)]
    group_provider_profiles: HashMap<String, String>,
}

/// One provider a deployment config expands to: its fully-qualified name,
/// the site/row/rack provider group names it belongs to, and the profile
/// to draw inventory/capabilities from.
#[derive(Debug, Clone)]
pub struct PlannedProvider {
    pub name: String,
    pub group_names: Vec<String>,
    pub profile_name: String,
}

/// Expands a deployment layout into providers and their provider-group
/// memberships.
pub struct DeploymentConfig {
    pub providers: Vec<PlannedProvider>,
    pub group_names: Vec<String>,
}

impl DeploymentConfig {
    pub fn from_yaml_str(contents: &str, profiles: &HashMap<String, ProviderProfile>) -> Result<Self> {
        let raw: RawDeploymentConfig =
            serde_yaml::from_str(contents).map_err(|e| ClaimError::Config(e.to_string()))?;

        if !profiles.contains_key(&raw.default_provider_profile) {
            return Err(ClaimError::Config(format!(
                "unknown default provider profile {}",
                raw.default_provider_profile
            )));
        }

        let mut group_names = Vec::new();
        let mut providers = Vec::new();

        for site_name in &raw.layout.sites {
            group_names.push(site_name.clone());
            let mut profile_name = raw
                .group_provider_profiles
                .get(site_name)
                .cloned()
                .unwrap_or_else(|| raw.default_provider_profile.clone());

            for row_id in 0..raw.layout.rows_per_site {
                let row_name = format!("{site_name}-row{row_id}");
                group_names.push(row_name.clone());
                profile_name = raw
                    .group_provider_profiles
                    .get(&row_name)
                    .cloned()
                    .unwrap_or(profile_name);

                for rack_id in 0..raw.layout.racks_per_row {
                    let rack_name = format!("{row_name}-rack{rack_id}");
                    group_names.push(rack_name.clone());
                    profile_name = raw
                        .group_provider_profiles
                        .get(&rack_name)
                        .cloned()
                        .unwrap_or(profile_name.clone());

                    for node_id in 0..raw.layout.nodes_per_rack {
                        let provider_name = format!("{rack_name}-node{node_id}");
                        if !profiles.contains_key(&profile_name) {
                            return Err(ClaimError::Config(format!(
                                "unknown provider profile {profile_name} for {provider_name}"
                            )));
                        }
                        providers.push(PlannedProvider {
                            name: provider_name,
                            group_names: vec![site_name.clone(), row_name.clone(), rack_name.clone()],
                            profile_name: profile_name.clone(),
                        });
                    }
                }
            }
        }

        Ok(DeploymentConfig {
            providers,
            group_names,
        })
    }

    pub fn load(path: &Path, profiles: &HashMap<String, ProviderProfile>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClaimError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&contents, profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_layout_into_providers() {
        let mut profiles = HashMap::new();
        profiles.insert(
            "small".to_string(),
            ProviderProfile::from_yaml_str(
                "small",
                "inventory:\n  VCPU:\n    total: 4\n",
            )
            .unwrap(),
        );

        let yaml = "
layout:
  sites: [dc1]
  rows_per_site: 1
  racks_per_row: 1
  nodes_per_rack: 2
default_provider_profile: small
";
        let cfg = DeploymentConfig::from_yaml_str(yaml, &profiles).unwrap();
        assert_eq!(cfg.providers.len(), 2);
        assert_eq!(cfg.providers[0].name, "dc1-row0-rack0-node0");
        assert_eq!(cfg.providers[0].group_names, vec!["dc1", "dc1-row0", "dc1-row0-rack0"]);
    }
}
