//! Typed view over the IaC root module outputs.

use crate::iac::RawOutputs;

pub const OUTPUT_RESOURCE_GROUP: &str = "resource_group_name";
pub const OUTPUT_CLUSTER_NAME: &str = "cluster_name";
pub const OUTPUT_DATABASE_SERVER: &str = "database_server_name";
pub const OUTPUT_DATABASE_FQDN: &str = "database_fqdn";
pub const OUTPUT_STORAGE_ACCOUNT: &str = "storage_account_name";
pub const OUTPUT_APP_URL: &str = "app_url";

/// Outputs the orchestrator understands. Anything missing stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentOutputs {
    pub resource_group: Option<String>,
    pub cluster_name: Option<String>,
    pub database_server: Option<String>,
    pub database_fqdn: Option<String>,
    pub storage_account: Option<String>,
    pub app_url: Option<String>,
}

impl DeploymentOutputs {
    pub fn from_raw(raw: &RawOutputs) -> Self {
        let get = |key: &str| {
            raw.get(key)
                .and_then(|o| o.value.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            resource_group: get(OUTPUT_RESOURCE_GROUP),
            cluster_name: get(OUTPUT_CLUSTER_NAME),
            database_server: get(OUTPUT_DATABASE_SERVER),
            database_fqdn: get(OUTPUT_DATABASE_FQDN),
            storage_account: get(OUTPUT_STORAGE_ACCOUNT),
            app_url: get(OUTPUT_APP_URL),
        }
    }

    /// Resource group and cluster name, when both resolved
    pub fn cluster(&self) -> Option<(&str, &str)> {
        Some((self.resource_group.as_deref()?, self.cluster_name.as_deref()?))
    }

    /// Resource group and database server name, when both resolved
    pub fn database(&self) -> Option<(&str, &str)> {
        Some((
            self.resource_group.as_deref()?,
            self.database_server.as_deref()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iac::OutputValue;

    fn raw(pairs: &[(&str, serde_json::Value)]) -> RawOutputs {
        pairs
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    OutputValue {
                        sensitive: false,
                        value: v.clone(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn string_outputs_are_extracted() {
        let outputs = DeploymentOutputs::from_raw(&raw(&[
            (OUTPUT_RESOURCE_GROUP, serde_json::json!("rg-prod")),
            (OUTPUT_CLUSTER_NAME, serde_json::json!("aks-prod")),
            (OUTPUT_DATABASE_SERVER, serde_json::json!("pg-prod")),
        ]));
        assert_eq!(outputs.cluster(), Some(("rg-prod", "aks-prod")));
        assert_eq!(outputs.database(), Some(("rg-prod", "pg-prod")));
        assert_eq!(outputs.storage_account, None);
    }

    #[test]
    fn non_string_and_empty_values_are_unresolved() {
        let outputs = DeploymentOutputs::from_raw(&raw(&[
            (OUTPUT_RESOURCE_GROUP, serde_json::json!("")),
            (OUTPUT_APP_URL, serde_json::json!(["a", "b"])),
        ]));
        assert_eq!(outputs, DeploymentOutputs::default());
        assert_eq!(outputs.cluster(), None);
    }
}
