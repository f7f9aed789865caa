//! Resolve effective API key / server address from CLI flags, environment, and the global
//! config file, in that precedence order.

use tunnel_client::GlobalConfig;

pub fn resolve_api_key(cli_value: &Option<String>, global: &GlobalConfig) -> anyhow::Result<String> {
    if let Some(v) = cli_value {
        if !v.is_empty() {
            return Ok(v.clone());
        }
    }
    if let Ok(v) = std::env::var("GODIG_API_KEY") {
        if !v.is_empty() {
            return Ok(v);
        }
    }
    if let Some(v) = &global.api_key {
        if !v.is_empty() {
            return Ok(v.clone());
        }
    }
    anyhow::bail!(
        "api key must be provided via --api-key, GODIG_API_KEY, or `godig config set api-key <value>`"
    )
}

pub fn resolve_server(cli_value: &Option<String>, global: &GlobalConfig) -> String {
    if let Some(v) = cli_value {
        if !v.is_empty() {
            return v.clone();
        }
    }
    if let Ok(v) = std::env::var("GODIG_SERVER") {
        if !v.is_empty() {
            return v;
        }
    }
    if let Some(v) = &global.server {
        if !v.is_empty() {
            return v.clone();
        }
    }
    "localhost:8080".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_wins_over_everything() {
        let global = GlobalConfig { api_key: Some("from-file".into()), server: None };
        let resolved = resolve_api_key(&Some("from-cli".into()), &global).unwrap();
        assert_eq!(resolved, "from-cli");
    }

    #[test]
    fn falls_back_to_global_config() {
        let global = GlobalConfig { api_key: Some("from-file".into()), server: None };
        let resolved = resolve_api_key(&None, &global).unwrap();
        assert_eq!(resolved, "from-file");
    }

    #[test]
    fn errors_when_nothing_resolves() {
        let global = GlobalConfig::default();
        std::env::remove_var("GODIG_API_KEY");
        assert!(resolve_api_key(&None, &global).is_err());
    }

    #[test]
    fn server_defaults_when_unset() {
        let global = GlobalConfig::default();
        std::env::remove_var("GODIG_SERVER");
        assert_eq!(resolve_server(&None, &global), "localhost:8080");
    }
}
