use crate::credentials::{NamespaceResolver, StaticNamespace, UserDirectory};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub mqtt: MqttConf,
    pub namespace: NamespaceConf,
    pub units: Vec<UnitConf>,
    pub ledger: LedgerConf,
    pub http: HttpConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NamespaceConf {
    Static { secret: String },
    UserDirectory { path: PathBuf, email: String, password: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UnitConf {
    pub unit_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LedgerConf {
    /// Fichier JSON ; absent = journal en mémoire
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConf {
    pub bind: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            namespace: NamespaceConf::default(),
            units: vec![UnitConf { unit_id: "1".into() }],
            ledger: LedgerConf::default(),
            http: HttpConf::default(),
        }
    }
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "test.mosquitto.org".into(),
            port: 1883,
            client_id: "hive-kernel".into(),
            keep_alive_secs: 300,
            connect_timeout_secs: 10,
            username: None,
            password: None,
        }
    }
}

impl Default for NamespaceConf {
    fn default() -> Self {
        // Vide : la résolution échoue tant qu'aucun secret n'est configuré
        NamespaceConf::Static { secret: String::new() }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl NamespaceConf {
    pub fn resolver(&self) -> Box<dyn NamespaceResolver + Send + Sync> {
        match self {
            NamespaceConf::Static { secret } => Box::new(StaticNamespace::new(secret.clone())),
            NamespaceConf::UserDirectory { path, email, password } => {
                Box::new(UserDirectory::new(path.clone(), email.clone(), password.clone()))
            }
        }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    serde_yaml::from_str(txt)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("HIVE_KERNEL_CONFIG").unwrap_or_else(|_| "hive-kernel.yaml".into());
    load_config_from(Path::new(&path)).await
}

pub async fn load_config_from(path: &Path) -> KernelConfig {
    if !path.exists() {
        warn!(path = ?path, "no config file, using defaults");
        return KernelConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    parse_config(&txt).unwrap_or_else(|e| {
        warn!(path = ?path, "invalid config: {e}");
        KernelConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_public_broker_and_single_hive() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.mqtt.host, "test.mosquitto.org");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.mqtt.keep_alive_secs, 300);
        assert_eq!(cfg.units.len(), 1);
        assert_eq!(cfg.units[0].unit_id, "1");
        assert!(cfg.ledger.path.is_none());
        assert!(cfg.namespace.resolver().resolve().is_err());
    }

    #[test]
    fn parses_partial_yaml() {
        let cfg = parse_config(
            r#"
mqtt:
  host: broker.local
namespace:
  mode: static
  secret: s3cr3t
units:
  - unit_id: "1"
  - unit_id: "2"
ledger:
  path: ./data/air_pump_activations.json
"#,
        )
        .unwrap();

        assert_eq!(cfg.mqtt.host, "broker.local");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.units.len(), 2);
        assert_eq!(cfg.namespace.resolver().resolve().unwrap().token, "s3cr3t");
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
        assert!(cfg.ledger.path.is_some());
    }

    #[test]
    fn parses_user_directory_mode() {
        let cfg = parse_config(
            r#"
namespace:
  mode: user_directory
  path: users.json
  email: a@b.c
  password: pw
"#,
        )
        .unwrap();
        assert!(matches!(
            cfg.namespace,
            NamespaceConf::UserDirectory { ref email, .. } if email == "a@b.c"
        ));
    }

    #[test]
    fn empty_text_gives_defaults() {
        assert_eq!(parse_config("  \n").unwrap().units.len(), 1);
    }

    #[tokio::test]
    async fn missing_or_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_config_from(&dir.path().join("nope.yaml")).await;
        assert_eq!(missing.mqtt.port, 1883);

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "units: [[[").unwrap();
        assert_eq!(load_config_from(&bad).await.units[0].unit_id, "1");
    }
}
