//! Résolution de l'espace de noms transport (jeton de topics + identifiants broker).
//!
//! Deux stratégies, choisies par l'appelant via la config :
//! - `StaticNamespace` : secret partagé fourni directement
//! - `UserDirectory` : utilisateur retrouvé par email dans un annuaire JSON,
//!   son username sert d'identifiant broker et le mot de passe fourni sert
//!   à la fois de mot de passe broker et de jeton de topics

use crate::error::CredentialError;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub token: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
}

pub trait NamespaceResolver {
    fn resolve(&self) -> Result<Namespace, CredentialError>;
}

#[derive(Debug, Clone)]
pub struct StaticNamespace {
    secret: String,
}

impl StaticNamespace {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

impl NamespaceResolver for StaticNamespace {
    fn resolve(&self) -> Result<Namespace, CredentialError> {
        if self.secret.trim().is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        Ok(Namespace {
            token: self.secret.clone(),
            mqtt_username: None,
            mqtt_password: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    email: String,
    username: String,
}

#[derive(Debug, Clone)]
pub struct UserDirectory {
    path: PathBuf,
    email: String,
    password: String,
}

impl UserDirectory {
    pub fn new(
        path: impl Into<PathBuf>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

impl NamespaceResolver for UserDirectory {
    fn resolve(&self) -> Result<Namespace, CredentialError> {
        if self.password.is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let entries: Vec<DirectoryEntry> = serde_json::from_str(&content)?;
        let user = entries
            .into_iter()
            .find(|e| e.email.eq_ignore_ascii_case(&self.email))
            .ok_or_else(|| CredentialError::UnknownUser(self.email.clone()))?;

        Ok(Namespace {
            token: self.password.clone(),
            mqtt_username: Some(user.username),
            mqtt_password: Some(self.password.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn static_secret_is_the_token() {
        let ns = StaticNamespace::new("s3cr3t").resolve().unwrap();
        assert_eq!(ns.token, "s3cr3t");
        assert_eq!(ns.mqtt_username, None);
        assert!(matches!(StaticNamespace::new("  ").resolve(), Err(CredentialError::EmptyToken)));
    }

    #[test]
    fn directory_lookup_by_email() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(
            &path,
            r#"[
                {"email": "a@hive.test", "username": "alice"},
                {"email": "b@hive.test", "username": "bob"}
            ]"#,
        )
        .unwrap();

        let ns = UserDirectory::new(&path, "B@hive.test", "pw").resolve().unwrap();
        assert_eq!(ns.token, "pw");
        assert_eq!(ns.mqtt_username.as_deref(), Some("bob"));
        assert_eq!(ns.mqtt_password.as_deref(), Some("pw"));

        let err = UserDirectory::new(&path, "c@hive.test", "pw").resolve().unwrap_err();
        assert!(matches!(err, CredentialError::UnknownUser(_)));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = UserDirectory::new("/nonexistent/users.json", "a@b", "pw").resolve().unwrap_err();
        assert!(matches!(err, CredentialError::Io(_)));
    }
}
