/**
 * ERREURS HIVE KERNEL - Taxonomie des échecs de la boucle de contrôle
 *
 * RÔLE :
 * Un enum par préoccupation, pour que chaque couche ne propage que ce
 * qu'elle sait produire.
 *
 * POLITIQUE :
 * - ParseError : payload illisible, loggé puis ignoré (aucun changement d'état)
 * - LedgerError : violation d'invariant ou échec d'écriture, loggé, la commande part quand même
 * - PublishError : échec d'envoi de la commande pompe, loggé
 * - ConnectError : broker injoignable au démarrage, seule erreur fatale
 */

/// Payload de lecture qui n'est pas un nombre décimal valide
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid reading on {topic}: {payload:?} ({reason})")]
pub struct ParseError {
    pub topic: String,
    pub payload: String,
    pub reason: String,
}

/// Erreurs du journal des activations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("an activation is already open for unit {unit_id}")]
    DuplicateOpenActivation { unit_id: String },
    #[error("ledger IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// Vrai pour les échecs de persistance (par opposition aux violations d'invariant)
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, LedgerError::Io(_) | LedgerError::Serialization(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("MQTT client rejected publish: {0}")]
    Client(String),
}

impl From<rumqttc::ClientError> for PublishError {
    fn from(e: rumqttc::ClientError) -> Self {
        PublishError::Client(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("broker refused connection: {0}")]
    Refused(String),
    #[error("no ConnAck from {host}:{port} within {secs}s")]
    Timeout { host: String, port: u16, secs: u64 },
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("user directory unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("user directory invalid: {0}")]
    Format(#[from] serde_json::Error),
    #[error("no user registered with email {0}")]
    UnknownUser(String),
    #[error("empty namespace token")]
    EmptyToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_failures_are_distinguished_from_invariant_violations() {
        let dup = LedgerError::DuplicateOpenActivation { unit_id: "1".into() };
        assert!(!dup.is_persistence_failure());

        let io = LedgerError::Io(std::io::Error::other("disk full"));
        assert!(io.is_persistence_failure());
    }

    #[test]
    fn parse_error_mentions_topic_and_payload() {
        let e = ParseError {
            topic: "s3cr3t/moldPrevention/hive1/temp".into(),
            payload: "abc".into(),
            reason: "invalid float literal".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("hive1/temp"));
        assert!(msg.contains("\"abc\""));
    }
}
