use serde::{Deserialize, Serialize};

/// Settings of the remote upload server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    pub id: i64,
    pub server_url: String,
    pub enabled: bool,
    pub last_sync: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SyncSettings {
    pub fn new(server_url: String) -> Self {
        Self {
            id: 0,
            server_url,
            enabled: true,
            last_sync: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    /// Whether uploads may run with these settings
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.server_url.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_configured() {
        let mut settings = SyncSettings::new("http://survey.local:5000".to_string());
        assert!(settings.is_configured());
        settings.enabled = false;
        assert!(!settings.is_configured());
        assert!(!SyncSettings::new("  ".to_string()).is_configured());
    }
}
