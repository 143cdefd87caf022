use std::fmt;
use std::future::Future;

use thiserror::Error;
use tracing::{debug, info};

use crate::process::Tool;

/// A secret fetched for the current run. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),
    #[error("secret is empty: {0}")]
    Empty(String),
    #[error("secret store unreachable while reading {name}: {message}")]
    Unreachable { name: String, message: String },
}

/// Lookup of named secrets in an external store.
pub trait SecretStore {
    /// Fetches the current value of `name`. Never cached between calls.
    fn get(&self, name: &str) -> impl Future<Output = Result<SecretValue, SecretError>> + Send;
}

/// Azure Key Vault accessed through `az keyvault secret show`.
#[derive(Debug, Clone)]
pub struct AzKeyVault {
    az: Tool,
    vault_name: String,
}

impl AzKeyVault {
    pub fn new(az: Tool, vault_name: &str) -> Self {
        Self {
            az,
            vault_name: vault_name.to_string(),
        }
    }

    pub fn vault_name(&self) -> &str {
        &self.vault_name
    }
}

impl SecretStore for AzKeyVault {
    async fn get(&self, name: &str) -> Result<SecretValue, SecretError> {
        info!("Reading secret {name} from key vault {}", self.vault_name);
        let args = secret_show_args(&self.vault_name, name);
        let output = self
            .az
            .output(&args)
            .await
            .map_err(|err| SecretError::Unreachable {
                name: name.to_string(),
                message: err.to_string(),
            })?;
        if !output.success() {
            return Err(classify_failure(name, &output.stderr));
        }
        let value = parse_secret_value(name, &output.stdout)?;
        debug!("Secret {name} resolved ({} bytes)", value.expose().len());
        Ok(value)
    }
}

fn secret_show_args(vault_name: &str, name: &str) -> Vec<String> {
    vec![
        "keyvault".to_string(),
        "secret".to_string(),
        "show".to_string(),
        "--vault-name".to_string(),
        vault_name.to_string(),
        "--name".to_string(),
        name.to_string(),
        "--query".to_string(),
        "value".to_string(),
        "--output".to_string(),
        "json".to_string(),
    ]
}

fn classify_failure(name: &str, stderr: &str) -> SecretError {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("secretnotfound") || lowered.contains("was not found") {
        SecretError::NotFound(name.to_string())
    } else {
        SecretError::Unreachable {
            name: name.to_string(),
            message: stderr.trim().to_string(),
        }
    }
}

// `--output json` keeps leading/trailing whitespace of the value intact.
fn parse_secret_value(name: &str, stdout: &str) -> Result<SecretValue, SecretError> {
    let trimmed = stdout.trim();
    let value = if trimmed.starts_with('"') {
        serde_json::from_str::<String>(trimmed).map_err(|err| SecretError::Unreachable {
            name: name.to_string(),
            message: format!("unexpected az output: {err}"),
        })?
    } else if trimmed == "null" {
        String::new()
    } else {
        trimmed.to_string()
    };
    if value.is_empty() {
        return Err(SecretError::Empty(name.to_string()));
    }
    Ok(SecretValue::new(value))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;

    fn fake_az(dir: &Path, body: &str) -> Tool {
        let path = dir.join("az");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o700)).unwrap();
        Tool::new(path, Duration::from_secs(5))
    }

    #[test]
    fn test_secret_value_debug_is_redacted() {
        let value = SecretValue::new("hunter2");
        assert_eq!(format!("{value:?}"), "SecretValue(<redacted>)");
        assert_eq!(value.expose(), "hunter2");
    }

    #[test]
    fn test_secret_show_args() {
        let args = secret_show_args("hub23-keyvault", "apiToken");
        assert_eq!(
            args,
            vec![
                "keyvault",
                "secret",
                "show",
                "--vault-name",
                "hub23-keyvault",
                "--name",
                "apiToken",
                "--query",
                "value",
                "--output",
                "json"
            ]
        );
    }

    #[test]
    fn test_parse_secret_value_json_string() {
        let value = parse_secret_value("a", "\"  padded value \"\n").unwrap();
        assert_eq!(value.expose(), "  padded value ");
    }

    #[test]
    fn test_parse_secret_value_rejects_empty() {
        assert!(matches!(
            parse_secret_value("a", "\"\"\n"),
            Err(SecretError::Empty(_))
        ));
        assert!(matches!(
            parse_secret_value("a", "null\n"),
            Err(SecretError::Empty(_))
        ));
    }

    #[test]
    fn test_classify_failure() {
        let not_found = classify_failure(
            "missing",
            "ERROR: (SecretNotFound) A secret with (name/id) missing was not found in this key vault.",
        );
        assert!(matches!(not_found, SecretError::NotFound(name) if name == "missing"));

        let other = classify_failure("x", "ERROR: Please run 'az login' to setup account.\n");
        assert!(matches!(other, SecretError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_az_key_vault_reads_value() {
        let dir = tempdir().unwrap();
        let az = fake_az(
            dir.path(),
            r#"[ "$5" = "vault" ] && [ "$7" = "apiToken" ] && printf '"tok-123"\n' && exit 0
exit 9"#,
        );
        let vault = AzKeyVault::new(az, "vault");

        let value = vault.get("apiToken").await.unwrap();

        assert_eq!(value.expose(), "tok-123");
    }

    #[tokio::test]
    async fn test_az_key_vault_not_found() {
        let dir = tempdir().unwrap();
        let az = fake_az(
            dir.path(),
            "echo \"ERROR: (SecretNotFound) A secret with (name/id) $7 was not found\" >&2; exit 3",
        );
        let vault = AzKeyVault::new(az, "vault");

        let err = vault.get("nope").await.unwrap_err();

        assert!(matches!(err, SecretError::NotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_az_missing_binary_is_unreachable() {
        let dir = tempdir().unwrap();
        let az = Tool::new(dir.path().join("no-az"), Duration::from_secs(1));
        let vault = AzKeyVault::new(az, "vault");

        let err = vault.get("x").await.unwrap_err();

        assert!(matches!(err, SecretError::Unreachable { .. }));
    }
}
