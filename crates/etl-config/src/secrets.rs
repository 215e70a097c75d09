//! Secret-separation contract: the YAML layer must contain no credentials
//! (spec §4.1 "Secret separation contract"). Any leaf key matching this
//! denylist fails configuration load before any other validation runs.

use etl_core::ConfigError;
use regex::Regex;
use serde_yaml::Value;

fn reserved_key_pattern() -> Regex {
    Regex::new(r"(?i)(password|passwd|secret|token|connection_string|access_key|secret_key|sas_token|api_key)$")
        .expect("reserved-secret regex compiles")
}

pub fn reject_secrets(value: &Value, path: &str) -> Result<(), ConfigError> {
    let reserved = reserved_key_pattern();
    reject_secrets_inner(value, path, &reserved)
}

fn reject_secrets_inner(value: &Value, path: &str, reserved: &Regex) -> Result<(), ConfigError> {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                if let Value::String(key) = k {
                    if reserved.is_match(key) {
                        return Err(ConfigError::SecretInYaml {
                            path: path.to_string(),
                            key: key.clone(),
                        });
                    }
                    let child_path = format!("{path}.{key}");
                    reject_secrets_inner(v, &child_path, reserved)?;
                } else {
                    reject_secrets_inner(v, path, reserved)?;
                }
            }
            Ok(())
        }
        Value::Sequence(seq) => {
            for item in seq {
                reject_secrets_inner(item, path, reserved)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_password_leaf() {
        let v: Value = serde_yaml::from_str("database:\n  password: hunter2\n").unwrap();
        let err = reject_secrets(&v, "config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::SecretInYaml { .. }));
    }

    #[test]
    fn allows_ordinary_keys() {
        let v: Value = serde_yaml::from_str("database:\n  host: db.internal\n  port: 9030\n").unwrap();
        assert!(reject_secrets(&v, "config.yaml").is_ok());
    }
}
