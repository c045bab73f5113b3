//! Environment variable expansion for configuration values.
//!
//! `${VAR}` expands to the value of `VAR` and fails when it is unset.
//! `${VAR:-default}` falls back to `default`. A value without any `${` is
//! returned untouched, bare `$VAR` included. Once a value contains `${`,
//! bare `$VAR` references in it are expanded too.

use crate::ConfigError;

/// Variable that was referenced but not set.
struct UnsetVar(String);

/// Expand `${VAR}` references in a string value.
///
/// `field` names the config key (e.g. `server.host`) for error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, UnsetVar> {
        std::env::var(var)
            .map(Some)
            .map_err(|_| UnsetVar(var.to_owned()))
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.0),
    })
}

/// Expand `${VAR}` references and a leading `~` in a path value.
pub(crate) fn expand_path(value: &str, field: &str) -> Result<String, ConfigError> {
    let expanded = expand_env(value, field)?;
    Ok(shellexpand::tilde(&expanded).into_owned())
}
