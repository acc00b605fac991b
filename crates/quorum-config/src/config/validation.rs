use std::collections::HashSet;

use quorum_utils::error::ConfigError;

use super::Config;

fn invalid(key: impl Into<String>, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
    }
}

impl Config {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns the first problem found as `ConfigError`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coders.is_empty() {
            return Err(ConfigError::MissingRequired(
                "at least one [[coders]] entry".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for coder in &self.coders {
            if coder.name.trim().is_empty() {
                return Err(invalid("coders.name", "must not be empty"));
            }
            if !seen.insert(coder.name.as_str()) {
                return Err(invalid(
                    "coders.name",
                    format!("duplicate coder name '{}'", coder.name),
                ));
            }
            coder.provider_kind()?;
            if coder.timeout_secs == 0 {
                return Err(invalid(
                    format!("{}.timeout_secs", coder.name),
                    "must be greater than 0",
                ));
            }
            if coder.model.trim().is_empty() {
                return Err(invalid(format!("{}.model", coder.name), "must not be empty"));
            }
        }

        self.coordinator.provider_kind()?;
        if self.coordinator.timeout_secs == 0 {
            return Err(invalid("coordinator.timeout_secs", "must be greater than 0"));
        }

        if !seen.contains(self.orchestrator.preferred_backend.as_str()) {
            return Err(invalid(
                "orchestrator.preferred_backend",
                format!(
                    "'{}' is not a configured coder (configured: {})",
                    self.orchestrator.preferred_backend,
                    self.coders
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        }

        if self.orchestrator.max_search_results == 0 {
            return Err(invalid(
                "orchestrator.max_search_results",
                "must be greater than 0",
            ));
        }

        if self.orchestrator.stream_buffer == 0 {
            return Err(invalid("orchestrator.stream_buffer", "must be greater than 0"));
        }

        if self.orchestrator.simple_question_marker.trim().is_empty() {
            return Err(invalid(
                "orchestrator.simple_question_marker",
                "must not be empty",
            ));
        }

        let mut search_names = HashSet::new();
        for provider in &self.search {
            provider.provider_kind()?;
            if !search_names.insert(provider.name.as_str()) {
                return Err(invalid(
                    "search.name",
                    format!("duplicate search provider name '{}'", provider.name),
                ));
            }
            if provider.timeout_secs == 0 {
                return Err(invalid(
                    format!("search.{}.timeout_secs", provider.name),
                    "must be greater than 0",
                ));
            }
        }

        if self.server.port_search_attempts == 0 {
            return Err(invalid("server.port_search_attempts", "must be greater than 0"));
        }

        for (model, coder) in &self.server.direct_models {
            if !seen.contains(coder.as_str()) {
                return Err(invalid(
                    format!("server.direct_models.{model}"),
                    format!("'{coder}' is not a configured coder"),
                ));
            }
        }

        Ok(())
    }
}
