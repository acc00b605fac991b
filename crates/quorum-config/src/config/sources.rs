use std::collections::BTreeMap;

use super::{Config, ConfigSource};

fn source_label(source: Option<&ConfigSource>) -> String {
    source.unwrap_or(&ConfigSource::Defaults).to_string()
}

impl Config {
    /// Get effective configuration as key-value pairs with source attribution
    ///
    /// Sorted by key so `quorum config` output is stable.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add = |key: &str, value: String| {
            let source = source_label(self.source_attribution.get(key));
            config.insert(key.to_string(), (value, source));
        };

        add("server.host", self.server.host.clone());
        add("server.port", self.server.port.to_string());
        add(
            "server.port_search_attempts",
            self.server.port_search_attempts.to_string(),
        );
        add("server.api_key_env", self.server.api_key_env.clone());
        add("server.agent_model", self.server.agent_model.clone());
        add(
            "server.direct_models",
            self.server
                .direct_models
                .iter()
                .map(|(model, coder)| format!("{model}={coder}"))
                .collect::<Vec<_>>()
                .join(", "),
        );

        add(
            "orchestrator.preferred_backend",
            self.orchestrator.preferred_backend.clone(),
        );
        add(
            "orchestrator.simple_question_marker",
            self.orchestrator.simple_question_marker.clone(),
        );
        add(
            "orchestrator.search_vocabulary",
            self.orchestrator.search_vocabulary.join(", "),
        );
        add(
            "orchestrator.max_search_results",
            self.orchestrator.max_search_results.to_string(),
        );
        add(
            "orchestrator.stream_buffer",
            self.orchestrator.stream_buffer.to_string(),
        );
        add(
            "orchestrator.memory_artifacts_in_prompt",
            self.orchestrator.memory_artifacts_in_prompt.to_string(),
        );
        if let Some(path) = &self.orchestrator.artifact_path {
            add("orchestrator.artifact_path", path.display().to_string());
        }

        add(
            "coordinator",
            format!(
                "{} ({}, {})",
                self.coordinator.name, self.coordinator.provider, self.coordinator.model
            ),
        );
        add(
            "coders",
            self.coders
                .iter()
                .map(|c| {
                    if c.backups.is_empty() {
                        format!("{} ({})", c.name, c.model)
                    } else {
                        format!("{} ({} +{} backups)", c.name, c.model, c.backups.len())
                    }
                })
                .collect::<Vec<_>>()
                .join(", "),
        );
        add(
            "search",
            self.search
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> "),
        );
        add("memory.backend", self.memory.backend.to_string());
        add("memory.dir", self.memory.dir.display().to_string());

        config
    }
}
