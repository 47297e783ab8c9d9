use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

/// Resolves which model a search runs on.
///
/// An explicit request wins when the registry knows it and it has the needed
/// capability. Otherwise the caller's preferred model is used, then the first
/// registered model for the capability (restricted to `provider` when set).
#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
    pub provider: Option<String>,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
            provider: None,
        }
    }

    pub fn for_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
        preferred: Option<&str>,
    ) -> Result<ModelSelection, String> {
        let (fallback_reason, requested_text) = if let Some(requested_value) = requested {
            if let Some(model) = self
                .registry
                .ensure(requested_value, capability)
                .filter(|model| self.provider_matches(model))
            {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            (
                Some(format!(
                    "Requested model '{requested_value}' unavailable for capability '{capability}'."
                )),
                Some(requested_value.to_string()),
            )
        } else {
            (None, None)
        };

        let preferred_model = preferred
            .and_then(|name| self.registry.ensure(name, capability))
            .filter(|model| self.provider_matches(model));
        if let Some(model) = preferred_model {
            return Ok(ModelSelection {
                model,
                requested: requested_text,
                fallback_reason,
            });
        }

        let candidates = self
            .registry
            .by_capability(capability, self.provider.as_deref());
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for capability '{capability}'."
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested_text,
            fallback_reason: fallback_reason
                .or_else(|| Some("No model specified; using default.".to_string())),
        })
    }

    fn provider_matches(&self, model: &ModelSpec) -> bool {
        self.provider
            .as_deref()
            .map_or(true, |provider| model.provider == provider)
    }
}
