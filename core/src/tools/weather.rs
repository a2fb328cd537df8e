//! `weather` (spec §4.A, §6): the example HTTP adapter, gated by
//! `config.weather.enabled` and cached like any other read-only tool.
//! Grounded on the teacher's `codex-login` crate for the one place it also
//! needs a *blocking* `reqwest` call from inside otherwise-synchronous code
//! (`Tool::execute` has no executor handle to await on), rather than
//! threading an async runtime through the whole tool-dispatch path for one
//! adapter.

use std::time::Duration;

use serde_json::Value;
use serde_json::json;

use crate::error::CoreError;
use crate::error::Result;
use crate::policy::RiskLevel;
use crate::tools::ArgField;
use crate::tools::ArgKind;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolPayload;
use crate::tools::ToolSpec;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

pub struct WeatherTool {
    spec: ToolSpec,
    base_url: String,
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "weather",
                category: "web",
                args: &[
                    ArgField::required("location", ArgKind::String),
                    ArgField::optional("units", ArgKind::String),
                    ArgField::optional("lang", ArgKind::String),
                ],
                risk: RiskLevel::Safe,
                requires_confirm_write: false,
                requires_confirm_exec: false,
                needs_network: true,
                needs_workspace: false,
                cacheable: true,
                deprecated: false,
                open_args: false,
            },
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl WeatherTool {
    /// Override the endpoint, for tests against a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Tool for WeatherTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let location = args["location"].as_str().unwrap_or_default();
        if location.is_empty() {
            return Err(CoreError::InvalidArgs("location must be non-empty".to_string()));
        }
        let units = args.get("units").and_then(Value::as_str).unwrap_or(ctx.weather_units);
        let lang = args.get("lang").and_then(Value::as_str).unwrap_or(ctx.weather_lang);

        let api_key = ctx
            .weather_api_key
            .ok_or_else(|| CoreError::Config("weather tool requires weather.api_key to be configured".to_string()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let response = client
            .get(&self.base_url)
            .query(&[("q", location), ("units", units), ("lang", lang), ("appid", api_key)])
            .send()
            .map_err(|e| CoreError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(CoreError::Network(format!("HTTP {status}: {body}")));
        }

        let value: Value = response.json().map_err(|e| CoreError::Network(e.to_string()))?;
        Ok(ToolPayload::Weather {
            value: json!({
                "location": location,
                "units": units,
                "lang": lang,
                "raw": value,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_apply_patch::PatchEngine;
    use crate::cache::ToolResultCache;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    #[test]
    fn missing_api_key_is_a_config_error() {
        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024);
        let tool = WeatherTool::default();
        let err = tool.execute(&json!({"location": "Berlin"}), &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[tokio::test]
    async fn fetches_and_wraps_the_upstream_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"main": {"temp": 21.0}})))
            .mount(&server)
            .await;

        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024).with_weather(
            Some("test-key"),
            "metric",
            "en",
        );
        let tool = WeatherTool::default().with_base_url(server.uri());
        let payload = tool.execute(&json!({"location": "Berlin"}), &mut ctx).expect("weather");
        match payload {
            ToolPayload::Weather { value } => {
                assert_eq!(value["location"], "Berlin");
                assert_eq!(value["raw"]["main"]["temp"], 21.0);
            }
            _ => panic!("wrong payload"),
        }
    }
}
