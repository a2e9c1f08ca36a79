// src/internal/server/tool/params.rs

use anyhow::{anyhow, Result};
use rmcp::model::JsonObject;
use schemars::JsonSchema;
use serde::Deserialize;

/// Arguments of the `run_tests` tool
#[derive(Debug, Default, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RunTestsParams {
    /// Test files or directories to run; all tests when omitted
    #[serde(default)]
    pub files: Option<Vec<String>>,
    /// Only run tests whose name matches this pattern
    #[serde(default)]
    pub filter: Option<String>,
    /// Extra arguments passed through to the test runner verbatim
    #[serde(default)]
    pub extra_args: Option<Vec<String>>,
}

impl RunTestsParams {
    /// Runner arguments after the configured prefix
    pub fn to_args(&self, filter_flag: &str) -> Vec<String> {
        let mut args: Vec<String> = self.files.clone().unwrap_or_default();
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.is_empty()) {
            args.push(filter_flag.to_string());
            args.push(filter.to_string());
        }
        args.extend(self.extra_args.clone().unwrap_or_default());
        args
    }
}

/// Arguments of the `show_coverage` tool
#[derive(Debug, Default, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ShowCoverageParams {
    /// Restrict the coverage run to these test files
    #[serde(default)]
    pub files: Option<Vec<String>>,
    /// Extra arguments passed through to the test runner verbatim
    #[serde(default)]
    pub extra_args: Option<Vec<String>>,
}

impl ShowCoverageParams {
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self.files.clone().unwrap_or_default();
        args.extend(self.extra_args.clone().unwrap_or_default());
        args
    }
}

/// JSON schema of `T` as the object rmcp expects for `inputSchema`
pub fn input_schema<T: JsonSchema>() -> Result<JsonObject> {
    match serde_json::to_value(schemars::schema_for!(T))? {
        serde_json::Value::Object(object) => Ok(object),
        other => Err(anyhow!("schema is not a JSON object: {}", other)),
    }
}
