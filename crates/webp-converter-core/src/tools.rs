//! Remote-invokable tools.
//!
//! Each tool is a value implementing [`Tool`]: a name, a description, a JSON
//! schema for its arguments and an `execute` taking JSON arguments. The
//! [`ToolRegistry`] dispatches calls by name and also speaks the JSON-lines
//! request format used by the stdio server.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::batch::BatchCoordinator;
use crate::codec::ImageCodec;
use crate::error::{Error, Result};
use crate::types::{clamp_quality, BatchResult, ConversionOptions, ConversionRequest};

pub const CONVERT_TOOL: &str = "convert_to_webp";
pub const BATCH_TOOL: &str = "batch_convert_to_webp";
pub const BASE64_TOOL: &str = "convert_base64_to_webp";

/// Pseudo-tool answering with the catalogue of registered tools
pub const LIST_TOOLS: &str = "list_tools";

/// A capability that can be invoked with JSON arguments
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object
    fn input_schema(&self) -> Value;

    /// Run the tool. Conversion failures are part of the returned value;
    /// `Err` is reserved for malformed arguments.
    fn execute(&self, arguments: Value) -> Result<Value>;
}

fn parse_arguments<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| Error::Tool(format!("invalid arguments for {}: {}", tool, e)))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Tool(format!("cannot serialize result: {}", e)))
}

/// Fill unset request fields from the configured defaults
fn resolve_options(
    defaults: ConversionOptions,
    quality: Option<i64>,
    lossless: Option<bool>,
    keep_original: Option<bool>,
) -> ConversionOptions {
    ConversionOptions {
        quality: quality.map(clamp_quality).unwrap_or(defaults.quality),
        lossless: lossless.unwrap_or(defaults.lossless),
        keep_original: keep_original.unwrap_or(defaults.keep_original),
    }
}

fn options_schema() -> Value {
    json!({
        "quality": {
            "type": "integer",
            "minimum": 0,
            "maximum": 100,
            "default": 80,
            "description": "Lossy quality (0-100); values outside the range are clamped"
        },
        "lossless": {
            "type": "boolean",
            "default": false,
            "description": "Encode losslessly"
        },
        "keep_original": {
            "type": "boolean",
            "default": false,
            "description": "Keep the source image after converting"
        }
    })
}

#[derive(Debug, Deserialize)]
struct ConvertArgs {
    image_path: PathBuf,
    quality: Option<i64>,
    lossless: Option<bool>,
    keep_original: Option<bool>,
}

/// `convert_to_webp`: convert a single image file
pub struct ConvertTool<C> {
    coordinator: Arc<BatchCoordinator<C>>,
    defaults: ConversionOptions,
}

impl<C: ImageCodec> ConvertTool<C> {
    pub fn new(coordinator: Arc<BatchCoordinator<C>>, defaults: ConversionOptions) -> Self {
        Self {
            coordinator,
            defaults,
        }
    }
}

impl<C: ImageCodec> Tool for ConvertTool<C> {
    fn name(&self) -> &'static str {
        CONVERT_TOOL
    }

    fn description(&self) -> &'static str {
        "Convert a PNG or JPEG image to WebP next to the original"
    }

    fn input_schema(&self) -> Value {
        let mut properties = options_schema();
        properties["image_path"] = json!({
            "type": "string",
            "description": "Path of the image to convert"
        });
        json!({
            "type": "object",
            "properties": properties,
            "required": ["image_path"]
        })
    }

    fn execute(&self, arguments: Value) -> Result<Value> {
        let args: ConvertArgs = parse_arguments(self.name(), arguments)?;
        let options = resolve_options(self.defaults, args.quality, args.lossless, args.keep_original);

        let request = ConversionRequest::new(&args.image_path, options);
        to_value(&self.coordinator.engine().convert(&request))
    }
}

#[derive(Debug, Deserialize)]
struct BatchArgs {
    image_paths: Vec<PathBuf>,
    quality: Option<i64>,
    lossless: Option<bool>,
    keep_original: Option<bool>,
}

/// Serialized form of a batch: summary counts plus ordered results
#[derive(Debug, Serialize)]
struct BatchReport<'a> {
    total: usize,
    succeeded: usize,
    failed: usize,
    #[serde(flatten)]
    batch: &'a BatchResult,
}

/// `batch_convert_to_webp`: convert files and directories
pub struct BatchTool<C> {
    coordinator: Arc<BatchCoordinator<C>>,
    defaults: ConversionOptions,
}

impl<C: ImageCodec> BatchTool<C> {
    pub fn new(coordinator: Arc<BatchCoordinator<C>>, defaults: ConversionOptions) -> Self {
        Self {
            coordinator,
            defaults,
        }
    }
}

impl<C: ImageCodec> Tool for BatchTool<C> {
    fn name(&self) -> &'static str {
        BATCH_TOOL
    }

    fn description(&self) -> &'static str {
        "Convert several images to WebP; directories are expanded to the PNG and JPEG files directly inside them"
    }

    fn input_schema(&self) -> Value {
        let mut properties = options_schema();
        properties["image_paths"] = json!({
            "type": "array",
            "items": { "type": "string" },
            "description": "Image files or directories to convert"
        });
        json!({
            "type": "object",
            "properties": properties,
            "required": ["image_paths"]
        })
    }

    fn execute(&self, arguments: Value) -> Result<Value> {
        let args: BatchArgs = parse_arguments(self.name(), arguments)?;
        let options = resolve_options(self.defaults, args.quality, args.lossless, args.keep_original);

        let batch = self.coordinator.run(&args.image_paths, options);
        to_value(&BatchReport {
            total: batch.len(),
            succeeded: batch.succeeded(),
            failed: batch.failed(),
            batch: &batch,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Base64Args {
    base64_image: String,
    output_path: PathBuf,
    quality: Option<i64>,
    lossless: Option<bool>,
}

/// `convert_base64_to_webp`: convert an inline payload to a file
pub struct Base64Tool<C> {
    coordinator: Arc<BatchCoordinator<C>>,
    defaults: ConversionOptions,
}

impl<C: ImageCodec> Base64Tool<C> {
    pub fn new(coordinator: Arc<BatchCoordinator<C>>, defaults: ConversionOptions) -> Self {
        Self {
            coordinator,
            defaults,
        }
    }
}

impl<C: ImageCodec> Tool for Base64Tool<C> {
    fn name(&self) -> &'static str {
        BASE64_TOOL
    }

    fn description(&self) -> &'static str {
        "Convert a base64-encoded PNG or JPEG (optionally a data URL) to a WebP file"
    }

    fn input_schema(&self) -> Value {
        let mut properties = options_schema();
        if let Some(map) = properties.as_object_mut() {
            map.remove("keep_original");
        }
        properties["base64_image"] = json!({
            "type": "string",
            "description": "Base64 image data or data URL"
        });
        properties["output_path"] = json!({
            "type": "string",
            "description": "Where to write the WebP file"
        });
        json!({
            "type": "object",
            "properties": properties,
            "required": ["base64_image", "output_path"]
        })
    }

    fn execute(&self, arguments: Value) -> Result<Value> {
        let args: Base64Args = parse_arguments(self.name(), arguments)?;
        let options = resolve_options(self.defaults, args.quality, args.lossless, None);

        let result = self.coordinator.engine().convert_base64(
            &args.base64_image,
            &args.output_path,
            options.quality,
            options.lossless,
        );
        to_value(&result)
    }
}

/// One request line of the stdio protocol
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: Value,
    pub tool: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    json!({})
}

/// One response line of the stdio protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Name-indexed set of tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the three conversion tools
    pub fn with_conversion_tools<C: ImageCodec + 'static>(
        coordinator: Arc<BatchCoordinator<C>>,
        defaults: ConversionOptions,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ConvertTool::new(coordinator.clone(), defaults)));
        registry.register(Box::new(BatchTool::new(coordinator.clone(), defaults)));
        registry.register(Box::new(Base64Tool::new(coordinator, defaults)));
        registry
    }

    /// Add a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|existing| existing.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(|tool| tool.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    /// Catalogue of every tool with its schema
    pub fn describe(&self) -> Value {
        Value::Array(
            self.tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name(),
                        "description": tool.description(),
                        "input_schema": tool.input_schema(),
                    })
                })
                .collect(),
        )
    }

    /// Invoke a tool by name
    pub fn call(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::Tool(format!("unknown tool: {}", name)))?;
        debug!("Calling tool {}", name);
        tool.execute(arguments)
    }

    /// Answer one JSON request line
    pub fn handle_line(&self, line: &str) -> ToolResponse {
        let call: ToolCall = match serde_json::from_str(line) {
            Ok(call) => call,
            Err(e) => {
                warn!("Rejecting malformed request: {}", e);
                return ToolResponse {
                    id: Value::Null,
                    result: None,
                    error: Some(format!("malformed request: {}", e)),
                };
            }
        };

        let outcome = if call.tool == LIST_TOOLS {
            Ok(self.describe())
        } else {
            self.call(&call.tool, call.arguments)
        };

        match outcome {
            Ok(result) => ToolResponse {
                id: call.id,
                result: Some(result),
                error: None,
            },
            Err(e) => ToolResponse {
                id: call.id,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::ConversionEngine;
    use crate::safety::PathGuard;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    /// Codec echoing its parameters into the output
    struct ParamCodec;

    impl ImageCodec for ParamCodec {
        fn extension(&self) -> &str {
            "webp"
        }

        fn encode(&self, _bytes: &[u8], quality: u8, lossless: bool) -> Result<Vec<u8>> {
            Ok(format!("q={} l={}", quality, lossless).into_bytes())
        }
    }

    fn registry(root: &Path) -> ToolRegistry {
        let engine = ConversionEngine::with_codec(PathGuard::with_base(&[root], root), ParamCodec);
        ToolRegistry::with_conversion_tools(
            Arc::new(BatchCoordinator::new(engine)),
            ConversionOptions::default(),
        )
    }

    #[test]
    fn test_registry_lists_three_tools() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        assert_eq!(registry.names(), vec![CONVERT_TOOL, BATCH_TOOL, BASE64_TOOL]);

        let catalogue = registry.describe();
        assert_eq!(catalogue.as_array().unwrap().len(), 3);
        assert_eq!(catalogue[0]["input_schema"]["required"][0], "image_path");
        assert!(catalogue[2]["input_schema"]["properties"]["keep_original"].is_null());
    }

    #[test]
    fn test_convert_uses_defaults() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.png");
        fs::write(&source, b"x").unwrap();

        let result = registry(dir.path())
            .call(CONVERT_TOOL, json!({ "image_path": source }))
            .unwrap();

        assert_eq!(result["status"], "success");
        assert_eq!(result["quality"], 80);
        assert_eq!(result["lossless"], false);
        assert!(!source.exists());
        assert_eq!(fs::read(dir.path().join("a.webp")).unwrap(), b"q=80 l=false");
    }

    #[test]
    fn test_convert_clamps_quality() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        fs::write(&source, b"x").unwrap();

        let result = registry(dir.path())
            .call(
                CONVERT_TOOL,
                json!({ "image_path": source, "quality": 250, "lossless": true, "keep_original": true }),
            )
            .unwrap();

        assert_eq!(result["quality"], 100);
        assert_eq!(result["lossless"], true);
        assert!(source.exists());
    }

    #[test]
    fn test_batch_report() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.png");
        fs::write(&good, b"x").unwrap();

        let result = registry(dir.path())
            .call(
                BATCH_TOOL,
                json!({ "image_paths": [good, dir.path().join("gone.png")] }),
            )
            .unwrap();

        assert_eq!(result["total"], 2);
        assert_eq!(result["succeeded"], 1);
        assert_eq!(result["failed"], 1);
        assert_eq!(result["results"][1]["status"], "failure");
        assert_eq!(result["results"][1]["error"], "file does not exist");
    }

    #[test]
    fn test_base64_tool() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("inline.webp");

        let result = registry(dir.path())
            .call(
                BASE64_TOOL,
                json!({ "base64_image": "aGVsbG8=", "output_path": output, "quality": 30 }),
            )
            .unwrap();

        assert_eq!(result["status"], "success");
        assert_eq!(fs::read(&output).unwrap(), b"q=30 l=false");
    }

    #[test]
    fn test_bad_arguments_and_unknown_tools_are_errors() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());

        assert!(matches!(
            registry.call(CONVERT_TOOL, json!({ "quality": 10 })),
            Err(Error::Tool(_))
        ));
        assert!(matches!(registry.call("resize", json!({})), Err(Error::Tool(_))));
    }

    #[test]
    fn test_handle_line() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());

        let listing = registry.handle_line(r#"{"id": 1, "tool": "list_tools"}"#);
        assert_eq!(listing.id, json!(1));
        assert_eq!(listing.result.unwrap().as_array().unwrap().len(), 3);

        let unknown = registry.handle_line(r#"{"id": "x", "tool": "nope"}"#);
        assert_eq!(unknown.id, json!("x"));
        assert_eq!(unknown.error.as_deref(), Some("tool error: unknown tool: nope"));

        let malformed = registry.handle_line("{not json");
        assert!(malformed.error.unwrap().starts_with("malformed request"));

        let missing = registry.handle_line(r#"{"id": 2, "tool": "convert_to_webp", "arguments": {"image_path": "none.png"}}"#);
        let result = missing.result.unwrap();
        assert_eq!(result["status"], "failure");
        assert_eq!(result["input_path"], "none.png");
    }
}
