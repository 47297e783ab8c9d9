use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chroma_contracts::color::ColorRecord;
use chroma_contracts::error::LookupError;
use chroma_contracts::events::{event_payload, EventWriter};
use chroma_contracts::models::{ModelRegistry, ModelSelection, ModelSelector};
use chroma_contracts::normalize::{normalize, reconcile_multi, reconcile_single};
use chroma_contracts::prompts::{
    code_lookup_prompt, image_identification_prompt, value_lookup_prompt, ImageAttachment,
    PromptRequest, SearchMode, ValueSpace, JSON_MIME_TYPE,
};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

pub const DEFAULT_IMAGE_MAX_DIM: u32 = 1024;
const MIN_IMAGE_DIM: u32 = 128;
const JPEG_QUALITY: u8 = 80;
const GEMINI_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub mode: SearchMode,
    pub model: String,
    pub prompt: String,
    pub attachment: Option<ImageAttachment>,
    pub response_mime_type: String,
    pub provider_options: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
    pub model: String,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub provider_request: Map<String, Value>,
    pub provider_response: Map<String, Value>,
}

/// One external text-generation backend.
///
/// Implementations make exactly one call per `generate`; retrying is left to
/// the user.
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LookupError>;
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Box<dyn TextProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: TextProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn TextProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(GeminiProvider::new());
    registry.register(DryrunProvider);
    registry
}

/// Offline provider answering with a deterministic color.
///
/// The answer is wrapped in prose and a markdown fence the way chat models
/// often reply, so the normal parsing path is exercised.
pub struct DryrunProvider;

impl TextProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LookupError> {
        let mut hasher = Sha256::new();
        hasher.update(request.prompt.as_bytes());
        if let Some(attachment) = request.attachment.as_ref() {
            hasher.update(&attachment.bytes);
        }
        let digest = hasher.finalize();
        let (r, g, b) = (digest[0], digest[1], digest[2]);
        let (l, a, lab_b) = srgb_to_lab(r, g, b);
        let record = json!({
            "library": "Dryrun",
            "code": format!("DRY-{}", hex::encode_upper(&digest[3..5])),
            "nameEN": format!("Dryrun swatch {}", hex::encode(&digest[..3])),
            "nameZH": "试运行色样",
            "hex": format!("#{}", hex::encode_upper([r, g, b])),
            "rgb": {"r": r, "g": g, "b": b},
            "lab": {"l": round1(l), "a": round1(a), "b": round1(lab_b)},
            "description": "Synthesized offline; no model was called.",
        });
        let body = match request.mode {
            SearchMode::Image => json!({ "colors": [record] }),
            SearchMode::Code | SearchMode::Value => record,
        };
        let pretty = serde_json::to_string_pretty(&body).context("dryrun body encode failed")?;
        Ok(GenerateResponse {
            text: format!("Here is the closest match:\n```json\n{pretty}\n```"),
            model: request.model.clone(),
            input_tokens: None,
            output_tokens: None,
            provider_request: map_object(json!({ "model": request.model })),
            provider_response: map_object(json!({ "synthetic": true })),
        })
    }
}

pub struct GeminiProvider {
    api_base: String,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self::with_api_base(
            env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
        )
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            http: HttpClient::new(),
        }
    }

    fn api_key() -> Option<String> {
        GEMINI_KEY_VARS.iter().find_map(|key| non_empty_env(key))
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_parts(request: &GenerateRequest) -> Vec<Value> {
        let mut parts = Vec::new();
        if let Some(attachment) = request.attachment.as_ref() {
            parts.push(json!({
                "inlineData": {
                    "mimeType": attachment.mime_type,
                    "data": BASE64.encode(&attachment.bytes),
                }
            }));
        }
        parts.push(json!({ "text": request.prompt }));
        parts
    }

    fn build_payload(request: &GenerateRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": Self::build_parts(request),
            }],
            "generationConfig": {
                "responseMimeType": request.response_mime_type,
            },
        })
    }

    /// `None` leaves the HTTP client's own default in place.
    fn request_timeout(request: &GenerateRequest) -> Option<Duration> {
        let seconds = request
            .provider_options
            .get("request_timeout")
            .and_then(parse_value_to_f64)?;
        Some(Duration::from_secs_f64(seconds.clamp(5.0, 300.0)))
    }

    fn extract_text(response_payload: &Value) -> String {
        let mut text = String::new();
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for part in parts {
                if part.get("thought").and_then(Value::as_bool) == Some(true) {
                    continue;
                }
                if let Some(chunk) = part.get("text").and_then(Value::as_str) {
                    text.push_str(chunk);
                }
            }
        }
        text
    }

    fn extract_usage(response_payload: &Value) -> (Option<i64>, Option<i64>) {
        let usage = response_payload.get("usageMetadata");
        let read = |key: &str| {
            usage
                .and_then(|usage| usage.get(key))
                .and_then(Value::as_i64)
        };
        (read("promptTokenCount"), read("candidatesTokenCount"))
    }

    fn generate_with_key(
        &self,
        request: &GenerateRequest,
        api_key: Option<String>,
    ) -> Result<GenerateResponse, LookupError> {
        let Some(api_key) = api_key else {
            return Err(LookupError::Configuration(format!(
                "API Key is missing. Set {}.",
                GEMINI_KEY_VARS.join(" or ")
            )));
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);

        let mut call = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key.as_str())])
            .json(&payload);
        if let Some(timeout) = Self::request_timeout(request) {
            call = call.timeout(timeout);
        }
        let response = call
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        let text = Self::extract_text(&response_payload);
        if text.is_empty() {
            return Err(LookupError::EmptyResponse);
        }
        let (input_tokens, output_tokens) = Self::extract_usage(&response_payload);

        Ok(GenerateResponse {
            text,
            model: request.model.clone(),
            input_tokens,
            output_tokens,
            provider_request: map_object(json!({
                "endpoint": endpoint,
                "has_image": request.attachment.is_some(),
            })),
            provider_response: map_object(json!({
                "candidates": response_payload
                    .get("candidates")
                    .and_then(Value::as_array)
                    .map(|rows| rows.len())
                    .unwrap_or(0),
                "model_version": response_payload.get("modelVersion").cloned().unwrap_or(Value::Null),
            })),
        })
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TextProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LookupError> {
        self.generate_with_key(request, Self::api_key())
    }
}

/// Search façade tying prompts, provider, normalizer and events together.
pub struct ColorEngine {
    providers: ProviderRegistry,
    provider: String,
    model: Option<String>,
    models: ModelRegistry,
    provider_options: Map<String, Value>,
    events: Option<EventWriter>,
}

impl ColorEngine {
    pub fn new(providers: ProviderRegistry, provider: &str) -> Result<Self, LookupError> {
        let mut engine = Self {
            providers,
            provider: String::new(),
            model: None,
            models: ModelRegistry::new(None),
            provider_options: Map::new(),
            events: None,
        };
        engine.set_provider(provider)?;
        Ok(engine)
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn events(&self) -> Option<&EventWriter> {
        self.events.as_ref()
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn set_provider(&mut self, name: &str) -> Result<(), LookupError> {
        let name = name.trim();
        if self.providers.get(name).is_none() {
            return Err(LookupError::UnknownProvider(name.to_string()));
        }
        self.provider = name.to_string();
        Ok(())
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: Option<String>) {
        self.model = model
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
    }

    pub fn set_request_timeout(&mut self, seconds: f64) {
        self.provider_options
            .insert("request_timeout".to_string(), json!(seconds));
    }

    pub fn search_by_code(&self, code: &str) -> Result<ColorRecord, LookupError> {
        let code = code.trim();
        self.search(
            SearchMode::Code,
            json!({ "code": code }),
            || {
                if code.is_empty() {
                    return Err(LookupError::MissingInput("Code"));
                }
                Ok(code_lookup_prompt(code))
            },
            single_record,
        )
        .map(|(record, _)| record)
    }

    pub fn identify_from_image(
        &self,
        jpeg_bytes: Vec<u8>,
    ) -> Result<Vec<ColorRecord>, LookupError> {
        let query = json!({ "image_bytes": jpeg_bytes.len() });
        self.search(
            SearchMode::Image,
            query,
            move || {
                if jpeg_bytes.is_empty() {
                    return Err(LookupError::MissingInput("Image"));
                }
                Ok(image_identification_prompt(jpeg_bytes))
            },
            multi_records,
        )
        .map(|(records, _)| records)
    }

    pub fn identify_from_path(
        &self,
        path: &Path,
        max_dim: u32,
    ) -> Result<Vec<ColorRecord>, LookupError> {
        let jpeg = prepare_jpeg(path, max_dim)?;
        self.identify_from_image(jpeg)
    }

    pub fn search_by_values(
        &self,
        space: ValueSpace,
        values: [f64; 3],
    ) -> Result<ColorRecord, LookupError> {
        self.search(
            SearchMode::Value,
            json!({ "space": space.as_str(), "values": values }),
            || Ok(value_lookup_prompt(space, values)),
            single_record,
        )
        .map(|(record, _)| record)
    }

    /// Providers without registered models accept any capable model name.
    fn select_model(&self, mode: SearchMode) -> Result<ModelSelection, LookupError> {
        let mut selector = ModelSelector::new(Some(self.models.clone()));
        if self.models.list().any(|model| model.provider == self.provider) {
            selector = selector.for_provider(self.provider.clone());
        }
        selector
            .select(
                self.model.as_deref(),
                mode.capability(),
                Some(mode.default_model()),
            )
            .map_err(LookupError::Configuration)
    }

    fn call(
        &self,
        prompt: PromptRequest,
    ) -> Result<(Value, GenerateResponse, ModelSelection), LookupError> {
        let provider = self
            .providers
            .get(&self.provider)
            .ok_or_else(|| LookupError::UnknownProvider(self.provider.clone()))?;
        let selection = self.select_model(prompt.mode)?;
        let request = GenerateRequest {
            mode: prompt.mode,
            model: selection.model.name.clone(),
            prompt: prompt.text,
            attachment: prompt.attachment,
            response_mime_type: JSON_MIME_TYPE.to_string(),
            provider_options: self.provider_options.clone(),
        };
        let response = provider.generate(&request)?;
        if response.text.is_empty() {
            return Err(LookupError::EmptyResponse);
        }
        let value = normalize(&response.text)?.ok_or(LookupError::EmptyResponse)?;
        Ok((value, response, selection))
    }

    fn search<T: RecordCodes>(
        &self,
        mode: SearchMode,
        query: Value,
        prompt: impl FnOnce() -> Result<PromptRequest, LookupError>,
        convert: fn(Value) -> Result<T, LookupError>,
    ) -> Result<(T, GenerateResponse), LookupError> {
        let started = Instant::now();
        self.emit(
            "search_started",
            json!({
                "mode": mode.as_str(),
                "provider": self.provider,
                "query": query,
            }),
        );

        let outcome = prompt()
            .and_then(|prompt| self.call(prompt))
            .and_then(|(value, response, selection)| {
                convert(value).map(|output| (output, response, selection))
            });

        match outcome {
            Ok((output, response, selection)) => {
                self.emit(
                    "search_completed",
                    json!({
                        "mode": mode.as_str(),
                        "provider": self.provider,
                        "model": response.model,
                        "model_fallback_reason": selection.fallback_reason,
                        "codes": output.codes(),
                        "input_tokens": response.input_tokens,
                        "output_tokens": response.output_tokens,
                        "provider_request": response.provider_request,
                        "provider_response": response.provider_response,
                        "elapsed_ms": started.elapsed().as_millis() as u64,
                    }),
                );
                Ok((output, response))
            }
            Err(err) => {
                self.emit(
                    "search_failed",
                    json!({
                        "mode": mode.as_str(),
                        "provider": self.provider,
                        "kind": err.kind(),
                        "message": error_text(&err),
                        "elapsed_ms": started.elapsed().as_millis() as u64,
                    }),
                );
                Err(err)
            }
        }
    }

    fn emit(&self, event_type: &str, payload: Value) {
        if let Some(events) = self.events.as_ref() {
            events.emit_quiet(event_type, event_payload(payload));
        }
    }
}

trait RecordCodes {
    fn codes(&self) -> Vec<String>;
}

impl RecordCodes for ColorRecord {
    fn codes(&self) -> Vec<String> {
        vec![self.code.clone()]
    }
}

impl RecordCodes for Vec<ColorRecord> {
    fn codes(&self) -> Vec<String> {
        self.iter().map(|record| record.code.clone()).collect()
    }
}

fn single_record(value: Value) -> Result<ColorRecord, LookupError> {
    ColorRecord::from_value(&reconcile_single(value)?)
}

/// Entries without a usable code are dropped; nothing usable is an empty result.
fn multi_records(value: Value) -> Result<Vec<ColorRecord>, LookupError> {
    let records: Vec<ColorRecord> = reconcile_multi(value)?
        .iter()
        .filter_map(|item| ColorRecord::from_value(item).ok())
        .collect();
    if records.is_empty() {
        return Err(LookupError::EmptyResult);
    }
    Ok(records)
}

/// Encodes an image file as the JPEG payload sent to the model.
///
/// Alpha is flattened onto white and the longest side is capped at
/// `max_dim`. Files the decoder cannot read are only passed through when
/// they already claim to be JPEG.
pub fn prepare_jpeg(path: &Path, max_dim: u32) -> Result<Vec<u8>> {
    match image::open(path) {
        Ok(image) => encode_jpeg(image, max_dim),
        Err(err) => {
            if is_jpeg_path(path) {
                return fs::read(path).with_context(|| format!("failed reading {}", path.display()));
            }
            Err(anyhow::Error::new(err).context(format!("failed decoding {}", path.display())))
        }
    }
}

pub fn prepare_jpeg_from_memory(bytes: &[u8], max_dim: u32) -> Result<Vec<u8>> {
    let image = image::load_from_memory(bytes).context("failed decoding image bytes")?;
    encode_jpeg(image, max_dim)
}

fn encode_jpeg(image: DynamicImage, max_dim: u32) -> Result<Vec<u8>> {
    let dim = max_dim.max(MIN_IMAGE_DIM);
    let rgba = image.to_rgba8();
    let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u32::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            ((u32::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8
        };
        flattened.put_pixel(
            x,
            y,
            Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
        );
    }
    let mut image = DynamicImage::ImageRgba8(flattened);
    if image.width().max(image.height()) > dim {
        image = image.resize(dim, dim, FilterType::Triangle);
    }
    let rgb = image.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        bail!("image has no pixels");
    }
    let mut bytes = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY))
        .context("JPEG encode failed")?;
    Ok(bytes)
}

fn is_jpeg_path(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// sRGB (D65) to CIE L*a*b*.
fn srgb_to_lab(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let linear = |channel: u8| {
        let value = f64::from(channel) / 255.0;
        if value > 0.04045 {
            ((value + 0.055) / 1.055).powf(2.4)
        } else {
            value / 12.92
        }
    };
    let (r, g, b) = (linear(r), linear(g), linear(b));
    let x = (r * 0.4124564 + g * 0.3575761 + b * 0.1804375) / 0.95047;
    let y = r * 0.2126729 + g * 0.7151522 + b * 0.0721750;
    let z = (r * 0.0193339 + g * 0.1191920 + b * 0.9503041) / 1.08883;
    let f = |t: f64| {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    };
    let (fx, fy, fz) = (f(x), f(y), f(z));
    (116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn error_text(err: &LookupError) -> String {
    match err {
        LookupError::Transport(inner) => truncate_text(&format!("{inner:#}"), 512),
        other => other.to_string(),
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn parse_value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|value| value.is_finite())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
