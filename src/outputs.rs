use crate::api::{ApiError, AttributeApi, AttributeWriteRequest, Attributes, ResourceScope};
use crate::attribute_names::AttributeNames;
use crate::shared::ExecutionLogger;
use serde::Deserialize;
use serde_json::Value;

pub mod render;

pub use render::{render_aggregate, render_direct, render_pair, SENSITIVE_PLACEHOLDER};

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("terraform output is not valid json: {0}")]
    Json(#[source] serde_json::Error),
    #[error("terraform output must be a json object, got {0}")]
    NotAnObject(&'static str),
    #[error("terraform output `{name}` is malformed: {reason}")]
    Entry { name: String, reason: String },
    #[error("failed to write outputs back: {0}")]
    Api(#[from] ApiError),
}

/// One entry of `terraform output -json`.
///
/// The value is only reachable through the renderers in [`render`], which
/// apply sensitive masking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputValue {
    name: String,
    value: String,
    sensitive: bool,
    value_type: String,
}

impl OutputValue {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        sensitive: bool,
        value_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            sensitive,
            value_type: value_type.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    pub fn value_type(&self) -> &str {
        &self.value_type
    }

    pub(crate) fn expose_value(&self) -> &str {
        &self.value
    }
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    value: Value,
    #[serde(default)]
    sensitive: bool,
    #[serde(default, rename = "type")]
    value_type: Option<Value>,
}

pub fn parse_output_json(raw: &str) -> Result<Vec<OutputValue>, OutputError> {
    let document: Value = serde_json::from_str(raw).map_err(OutputError::Json)?;
    parse_output_value(document)
}

pub fn parse_output_value(document: Value) -> Result<Vec<OutputValue>, OutputError> {
    let Value::Object(entries) = document else {
        return Err(OutputError::NotAnObject(json_kind(&document)));
    };
    entries
        .into_iter()
        .map(|(name, entry)| {
            let parsed: RawOutput =
                serde_json::from_value(entry).map_err(|e| OutputError::Entry {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            Ok(OutputValue {
                value: value_text(&parsed.value),
                sensitive: parsed.sensitive,
                value_type: parsed.value_type.as_ref().map(value_text).unwrap_or_default(),
                name,
            })
        })
        .collect()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputLimits {
    pub max_value_chars: Option<usize>,
}

/// Maps Terraform outputs onto `out_<Name>` attributes and the aggregate
/// `Terraform Outputs` attribute.
pub struct OutputService<'a> {
    api: &'a dyn AttributeApi,
    names: &'a AttributeNames,
    logger: &'a dyn ExecutionLogger,
    limits: OutputLimits,
}

impl<'a> OutputService<'a> {
    pub fn new(
        api: &'a dyn AttributeApi,
        names: &'a AttributeNames,
        logger: &'a dyn ExecutionLogger,
        limits: OutputLimits,
    ) -> Self {
        Self {
            api,
            names,
            logger,
            limits,
        }
    }

    /// Builds the write-back batch. Outputs with a declared `out_` attribute
    /// are written directly; the rest go to the aggregate attribute when the
    /// resource has one.
    pub fn reconcile(
        &self,
        outputs: &[OutputValue],
        attributes: &Attributes,
    ) -> Vec<AttributeWriteRequest> {
        let mut requests = Vec::new();
        let mut unmapped = Vec::new();
        for output in outputs {
            match self.names.find_out(attributes, output.name()) {
                Some((attribute, _)) => {
                    requests.push(self.write_request(attribute, render_direct(output)))
                }
                None => unmapped.push(output),
            }
        }

        let aggregate = render_aggregate(unmapped);
        if !aggregate.is_empty() {
            match self.names.find_outputs(attributes) {
                Some((attribute, _)) => requests.push(self.write_request(attribute, aggregate)),
                None => self.logger.info(
                    "outputs.unmapped.dropped",
                    "unmapped outputs ignored; resource has no aggregate outputs attribute",
                ),
            }
        }
        requests
    }

    /// Parses `terraform output -json`, reconciles and writes the batch in a
    /// single call. An empty batch makes no call at all.
    pub fn parse_and_save_outputs(
        &self,
        scope: &ResourceScope,
        attributes: &Attributes,
        output_json: &str,
    ) -> Result<Vec<AttributeWriteRequest>, OutputError> {
        let outputs = parse_output_json(output_json)?;
        let requests = self.reconcile(&outputs, attributes);
        if requests.is_empty() {
            self.logger
                .info("outputs.save.skipped", "no output attributes to update");
            return Ok(requests);
        }
        self.api.set_attributes(scope, &requests)?;
        self.logger.info(
            "outputs.save.completed",
            &format!("updated {} attribute(s)", requests.len()),
        );
        Ok(requests)
    }

    fn write_request(&self, attribute: &str, value: String) -> AttributeWriteRequest {
        let value = match self.limits.max_value_chars {
            Some(limit) => match render::truncate_to_limit(&value, limit) {
                Some(truncated) => {
                    self.logger.warn(
                        "outputs.value.truncated",
                        &format!("attribute `{attribute}` value exceeded {limit} chars"),
                    );
                    truncated
                }
                None => value,
            },
            None => value,
        };
        AttributeWriteRequest::new(attribute, value)
    }
}
