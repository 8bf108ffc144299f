//! Resource descriptors: one resource kind described as data
//!
//! A [`ResourceDescriptor`] tells the generic engine everything it needs to
//! reconcile one kind of controller object:
//! - Identity (the ordered natural key)
//! - Endpoints for list/get/create/update/delete and how their parameters bind
//! - Per-field comparison and write policy
//! - How writes signal completion
//! - Optionally, a workflow of sub-steps for multi-call intents
//!
//! Descriptors are built once at start-up (in code or deserialized from a
//! file) and are read-only afterwards.
//!
//! # Example
//!
//! ```
//! use declarative::resource::{Completion, Endpoint, FieldPolicy, ResourceDescriptor};
//!
//! let desc = ResourceDescriptor::new("site")
//!     .identity(&["name"])
//!     .list(Endpoint::get("/dna/intent/api/v1/site").query_desired("name", "name"))
//!     .field(FieldPolicy::new("name").wire("siteNameHierarchy"))
//!     .completion(Completion::ExecutionId);
//!
//! assert_eq!(desc.wire_name("name"), "siteNameHierarchy");
//! ```

use crate::error::{ReconcileError, Result};
use crate::transport::{Method, Request};
use crate::types::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// How a field's desired and remote values are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Compare {
    #[default]
    Exact,
    CaseInsensitive,
    /// Lists compared as unordered sets
    Set,
    /// Desired list must be contained in the remote list
    Subset,
    /// Server-only metadata, never compared and stripped from canonical form
    Ignore,
}

/// Write operations a field may be sent on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOp {
    Create,
    Update,
}

fn both_writes() -> Vec<WriteOp> {
    vec![WriteOp::Create, WriteOp::Update]
}

/// Per-field rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPolicy {
    /// Name in the desired document
    pub name: String,
    /// Name on the wire, when different
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default)]
    pub compare: Compare,
    #[serde(default = "both_writes")]
    pub writable_on: Vec<WriteOp>,
    /// Redacted everywhere; compared only on explicit rotation
    #[serde(default)]
    pub secret: bool,
    /// Server-side default, equal to an omitted remote value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// For array-of-object fields, the sub-key that must be unique
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_by: Option<String>,
}

impl FieldPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote: None,
            compare: Compare::Exact,
            writable_on: both_writes(),
            secret: false,
            default: None,
            unique_by: None,
        }
    }

    pub fn wire(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    pub fn compare(mut self, compare: Compare) -> Self {
        self.compare = compare;
        self
    }

    pub fn case_insensitive(self) -> Self {
        self.compare(Compare::CaseInsensitive)
    }

    pub fn ignore(mut self) -> Self {
        self.compare = Compare::Ignore;
        self.writable_on.clear();
        self
    }

    pub fn create_only(mut self) -> Self {
        self.writable_on = vec![WriteOp::Create];
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable_on.clear();
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn unique_by(mut self, key: impl Into<String>) -> Self {
        self.unique_by = Some(key.into());
        self
    }

    /// Name used on the wire.
    pub fn wire_name(&self) -> &str {
        self.remote.as_deref().unwrap_or(&self.name)
    }

    pub fn is_writable(&self, op: WriteOp) -> bool {
        self.writable_on.contains(&op)
    }
}

/// Where a parameter's value comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    /// A field of the desired document
    Desired(String),
    /// A field (or JSON pointer) of the fetched remote object
    Remote(String),
    /// A constant
    Literal(String),
}

/// Where a parameter lands in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Body,
}

/// A single parameter binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamBinding {
    /// Placeholder name (path), query key or body key
    pub name: String,
    pub location: ParamLocation,
    pub source: ParamSource,
}

/// Shape of a write body
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyShape {
    #[default]
    Object,
    /// `[ {...} ]`
    Array,
    /// `{ "key": {...} }`
    Wrapped(String),
    /// `{ "key": [ {...} ] }`
    WrappedArray(String),
}

impl BodyShape {
    /// Wrap a payload object into this shape.
    pub fn wrap(&self, payload: Document) -> Value {
        let object = Value::Object(payload);
        match self {
            Self::Object => object,
            Self::Array => Value::Array(vec![object]),
            Self::Wrapped(key) => {
                let mut outer = Document::new();
                outer.insert(key.clone(), object);
                Value::Object(outer)
            }
            Self::WrappedArray(key) => {
                let mut outer = Document::new();
                outer.insert(key.clone(), Value::Array(vec![object]));
                Value::Object(outer)
            }
        }
    }
}

/// An HTTP endpoint with its parameter bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: Method,
    /// Path template with `{placeholder}` segments
    pub path: String,
    #[serde(default)]
    pub params: Vec<ParamBinding>,
    #[serde(default)]
    pub body: BodyShape,
    /// JSON pointer to the object/list inside the response envelope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,
}

impl Endpoint {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: BodyShape::Object,
            items: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    fn bind(mut self, name: &str, location: ParamLocation, source: ParamSource) -> Self {
        self.params.push(ParamBinding {
            name: name.to_string(),
            location,
            source,
        });
        self
    }

    pub fn path_desired(self, placeholder: &str, field: &str) -> Self {
        self.bind(placeholder, ParamLocation::Path, ParamSource::Desired(field.into()))
    }

    pub fn path_remote(self, placeholder: &str, field: &str) -> Self {
        self.bind(placeholder, ParamLocation::Path, ParamSource::Remote(field.into()))
    }

    pub fn query_desired(self, key: &str, field: &str) -> Self {
        self.bind(key, ParamLocation::Query, ParamSource::Desired(field.into()))
    }

    pub fn query_literal(self, key: &str, value: &str) -> Self {
        self.bind(key, ParamLocation::Query, ParamSource::Literal(value.into()))
    }

    pub fn body_remote(self, key: &str, field: &str) -> Self {
        self.bind(key, ParamLocation::Body, ParamSource::Remote(field.into()))
    }

    pub fn body_desired(self, key: &str, field: &str) -> Self {
        self.bind(key, ParamLocation::Body, ParamSource::Desired(field.into()))
    }

    pub fn shape(mut self, body: BodyShape) -> Self {
        self.body = body;
        self
    }

    pub fn items(mut self, pointer: &str) -> Self {
        self.items = Some(pointer.to_string());
        self
    }

    /// Whether every desired-sourced path parameter is supplied by `desired`.
    pub fn is_bound_by(&self, desired: &Document) -> bool {
        self.params.iter().all(|p| match (&p.location, &p.source) {
            (ParamLocation::Path, ParamSource::Desired(field)) => {
                desired.get(field).and_then(value_text).is_some()
            }
            (ParamLocation::Path, ParamSource::Remote(_)) => false,
            _ => true,
        })
    }

    /// Resolve bindings into a request plus the body parameters.
    ///
    /// Missing path parameters are a validation error; missing query or
    /// body parameters are skipped.
    pub fn render(&self, desired: &Document, remote: Option<&Value>) -> Result<(Request, Document)> {
        let mut path = self.path.clone();
        let mut request_query = Vec::new();
        let mut body = Document::new();

        for param in &self.params {
            let value = match &param.source {
                ParamSource::Desired(field) => desired.get(field).cloned(),
                ParamSource::Remote(field) => remote.and_then(|r| lookup(r, field)).cloned(),
                ParamSource::Literal(text) => Some(Value::String(text.clone())),
            };
            match param.location {
                ParamLocation::Path => {
                    let text = value.as_ref().and_then(value_text).ok_or_else(|| {
                        ReconcileError::validation(format!(
                            "path parameter '{}' of {} has no value",
                            param.name, self.path
                        ))
                    })?;
                    path = path.replace(&format!("{{{}}}", param.name), &encode_segment(&text));
                }
                ParamLocation::Query => {
                    if let Some(text) = value.as_ref().and_then(value_text) {
                        request_query.push((param.name.clone(), text));
                    }
                }
                ParamLocation::Body => {
                    if let Some(value) = value {
                        body.insert(param.name.clone(), value);
                    }
                }
            }
        }

        if path.contains('{') {
            return Err(ReconcileError::validation(format!(
                "unbound placeholder in {path}"
            )));
        }

        let mut request = Request::new(self.method, path);
        request.query = request_query;
        Ok((request, body))
    }

    /// Pull the interesting part out of a response envelope.
    ///
    /// Without an explicit pointer, Catalyst's `{"response": ...}` envelope
    /// is unwrapped when present.
    pub fn extract<'a>(&self, body: &'a Value) -> &'a Value {
        match &self.items {
            Some(pointer) => body.pointer(pointer).unwrap_or(&Value::Null),
            None => body.get("response").unwrap_or(body),
        }
    }
}

/// The five CRUD endpoints of a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Endpoint>,
}

fn offset_param() -> String {
    "offset".to_string()
}

fn limit_param() -> String {
    "limit".to_string()
}

const fn default_limit() -> u32 {
    500
}

const fn default_first_offset() -> u32 {
    1
}

/// How the list endpoint pages through results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Pagination {
    /// Single call returns everything
    #[default]
    None,
    /// `offset`/`limit` query parameters
    OffsetLimit {
        #[serde(default = "offset_param")]
        offset_param: String,
        #[serde(default = "limit_param")]
        limit_param: String,
        #[serde(default = "default_limit")]
        limit: u32,
        /// Catalyst Center offsets are 1-based on most endpoints
        #[serde(default = "default_first_offset")]
        first_offset: u32,
    },
    /// Opaque cursor returned in the body
    Cursor {
        /// Query parameter carrying the cursor
        param: String,
        /// JSON pointer to the next cursor in the response
        next: String,
    },
}

impl Pagination {
    /// Standard Catalyst Center offset/limit paging.
    pub fn offset_limit(limit: u32) -> Self {
        Self::OffsetLimit {
            offset_param: offset_param(),
            limit_param: limit_param(),
            limit,
            first_offset: default_first_offset(),
        }
    }
}

/// Completion rules for opaque poll URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPollSpec {
    /// JSON pointer to the poll URL in the write response
    pub url_key: String,
    /// JSON pointer to the status in the polled document
    pub status_key: String,
    pub success: Vec<String>,
    pub failure: Vec<String>,
    /// JSON pointer to the failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_key: Option<String>,
}

/// How write calls signal completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Completion {
    #[default]
    Synchronous,
    TaskId,
    ExecutionId,
    UrlPoll(UrlPollSpec),
}

/// Whether writes send the minimal patch or the merged object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateBody {
    #[default]
    Patch,
    /// Remote object overlaid with the patch (full-replacement PUT)
    Merged,
}

/// Presence predicate for objects that exist only in a given status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistsWhen {
    /// Remote field name or JSON pointer
    pub field: String,
    pub equals: Value,
}

/// State a workflow step reconciles to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    /// Same as the workflow's own state
    #[default]
    Inherit,
    Present,
    Absent,
    /// Resolve only; a missing object fails the step
    Query,
}

/// Where a step input comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepInput {
    /// A field of the workflow's desired document
    Desired(String),
    /// An output exported by an earlier step
    Output { step: String, name: String },
    Literal(Value),
}

/// One input binding of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepBinding {
    /// Field of the step's own document
    pub target: String,
    pub input: StepInput,
}

/// One exported value of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutput {
    pub name: String,
    /// Canonical field, raw remote key or JSON pointer
    pub field: String,
}

/// A step of a multi-call intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    /// Descriptor kind reconciled by this step
    pub kind: String,
    #[serde(default)]
    pub state: StepState,
    #[serde(default)]
    pub inputs: Vec<StepBinding>,
    #[serde(default)]
    pub outputs: Vec<StepOutput>,
}

impl WorkflowStep {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            state: StepState::Inherit,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn query(mut self) -> Self {
        self.state = StepState::Query;
        self
    }

    pub fn state(mut self, state: StepState) -> Self {
        self.state = state;
        self
    }

    pub fn from_desired(mut self, target: &str, field: &str) -> Self {
        self.inputs.push(StepBinding {
            target: target.to_string(),
            input: StepInput::Desired(field.to_string()),
        });
        self
    }

    pub fn from_output(mut self, target: &str, step: &str, name: &str) -> Self {
        self.inputs.push(StepBinding {
            target: target.to_string(),
            input: StepInput::Output {
                step: step.to_string(),
                name: name.to_string(),
            },
        });
        self
    }

    pub fn literal(mut self, target: &str, value: Value) -> Self {
        self.inputs.push(StepBinding {
            target: target.to_string(),
            input: StepInput::Literal(value),
        });
        self
    }

    pub fn output(mut self, name: &str, field: &str) -> Self {
        self.outputs.push(StepOutput {
            name: name.to_string(),
            field: field.to_string(),
        });
        self
    }

    /// Whether this step reads an output of `step`.
    pub fn depends_on(&self, step: &str) -> bool {
        self.inputs
            .iter()
            .any(|b| matches!(&b.input, StepInput::Output { step: s, .. } if s == step))
    }
}

/// Static metadata describing one resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub kind: String,
    /// Other names resolving to this descriptor (versioned or legacy names)
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Ordered natural key
    pub identity: Vec<String>,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub fields: Vec<FieldPolicy>,
    #[serde(default)]
    pub completion: Completion,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists_when: Option<ExistsWhen>,
    #[serde(default)]
    pub update_body: UpdateBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workflow: Vec<WorkflowStep>,
}

impl ResourceDescriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            aliases: Vec::new(),
            identity: Vec::new(),
            endpoints: Endpoints::default(),
            fields: Vec::new(),
            completion: Completion::Synchronous,
            pagination: Pagination::None,
            exists_when: None,
            update_body: UpdateBody::Patch,
            timeout_secs: None,
            workflow: Vec::new(),
        }
    }

    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.aliases.push(name.into());
        self
    }

    pub fn identity(mut self, fields: &[&str]) -> Self {
        self.identity = fields.iter().map(ToString::to_string).collect();
        self
    }

    pub fn list(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.list = Some(endpoint);
        self
    }

    pub fn get(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.get = Some(endpoint);
        self
    }

    pub fn create(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.create = Some(endpoint);
        self
    }

    pub fn update(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.update = Some(endpoint);
        self
    }

    pub fn delete(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.delete = Some(endpoint);
        self
    }

    pub fn field(mut self, policy: FieldPolicy) -> Self {
        self.fields.push(policy);
        self
    }

    pub fn completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn exists_when(mut self, field: &str, equals: Value) -> Self {
        self.exists_when = Some(ExistsWhen {
            field: field.to_string(),
            equals,
        });
        self
    }

    pub fn update_body(mut self, mode: UpdateBody) -> Self {
        self.update_body = mode;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.workflow.push(step);
        self
    }

    /// Whether this descriptor is a multi-step intent.
    pub fn is_workflow(&self) -> bool {
        !self.workflow.is_empty()
    }

    pub fn policy(&self, name: &str) -> Option<&FieldPolicy> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Wire name of a document field (unchanged if undeclared).
    pub fn wire_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.policy(name).map_or(name, FieldPolicy::wire_name)
    }

    /// Document names of secret fields.
    pub fn secret_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.secret)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Per-descriptor poll timeout, when declared.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Whether `name` is part of the identity.
    pub fn is_identity(&self, name: &str) -> bool {
        self.identity.iter().any(|i| i == name)
    }

    /// Render the identity tuple of a document for messages and lock keys.
    pub fn identity_label(&self, doc: &Document) -> String {
        self.identity
            .iter()
            .map(|field| {
                let value = doc
                    .get(field)
                    .map_or_else(|| "?".to_string(), |v| value_text(v).unwrap_or_else(|| v.to_string()));
                format!("{field}={value}")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Identity tuple normalized by each field's comparison rule.
    ///
    /// Two documents that match the same remote object yield the same key,
    /// so it is safe to serialize on.
    pub fn identity_key(&self, doc: &Document) -> String {
        self.identity
            .iter()
            .map(|field| {
                let compare = self.policy(field).map_or(Compare::Exact, |p| p.compare);
                let value = doc
                    .get(field)
                    .map_or_else(|| "?".to_string(), |v| identity_text(compare, v));
                format!("{field}={value}")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Map a raw remote object into document names, dropping ignored fields.
    pub fn canonicalize(&self, raw: &Value) -> Document {
        let mut canonical = Document::new();
        let Some(object) = raw.as_object() else {
            return canonical;
        };
        for (key, value) in object {
            match self.fields.iter().find(|f| f.wire_name() == key) {
                Some(policy) if policy.compare == Compare::Ignore => {}
                Some(policy) => {
                    canonical.insert(policy.name.clone(), value.clone());
                }
                None => {
                    if self.policy(key).is_none() {
                        canonical.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        canonical
    }

    /// Map document names to wire names.
    pub fn to_wire(&self, doc: &Document) -> Document {
        doc.iter()
            .map(|(k, v)| (self.wire_name(k).to_string(), v.clone()))
            .collect()
    }

    /// Apply the presence predicate to a raw remote object.
    pub fn exists(&self, raw: &Value) -> bool {
        match &self.exists_when {
            None => true,
            Some(predicate) => lookup(raw, &predicate.field)
                .is_some_and(|v| crate::diff::values_equal(&predicate.equals, v)),
        }
    }

    /// Check internal consistency of the descriptor.
    pub fn check(&self) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(ReconcileError::validation("descriptor kind is empty"));
        }
        if self.identity.is_empty() {
            return Err(ReconcileError::validation(format!(
                "{} declares no identity fields",
                self.kind
            )));
        }
        if let Some(secret) = self
            .identity
            .iter()
            .find(|i| self.policy(i).is_some_and(|p| p.secret))
        {
            return Err(ReconcileError::validation(format!(
                "{}: secret field '{secret}' cannot be part of the identity",
                self.kind
            )));
        }
        if !self.is_workflow() && self.endpoints.list.is_none() && self.endpoints.get.is_none() {
            return Err(ReconcileError::validation(format!(
                "{} has neither a list nor a get endpoint",
                self.kind
            )));
        }
        for (index, step) in self.workflow.iter().enumerate() {
            for binding in &step.inputs {
                if let StepInput::Output { step: from, .. } = &binding.input
                    && !self.workflow[..index].iter().any(|s| &s.name == from)
                {
                    return Err(ReconcileError::validation(format!(
                        "{}: step '{}' reads output of '{from}' which does not run before it",
                        self.kind, step.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Look up a key, or a JSON pointer when it starts with `/`.
pub fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    if key.starts_with('/') {
        value.pointer(key)
    } else {
        value.get(key)
    }
}

/// Render scalar values as text for paths, queries and labels.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Percent-encode a single path segment.
fn encode_segment(raw: &str) -> String {
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return raw.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(raw);
    }
    url.path().trim_start_matches('/').to_string()
}

fn identity_text(compare: Compare, value: &Value) -> String {
    match (compare, value) {
        (_, Value::Number(n)) => n.as_f64().map_or_else(|| n.to_string(), |f| f.to_string()),
        (Compare::CaseInsensitive, Value::String(s)) => s.to_lowercase(),
        (Compare::CaseInsensitive, Value::Array(items)) => {
            let parts: Vec<String> = items.iter().map(|v| identity_text(compare, v)).collect();
            format!("[{}]", parts.join(","))
        }
        (Compare::Set | Compare::Subset, Value::Array(items)) => {
            let mut parts: Vec<String> = items.iter().map(|v| identity_text(Compare::Exact, v)).collect();
            parts.sort();
            format!("[{}]", parts.join(","))
        }
        (_, Value::String(s)) => s.clone(),
        (_, other) => other.to_string(),
    }
}
