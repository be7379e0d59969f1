use serde::{Deserialize, Serialize};

use crate::common::error::DrmsError;
use crate::common::{Map, Set};

// Well-known attribute names understood by the bundled backends.
pub const REMOTE_COMMAND: &str = "drmaa_remote_command";
pub const ARGV: &str = "drmaa_v_argv";
pub const WORKING_DIRECTORY: &str = "drmaa_wd";
pub const JOB_SUBMISSION_STATE: &str = "drmaa_js_state";
pub const ENVIRONMENT: &str = "drmaa_v_env";
pub const INPUT_PATH: &str = "drmaa_input_path";
pub const OUTPUT_PATH: &str = "drmaa_output_path";
pub const ERROR_PATH: &str = "drmaa_error_path";
pub const JOIN_FILES: &str = "drmaa_join_files";
pub const JOB_NAME: &str = "drmaa_job_name";
pub const NATIVE_SPECIFICATION: &str = "drmaa_native_specification";
pub const JOB_CATEGORY: &str = "drmaa_job_category";
pub const EMAIL: &str = "drmaa_v_email";
pub const BLOCK_EMAIL: &str = "drmaa_block_email";
pub const START_TIME: &str = "drmaa_start_time";
pub const TRANSFER_FILES: &str = "drmaa_transfer_files";

/// Values of [`JOB_SUBMISSION_STATE`].
pub const HOLD_STATE: &str = "drmaa_hold";
pub const ACTIVE_STATE: &str = "drmaa_active";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Scalar(String),
    Vector(Vec<String>),
}

impl AttributeValue {
    /// Scalars are viewed as a single-element slice.
    pub fn as_slice(&self) -> &[String] {
        match self {
            AttributeValue::Scalar(value) => std::slice::from_ref(value),
            AttributeValue::Vector(values) => values,
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.as_slice().first().map(|v| v.as_str())
    }
}

/// Key/value attributes of a single job template.
///
/// Setting a key always replaces its previous value, scalar or vector.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeStore {
    values: Map<String, AttributeValue>,
}

impl AttributeStore {
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(key.into(), AttributeValue::Scalar(value.into()));
    }

    pub fn set_values<I, S>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.values
            .insert(key.into(), AttributeValue::Vector(values));
    }

    pub fn get_value(&self, key: &str) -> crate::Result<Vec<String>> {
        self.get(key)
            .map(|value| value.as_slice().to_vec())
            .ok_or_else(|| DrmsError::NotFound(format!("attribute `{key}` is not set")))
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    pub fn list_keys(&self) -> Set<String> {
        self.values.keys().cloned().collect()
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.values.remove(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn view(&self) -> TemplateView<'_> {
        TemplateView { store: self }
    }
}

/// Typed read-only access to the well-known attributes of a template snapshot.
///
/// Backends use it to interpret a snapshot; absent or malformed values are reported as `None`
/// or as the attribute's default.
#[derive(Clone, Copy)]
pub struct TemplateView<'a> {
    store: &'a AttributeStore,
}

impl<'a> TemplateView<'a> {
    fn scalar(&self, key: &str) -> Option<&'a str> {
        self.store.get(key).and_then(|value| value.first())
    }

    fn vector(&self, key: &str) -> &'a [String] {
        self.store
            .get(key)
            .map(|value| value.as_slice())
            .unwrap_or_default()
    }

    fn flag(&self, key: &str) -> bool {
        self.scalar(key).map(parse_flag).unwrap_or(false)
    }

    pub fn remote_command(&self) -> Option<&'a str> {
        self.scalar(REMOTE_COMMAND).filter(|cmd| !cmd.is_empty())
    }

    pub fn args(&self) -> &'a [String] {
        self.vector(ARGV)
    }

    pub fn working_directory(&self) -> Option<&'a str> {
        self.scalar(WORKING_DIRECTORY)
    }

    pub fn hold_on_submit(&self) -> bool {
        self.scalar(JOB_SUBMISSION_STATE) == Some(HOLD_STATE)
    }

    /// Environment entries in the `NAME=VALUE` form. An entry without `=` sets an empty value.
    pub fn environment(&self) -> Vec<(&'a str, &'a str)> {
        self.vector(ENVIRONMENT)
            .iter()
            .map(|item| item.split_once('=').unwrap_or((item.as_str(), "")))
            .collect()
    }

    pub fn input_path(&self) -> Option<&'a str> {
        self.scalar(INPUT_PATH).map(strip_host)
    }

    pub fn output_path(&self) -> Option<&'a str> {
        self.scalar(OUTPUT_PATH).map(strip_host)
    }

    pub fn error_path(&self) -> Option<&'a str> {
        self.scalar(ERROR_PATH).map(strip_host)
    }

    pub fn join_files(&self) -> bool {
        self.flag(JOIN_FILES)
    }

    pub fn job_name(&self) -> Option<&'a str> {
        self.scalar(JOB_NAME)
    }

    pub fn native_specification(&self) -> Option<&'a str> {
        self.scalar(NATIVE_SPECIFICATION)
    }

    pub fn job_category(&self) -> Option<&'a str> {
        self.scalar(JOB_CATEGORY)
    }

    pub fn emails(&self) -> &'a [String] {
        self.vector(EMAIL)
    }

    pub fn block_email(&self) -> bool {
        self.flag(BLOCK_EMAIL)
    }

    pub fn start_time(&self) -> Option<&'a str> {
        self.scalar(START_TIME)
    }

    /// Returns which of the standard streams (`i`, `o`, `e`) should be transferred.
    pub fn transfer_files(&self) -> TransferFiles {
        let value = self.scalar(TRANSFER_FILES).unwrap_or_default();
        TransferFiles {
            input: value.contains('i'),
            output: value.contains('o'),
            error: value.contains('e'),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferFiles {
    pub input: bool,
    pub output: bool,
    pub error: bool,
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "y" | "yes" | "true" | "1"
    )
}

/// Path attributes have the form `[hostname]:path`; the host part is not used by the
/// bundled backends.
fn strip_host(value: &str) -> &str {
    match value.split_once(':') {
        Some((host, path)) if !host.contains('/') => path,
        _ => value,
    }
}
