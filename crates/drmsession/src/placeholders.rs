use std::borrow::Cow;

/// Replaced by the index of a bulk job sub-task.
pub const INDEX_PLACEHOLDER: &str = "$drmaa_incr_ph$";
/// Replaced by the home directory of the job owner.
pub const HOME_DIRECTORY_PLACEHOLDER: &str = "$drmaa_hd_ph$";
/// Replaced by the working directory of the job.
pub const WORKING_DIRECTORY_PLACEHOLDER: &str = "$drmaa_wd_ph$";

const PLACEHOLDER_PREFIX: &str = "$drmaa_";
const PLACEHOLDER_SUFFIX: &str = "_ph$";

/// Values substituted for placeholders. Placeholders without a value are left untouched.
///
/// Backends that hand paths to an external scheduler fill in the scheduler's own macros
/// (e.g. `$(Process)`) instead of concrete values.
#[derive(Default, Debug, Clone)]
pub struct PlaceholderValues<'a> {
    pub index: Option<Cow<'a, str>>,
    pub home_directory: Option<Cow<'a, str>>,
    pub working_directory: Option<Cow<'a, str>>,
}

impl<'a> PlaceholderValues<'a> {
    fn get(&self, name: &str) -> Option<&str> {
        match name {
            "incr" => self.index.as_deref(),
            "hd" => self.home_directory.as_deref(),
            "wd" => self.working_directory.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
enum StringPart<'a> {
    Verbatim(&'a str),
    Placeholder { name: &'a str, text: &'a str },
}

fn parse_resolvable_string(input: &str) -> Vec<StringPart<'_>> {
    let mut parts = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
        let after_prefix = &rest[start + PLACEHOLDER_PREFIX.len()..];
        let name_len = after_prefix
            .find(PLACEHOLDER_SUFFIX)
            .filter(|&len| {
                len > 0
                    && after_prefix[..len]
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric())
            });
        match name_len {
            Some(len) => {
                if start > 0 {
                    parts.push(StringPart::Verbatim(&rest[..start]));
                }
                let end = start + PLACEHOLDER_PREFIX.len() + len + PLACEHOLDER_SUFFIX.len();
                parts.push(StringPart::Placeholder {
                    name: &after_prefix[..len],
                    text: &rest[start..end],
                });
                rest = &rest[end..];
            }
            None => {
                let end = start + PLACEHOLDER_PREFIX.len();
                parts.push(StringPart::Verbatim(&rest[..end]));
                rest = &rest[end..];
            }
        }
    }
    if !rest.is_empty() {
        parts.push(StringPart::Verbatim(rest));
    }
    parts
}

pub fn resolve_placeholders(input: &str, values: &PlaceholderValues) -> String {
    let mut buffer = String::with_capacity(input.len());
    for part in parse_resolvable_string(input) {
        match part {
            StringPart::Verbatim(data) => buffer.push_str(data),
            StringPart::Placeholder { name, text } => match values.get(name) {
                Some(value) => buffer.push_str(value),
                None => {
                    log::debug!("Placeholder `{text}` in `{input}` has no value");
                    buffer.push_str(text);
                }
            },
        }
    }
    buffer
}
