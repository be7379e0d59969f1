use std::borrow::Cow;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use drmsession::placeholders::{PlaceholderValues, resolve_placeholders};
use drmsession::{AttributeStore, BulkRange};
use drmsession::common::error::DrmsError;

/// Name of the submit variable that carries the bulk index of a sub-task.
pub const INDEX_VARIABLE: &str = "DrmaaIndex";

/// Renders a Condor submit description for a template snapshot.
///
/// Bulk jobs are queued as a single cluster, one process per index of `bulk`.
pub fn render_submit_file(
    attributes: &AttributeStore,
    bulk: Option<BulkRange>,
    log_path: &Path,
) -> drmsession::Result<String> {
    let view = attributes.view();
    let command = view.remote_command().ok_or_else(|| {
        DrmsError::SubmissionRejected("remote command is not set".to_string())
    })?;

    let index_macro = match bulk {
        Some(_) => format!("$({INDEX_VARIABLE})"),
        None => "$(Process)".to_string(),
    };
    let mut values = PlaceholderValues {
        index: Some(Cow::Owned(index_macro)),
        home_directory: Some(Cow::Borrowed("$ENV(HOME)")),
        working_directory: None,
    };
    let working_directory = view
        .working_directory()
        .map(|wd| resolve_placeholders(wd, &values));
    values.working_directory = working_directory.as_deref().map(Cow::Borrowed);
    let resolve = |path: &str| resolve_placeholders(path, &values);

    let mut lines = vec![
        "# Submit description generated by drms".to_string(),
        "universe = vanilla".to_string(),
        format!("executable = {command}"),
    ];
    if !view.args().is_empty() {
        lines.push(format!("arguments = {}", quote_arguments(view.args())));
    }
    if let Some(wd) = &working_directory {
        lines.push(format!("initialdir = {wd}"));
    }

    let transfer = view.transfer_files();
    if let Some(input) = view.input_path() {
        let input = resolve(input);
        lines.push(format!("input = {input}"));
        if transfer.input {
            lines.push(format!("transfer_input_files = {input}"));
        }
    }
    let output = view.output_path().map(resolve);
    if let Some(output) = &output {
        lines.push(format!("output = {output}"));
    }
    if view.join_files() {
        if let Some(output) = &output {
            lines.push(format!("error = {output}"));
        }
    } else if let Some(error) = view.error_path() {
        lines.push(format!("error = {}", resolve(error)));
    }
    if transfer.output || transfer.error {
        lines.push("should_transfer_files = IF_NEEDED".to_string());
        lines.push("when_to_transfer_output = ON_EXIT".to_string());
    }

    let environment = view.environment();
    if !environment.is_empty() {
        let items: Vec<String> = environment
            .into_iter()
            .map(|(name, value)| quote_argument(&format!("{name}={value}")))
            .collect();
        lines.push(format!("environment = \"{}\"", items.join(" ")));
    }

    if let Some(name) = view.job_name() {
        lines.push(format!("batch_name = {name}"));
    }
    if view.block_email() {
        lines.push("notification = Never".to_string());
    }
    match view.emails() {
        [] => {}
        [email, rest @ ..] => {
            if !rest.is_empty() {
                log::warn!("Condor supports a single notification address, using {email}");
            }
            lines.push(format!("notify_user = {email}"));
        }
    }

    let start_time = view.start_time().map(parse_start_time).transpose()?;
    if view.hold_on_submit() || start_time.is_some() {
        lines.push("hold = true".to_string());
    }
    if let Some(time) = start_time {
        lines.push(format!("periodic_release = (CurrentTime > {time})"));
    }

    lines.push(format!("log = {}", log_path.display()));

    for extra in [view.job_category(), view.native_specification()]
        .into_iter()
        .flatten()
    {
        lines.extend(extra.lines().map(str::to_string));
    }

    match bulk {
        Some(range) => {
            let indices: Vec<String> = range.iter().map(|index| index.to_string()).collect();
            lines.push(format!(
                "queue {INDEX_VARIABLE} in ({})",
                indices.join(", ")
            ));
        }
        None => lines.push("queue 1".to_string()),
    }

    let mut text = lines.join("\n");
    text.push('\n');
    Ok(text)
}

/// Quotes a single argument for the Condor "new" argument syntax.
fn quote_argument(argument: &str) -> String {
    let escaped = argument.replace('"', "\"\"").replace('\'', "''");
    if escaped.is_empty() || escaped.contains(char::is_whitespace) {
        format!("'{escaped}'")
    } else {
        escaped
    }
}

fn quote_arguments(arguments: &[String]) -> String {
    let quoted: Vec<String> = arguments.iter().map(|arg| quote_argument(arg)).collect();
    format!("\"{}\"", quoted.join(" "))
}

/// Parses a start time into seconds since the epoch.
///
/// Accepts seconds since the epoch, RFC 3339 and local `YYYY/MM/DD hh:mm[:ss]`.
fn parse_start_time(value: &str) -> drmsession::Result<i64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(seconds);
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.timestamp());
    }
    ["%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(|time| Local.from_local_datetime(&time).earliest())
        .map(|time| time.timestamp())
        .ok_or_else(|| DrmsError::SubmissionRejected(format!("invalid start time `{value}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use drmsession::attributes::{
        ARGV, BLOCK_EMAIL, EMAIL, ENVIRONMENT, ERROR_PATH, HOLD_STATE, INPUT_PATH,
        JOB_NAME, JOB_SUBMISSION_STATE, JOIN_FILES, NATIVE_SPECIFICATION, OUTPUT_PATH,
        REMOTE_COMMAND, START_TIME, TRANSFER_FILES, WORKING_DIRECTORY,
    };

    fn template(command: &str) -> AttributeStore {
        let mut attributes = AttributeStore::default();
        attributes.set_value(REMOTE_COMMAND, command);
        attributes
    }

    #[test]
    fn test_minimal_job() {
        let attributes = template("/bin/hostname");
        let text = render_submit_file(&attributes, None, Path::new("/spool/job.log")).unwrap();
        insta::assert_snapshot!(text, @r"
        # Submit description generated by drms
        universe = vanilla
        executable = /bin/hostname
        log = /spool/job.log
        queue 1
        ");
    }

    #[test]
    fn test_full_job() {
        let mut attributes = template("/usr/bin/blast");
        attributes.set_values(ARGV, ["-in", "my file.txt", "say \"hi\""]);
        attributes.set_value(WORKING_DIRECTORY, "$drmaa_hd_ph$/work");
        attributes.set_value(INPUT_PATH, ":$drmaa_wd_ph$/in.txt");
        attributes.set_value(OUTPUT_PATH, "host:/out/$drmaa_incr_ph$.out");
        attributes.set_value(ERROR_PATH, "/out/err");
        attributes.set_values(ENVIRONMENT, ["A=1", "B=two words"]);
        attributes.set_value(JOB_NAME, "blast");
        attributes.set_value(JOB_SUBMISSION_STATE, HOLD_STATE);
        attributes.set_value(BLOCK_EMAIL, "y");
        attributes.set_values(EMAIL, ["a@b.c"]);
        attributes.set_value(TRANSFER_FILES, "io");
        attributes.set_value(NATIVE_SPECIFICATION, "request_cpus = 4\nrequest_memory = 1GB");

        let text = render_submit_file(
            &attributes,
            Some(BulkRange::new(1, 5, 2).unwrap()),
            Path::new("/spool/job.log"),
        )
        .unwrap();
        insta::assert_snapshot!(text, @r#"
        # Submit description generated by drms
        universe = vanilla
        executable = /usr/bin/blast
        arguments = "-in 'my file.txt' 'say ""hi""'"
        initialdir = $ENV(HOME)/work
        input = $ENV(HOME)/work/in.txt
        transfer_input_files = $ENV(HOME)/work/in.txt
        output = /out/$(DrmaaIndex).out
        error = /out/err
        should_transfer_files = IF_NEEDED
        when_to_transfer_output = ON_EXIT
        environment = "A=1 'B=two words'"
        batch_name = blast
        notification = Never
        notify_user = a@b.c
        hold = true
        log = /spool/job.log
        request_cpus = 4
        request_memory = 1GB
        queue DrmaaIndex in (1, 3, 5)
        "#);
    }

    #[test]
    fn test_join_files() {
        let mut attributes = template("/bin/date");
        attributes.set_value(OUTPUT_PATH, "/tmp/out.$drmaa_incr_ph$");
        attributes.set_value(ERROR_PATH, "/tmp/err");
        attributes.set_value(JOIN_FILES, "y");
        let text = render_submit_file(&attributes, None, Path::new("log")).unwrap();
        assert!(text.contains("output = /tmp/out.$(Process)\n"));
        assert!(text.contains("error = /tmp/out.$(Process)\n"));
        assert!(!text.contains("/tmp/err"));
    }

    #[test]
    fn test_start_time() {
        let mut attributes = template("/bin/date");
        attributes.set_value(START_TIME, "2030-01-01T00:00:00Z");
        let text = render_submit_file(&attributes, None, Path::new("log")).unwrap();
        assert!(text.contains("hold = true\nperiodic_release = (CurrentTime > 1893456000)\n"));

        attributes.set_value(START_TIME, "tomorrow");
        assert!(matches!(
            render_submit_file(&attributes, None, Path::new("log")),
            Err(DrmsError::SubmissionRejected(_))
        ));
    }

    #[test]
    fn test_missing_command() {
        assert!(matches!(
            render_submit_file(&AttributeStore::default(), None, Path::new("log")),
            Err(DrmsError::SubmissionRejected(_))
        ));
    }

    #[test]
    fn test_quote_argument() {
        assert_eq!(quote_argument("plain"), "plain");
        assert_eq!(quote_argument("it's"), "it''s");
        assert_eq!(quote_argument(""), "''");
        assert_eq!(quote_argument("a b"), "'a b'");
    }
}
