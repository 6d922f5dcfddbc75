use crate::error::{ClientError, Result};
use regex::Regex;
use shieldrun_core::{constants::contract, model::JobId};
use std::sync::OnceLock;

fn job_array_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let label = regex::escape(contract::JOB_ARRAY_ID_LABEL);
        #[allow(clippy::unwrap_used)]
        Regex::new(&format!(r"{}[ \t]*(\d+)", label)).unwrap()
    })
}

/// Every `Job array ID: <integer>` occurrence in `text`, in order of
/// appearance. Repeats are kept; no match is a valid, empty result.
pub fn extract_job_ids(text: &str) -> Vec<JobId> {
    job_array_id_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| JobId(m.as_str().to_string()))
        .collect()
}

/// Parses `sbatch --parsable` output: `<id>` or `<id>;<cluster>`.
pub fn parse_parsable_output(stdout: &str) -> Result<JobId> {
    let line = stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or_else(|| ClientError::JobIdParse(stdout.to_string()))?;
    let id = line.split(';').next().unwrap_or(line).trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(ClientError::JobIdParse(stdout.to_string()));
    }
    Ok(JobId(id.to_string()))
}

/// Drops repeated identifiers, keeping the first occurrence of each.
pub fn dedup_preserving_order(ids: Vec<JobId>) -> Vec<JobId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<JobId> {
        v.iter().map(|s| JobId::from(*s)).collect()
    }

    #[test]
    fn test_no_matches() {
        assert!(extract_job_ids("").is_empty());
        assert!(extract_job_ids("Submitted batch job 12\nJob ID: 44\n").is_empty());
    }

    #[test]
    fn test_single_match_among_noise() {
        let text = "[INFO] Preparing model A\nsetup done\nJob array ID: 4242\nbye\n";
        assert_eq!(extract_job_ids(text), ids(&["4242"]));
    }

    #[test]
    fn test_multiple_matches_in_order() {
        let text = "Job array ID: 9\nwarning: slow\nJob array ID: 7\n  Job array ID:   15  \n";
        assert_eq!(extract_job_ids(text), ids(&["9", "7", "15"]));
    }

    #[test]
    fn test_repeats_are_kept() {
        let text = "Job array ID: 3\nJob array ID: 3\n";
        assert_eq!(extract_job_ids(text), ids(&["3", "3"]));
    }

    #[test]
    fn test_label_inside_longer_line() {
        let text = "2024-01-01 [A] Job array ID: 101 (2 tasks)\r\n";
        assert_eq!(extract_job_ids(text), ids(&["101"]));
    }

    #[test]
    fn test_label_does_not_reach_next_line() {
        let text = "Job array ID:\n42\nJob array ID:\r\n43\nJob array ID:\t8\n";
        assert_eq!(extract_job_ids(text), ids(&["8"]));
    }

    #[test]
    fn test_non_numeric_id_ignored() {
        assert!(extract_job_ids("Job array ID: pending\n").is_empty());
    }

    #[test]
    fn test_parse_parsable_plain_and_cluster() {
        assert_eq!(parse_parsable_output("12345\n").unwrap(), JobId::from("12345"));
        assert_eq!(parse_parsable_output("678;cluster-a\n").unwrap(), JobId::from("678"));
    }

    #[test]
    fn test_parse_parsable_rejects_garbage() {
        assert!(matches!(parse_parsable_output(""), Err(ClientError::JobIdParse(_))));
        assert!(matches!(
            parse_parsable_output("Submitted batch job 5\n"),
            Err(ClientError::JobIdParse(_))
        ));
    }

    #[test]
    fn test_dedup_preserving_order() {
        assert_eq!(
            dedup_preserving_order(ids(&["7", "9", "7", "3"])),
            ids(&["7", "9", "3"])
        );
    }
}
