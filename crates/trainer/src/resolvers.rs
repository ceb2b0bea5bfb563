//! Resolvers registered on top of the standard table for training runs.

use std::process::Command;

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use config_resolver::{node, Resolvers};
use serde_yaml::Value;

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub const GIT_SHA_VAR: &str = "PROJECT_GIT_SHA";
pub const GIT_SHORT_SHA_VAR: &str = "PROJECT_GIT_SHORT_SHA";

/// Standard resolvers plus `now` and `parse_git_sha`.
pub fn application_resolvers() -> Resolvers {
    let mut resolvers = Resolvers::standard();
    resolvers
        .register("now", now)
        .register("parse_git_sha", parse_git_sha);
    resolvers
}

/// `${now:FORMAT}`: local time rendered with a strftime pattern.
fn now(args: &[Value]) -> Result<Value, String> {
    let fmt = match args.first() {
        None | Some(Value::Null) => DEFAULT_TIME_FORMAT.to_string(),
        Some(arg) => node::scalar_to_string(arg)
            .ok_or_else(|| format!("now expects a format string, got {}", node::describe(arg)))?,
    };
    Ok(Value::String(format_time(&Local::now(), &fmt)?))
}

fn format_time<Tz>(time: &chrono::DateTime<Tz>, fmt: &str) -> Result<String, String>
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    // rendering an invalid pattern panics, so reject it up front
    if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid time format {:?}", fmt));
    }
    Ok(time.format(fmt).to_string())
}

/// `${parse_git_sha:CLEAN}`: short SHA of the checked-out commit.
///
/// Also exports the full and short SHA as `PROJECT_GIT_SHA` and
/// `PROJECT_GIT_SHORT_SHA`. With `CLEAN` true, a dirty worktree fails.
fn parse_git_sha(args: &[Value]) -> Result<Value, String> {
    let clean = match args.first() {
        None | Some(Value::Null) => false,
        Some(Value::Bool(clean)) => *clean,
        Some(other) => {
            return Err(format!(
                "parse_git_sha expects a boolean, got {}",
                node::describe(other)
            ))
        }
    };

    let sha = git(&["rev-parse", "HEAD"])?;
    let short_sha = git(&["rev-parse", "--short=7", &sha])?;
    let dirty = !git(&["status", "--porcelain"])?.is_empty();

    if clean && dirty {
        return Err(format!(
            "Clean your git repository before running experiments! GIT SHA: {}, Status: Dirty",
            sha
        ));
    }

    std::env::set_var(GIT_SHA_VAR, &sha);
    std::env::set_var(GIT_SHORT_SHA_VAR, &short_sha);
    Ok(Value::String(short_sha))
}

fn git(args: &[&str]) -> Result<String, String> {
    let output = Command::new("git")
        .args(args)
        .output()
        .map_err(|err| format!("failed to run git: {}", err))?;
    if !output.status.success() {
        return Err(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use config_resolver::{resolve, Composed};

    #[test]
    fn formats_with_a_pattern() {
        let time = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            format_time(&time, DEFAULT_TIME_FORMAT).unwrap(),
            "2024-03-09_14-05-07"
        );
        assert_eq!(format_time(&time, "%Y").unwrap(), "2024");
    }

    #[test]
    fn rejects_a_broken_pattern() {
        let time = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        assert!(format_time(&time, "%Q").is_err());
    }

    #[test]
    fn now_is_available_to_interpolation() {
        let value: Value = serde_yaml::from_str("year: ${now:%Y}\nrun: run_${now:%Y}\n").unwrap();
        let resolved = resolve(Composed::new(value, "train.yaml"), &application_resolvers()).unwrap();
        let year = Local::now().format("%Y").to_string();
        assert_eq!(resolved.get("run"), Some(&Value::String(format!("run_{}", year))));
        assert!(application_resolvers().contains("oc.env"));
    }
}
