//! Parsing of Terraform's human-readable output

use regex::Regex;
use saorsa_cloud::ResourceCounts;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid regex"));

static CHANGE_COUNTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) added, (\d+) changed, (\d+) destroyed").expect("valid regex")
});

static DESTROY_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Resources: (\d+) destroyed").expect("valid regex"));

/// The apply summary's header; plan text also contains "Changes to Outputs:"
static OUTPUTS_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*Outputs:[ \t\r]*$").expect("valid regex"));

static LIST_OUTPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(\w+)\s*=\s*(?:tolist\(|toset\()?\[(.*?)\]").expect("valid regex")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)""#).expect("valid regex"));

fn strip_ansi(text: &str) -> std::borrow::Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}

fn number(caps: &regex::Captures<'_>, group: usize) -> u32 {
    caps.get(group)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Extract the resource counts from an apply or destroy run.
///
/// Output without a recognisable summary yields all zeros.
pub fn parse_resource_counts(stdout: &str) -> ResourceCounts {
    let text = strip_ansi(stdout);

    if let Some(caps) = CHANGE_COUNTS.captures(&text) {
        return ResourceCounts {
            added: number(&caps, 1),
            changed: number(&caps, 2),
            destroyed: number(&caps, 3),
        };
    }

    if let Some(caps) = DESTROY_COUNT.captures(&text) {
        return ResourceCounts {
            destroyed: number(&caps, 1),
            ..Default::default()
        };
    }

    ResourceCounts::default()
}

/// Extract list-valued outputs from the `Outputs:` block of an apply run
pub fn parse_list_outputs(stdout: &str) -> BTreeMap<String, Vec<String>> {
    let text = strip_ansi(stdout);
    let Some(header) = OUTPUTS_HEADER.find_iter(&text).last() else {
        return BTreeMap::new();
    };

    LIST_OUTPUT
        .captures_iter(&text[header.end()..])
        .map(|caps| {
            let values = QUOTED
                .captures_iter(&caps[2])
                .map(|v| v[1].to_string())
                .collect();
            (caps[1].to_string(), values)
        })
        .collect()
}
