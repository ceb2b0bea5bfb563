//! Text rendering of a configuration tree.

use serde_yaml::Value;

use crate::node;

/// Sections printed first, in this order, when present.
pub const PRINT_ORDER: &[&str] = &[
    "dataset", "model", "callbacks", "logger", "trainer", "paths", "extras",
];

/// Renders a configuration as a text tree rooted at `CONFIG`.
///
/// Top-level fields listed in `print_order` come first, the rest follow in
/// document order. Each branch holds the field's YAML body.
pub fn render_tree(cfg: &Value, print_order: &[&str]) -> String {
    let map = match cfg.as_mapping() {
        Some(map) => map,
        None => return format!("CONFIG\n└── {}\n", body_of(cfg).trim_end()),
    };

    let mut queue: Vec<&str> = Vec::new();
    for field in print_order {
        if map.contains_key(*field) {
            queue.push(*field);
        } else {
            log::info!("Field <{}> not found in config, skipping...", field);
        }
    }
    for key in map.keys().filter_map(Value::as_str) {
        if !queue.contains(&key) {
            queue.push(key);
        }
    }

    let mut out = String::from("CONFIG\n");
    for (i, field) in queue.iter().enumerate() {
        let last = i + 1 == queue.len();
        let (branch, guide) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
        out.push_str(branch);
        out.push_str(field);
        out.push('\n');

        let body = map.get(*field).map(body_of).unwrap_or_default();
        for (j, line) in body.lines().enumerate() {
            out.push_str(guide);
            out.push_str(if j == 0 { "└── " } else { "    " });
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn body_of(value: &Value) -> String {
    match value {
        Value::Mapping(_) | Value::Sequence(_) => serde_yaml::to_string(value)
            .unwrap_or_else(|err| format!("<unprintable: {}>", err)),
        other => node::scalar_to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_order_first_then_document_order() {
        let cfg: Value =
            serde_yaml::from_str("seed: 7\npaths:\n  log_dir: logs\ntrainer:\n  max_epochs: 3\n")
                .unwrap();
        let tree = render_tree(&cfg, PRINT_ORDER);
        let expected = "\
CONFIG
├── trainer
│   └── max_epochs: 3
├── paths
│   └── log_dir: logs
└── seed
    └── 7
";
        assert_eq!(tree, expected);
    }
}
