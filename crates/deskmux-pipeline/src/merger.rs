//! Deterministic, language-agnostic combiner for multi-worker fan-out
//! results. Section order follows the input id list, not completion order.

use std::collections::HashMap;

fn title_case(worker_id: &str) -> String {
    worker_id
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the merged multi-worker analysis block.
pub fn merge(query: &str, ids: &[String], results: &HashMap<String, String>) -> String {
    let mut out = format!("# Multi-Source Financial Analysis\n\nQuery: {query}\n\n");

    for id in ids {
        let empty = String::new();
        let text = results.get(id).unwrap_or(&empty);
        out.push_str(&format!("## {}\n\n{text}\n\n---\n\n", title_case(id)));
    }

    out.trim_end().to_string()
}
