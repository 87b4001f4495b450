use serde_json::Value;

/// Headline figure of each result shape, as a path into the result object.
/// The first path that resolves to a non-null value wins.
const HEADLINES: [(&str, &[&str]); 7] = [
    ("total_tax", &["total_tax"]),
    ("meilleur", &["comparison", "meilleur"]),
    ("gain_net", &["totaux", "gain_net"]),
    ("taxe_dmtg", &["transmission", "taxe_dmtg"]),
    ("tmi", &["rate"]),
    ("pfu_rate_ir", &["pfu_rate_ir"]),
    ("schema_version", &["schema_version"]),
];

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |node, key| node.get(*key))
        .filter(|v| !v.is_null())
}

/// Print the one figure a caller usually wants from a result: tax due, the
/// better product, net gain, duties, marginal rate.
pub fn print_minimal(value: &Value) {
    let result = value.get("result").unwrap_or(value);

    if let Some(v) = HEADLINES.iter().find_map(|(_, path)| lookup(result, path)) {
        println!("{}", scalar(v));
        // The TMI alone is rarely useful without the room left in the bracket.
        if lookup(result, &["rate"]).is_some_and(|r| r == v) {
            if let Some(margin) = lookup(result, &["margin_before_change"]) {
                println!("{}", scalar(margin));
            }
        }
        return;
    }

    match result.as_object().and_then(|m| m.iter().next()) {
        Some((key, v)) => println!("{key}: {}", scalar(v)),
        None => println!("{}", scalar(result)),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_skips_missing_and_null() {
        let v = json!({"comparison": {"meilleur": null}, "totaux": {"gain_net": "120.5"}});
        assert!(lookup(&v, &["comparison", "meilleur"]).is_none());
        assert_eq!(lookup(&v, &["totaux", "gain_net"]), Some(&json!("120.5")));
        let found = HEADLINES.iter().find_map(|(_, p)| lookup(&v, p));
        assert_eq!(found, Some(&json!("120.5")));
    }
}
