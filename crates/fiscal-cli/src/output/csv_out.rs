use serde_json::Value;
use std::io;

/// Write output as CSV to stdout. Simulation results are written as one row
/// per year (savings rows, then liquidation rows); anything else as
/// field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(stdout.lock());

    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result {
        Value::Object(map) if map.contains_key("epargne") => {
            let empty = Vec::new();
            let epargne = map.get("epargne").and_then(Value::as_array).unwrap_or(&empty);
            let liquidation = map
                .get("liquidation")
                .and_then(Value::as_array)
                .unwrap_or(&empty);
            write_array_csv(&mut wtr, "epargne", epargne);
            write_array_csv(&mut wtr, "liquidation", liquidation);
        }
        Value::Object(map) => {
            let _ = wtr.write_record(["field", "value"]);
            for (key, val) in map {
                let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
            }
        }
        Value::Array(arr) => write_array_csv(&mut wtr, "rows", arr),
        _ => {
            let _ = wtr.write_record([&format_csv_value(result)]);
        }
    }

    let _ = wtr.flush();
}

/// Rows tagged with their `phase`; headers come from the first object.
fn write_array_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, phase: &str, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        return;
    };
    let mut headers: Vec<&str> = vec!["phase"];
    headers.extend(first.keys().map(String::as_str));
    let _ = wtr.write_record(&headers);

    for map in arr.iter().filter_map(Value::as_object) {
        let mut row = vec![phase.to_string()];
        row.extend(
            headers[1..]
                .iter()
                .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default()),
        );
        let _ = wtr.write_record(&row);
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
