/// Table and JSON formatting for command output using comfy-table

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use kevo_client::{KeyValue, NodeInfo, Stats};
use serde_json::{json, Value};

/// Render raw bytes for display; invalid UTF-8 is replaced
pub fn display_bytes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Format scan results as a two-column table
pub fn format_entries_table(entries: &[KeyValue]) -> String {
    if entries.is_empty() {
        return "No entries found".to_string();
    }

    let mut table = new_table();
    table.set_header(vec![Cell::new("key"), Cell::new("value")]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(display_bytes(&entry.key)),
            Cell::new(display_bytes(&entry.value)),
        ]);
    }

    table.to_string()
}

pub fn entries_json(entries: &[KeyValue]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|entry| {
                json!({
                    "key": display_bytes(&entry.key),
                    "value": display_bytes(&entry.value),
                })
            })
            .collect(),
    )
}

/// Format storage statistics as a metric/value table
pub fn format_stats_table(stats: &Stats) -> String {
    let mut table = new_table();
    table.set_header(vec![Cell::new("metric"), Cell::new("value")]);

    let rows = [
        ("keys", stats.key_count.to_string()),
        ("storage bytes", stats.storage_size_bytes.to_string()),
        ("memtables", stats.memtable_count.to_string()),
        ("sstables", stats.sstable_count.to_string()),
        ("write amplification", format!("{:.2}", stats.write_amplification)),
        ("read amplification", format!("{:.2}", stats.read_amplification)),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }

    table.to_string()
}

/// Format node info: a summary line plus one row per replica
pub fn format_node_info(info: &NodeInfo) -> String {
    let mut out = format!(
        "role: {}  last_sequence: {}  read_only: {}",
        info.role, info.last_sequence, info.read_only
    );
    if let Some(primary) = &info.primary_address {
        out.push_str(&format!("\nprimary: {}", primary));
    }
    if info.replicas.is_empty() {
        return out;
    }

    let mut table = new_table();
    table.set_header(vec![
        Cell::new("address"),
        Cell::new("available"),
        Cell::new("last_sequence"),
        Cell::new("region"),
    ]);
    for replica in &info.replicas {
        table.add_row(vec![
            Cell::new(&replica.address),
            Cell::new(replica.available),
            Cell::new(replica.last_sequence),
            Cell::new(replica.region.as_deref().unwrap_or("-")),
        ]);
    }

    format!("{}\n{}", out, table)
}
