//! Presentation: text and JSON renderings of CLI results.

use crate::error::ApiError;
use crate::frame::FrameOutcome;
use crate::store::StoreSummary;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use std::path::Path;

pub fn format_status_text(store_path: &Path, summary: &StoreSummary) -> String {
    let StoreSummary {
        version,
        pending,
        values,
        clients,
    } = summary;
    let mut out = format!(
        "Store: {}\n  Version: {}\n  Pending mutations: {}\n  Values: {}\n  Clients: {}",
        store_path.display(),
        version,
        pending,
        values,
        clients.len()
    );
    if !clients.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Client", "Last Mutation ID", "Last Version"]);
        for (client_id, record) in clients {
            let last_version = record
                .last_version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                client_id.clone(),
                record.last_mutation_id.to_string(),
                last_version,
            ]);
        }
        out.push_str("\n\n");
        out.push_str(&table.to_string());
    }
    out
}

pub fn format_status_json(store_path: &Path, summary: &StoreSummary) -> Result<String, ApiError> {
    let clients: Vec<serde_json::Value> = summary
        .clients
        .iter()
        .map(|(id, record)| {
            serde_json::json!({
                "clientID": id,
                "lastMutationID": record.last_mutation_id,
                "lastVersion": record.last_version,
            })
        })
        .collect();
    let out = serde_json::json!({
        "store": store_path.display().to_string(),
        "version": summary.version,
        "pending": summary.pending,
        "values": summary.values,
        "clients": clients,
    });
    serde_json::to_string_pretty(&out)
        .map_err(|e| ApiError::InvalidInput(format!("Failed to render status: {}", e)))
}

pub fn format_outcome(outcome: &FrameOutcome) -> Result<String, ApiError> {
    serde_json::to_string_pretty(outcome)
        .map_err(|e| ApiError::InvalidInput(format!("Failed to render frame outcome: {}", e)))
}
