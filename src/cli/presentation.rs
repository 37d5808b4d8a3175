//! CLI presentation: text and json formatters for merge reports and plans.

use crate::discovery::{LayerOrigin, MergePlan};
use crate::overlay::MergeReport;
use crate::source::LayerSource;
use comfy_table::Table;

pub fn format_merge_summary(report: &MergeReport) -> String {
    let mut output = format!(
        "Merged {} layer(s) into {}\n",
        report.layers.len(),
        report.output_root.display()
    );
    output.push_str(&format!(
        "  {} copied, {} unchanged, {} overridden\n",
        report.files_copied,
        report.files_unchanged,
        report.overrides.len()
    ));
    for info in &report.overrides {
        output.push_str(&format!(
            "  {}: {} -> {}\n",
            info.path.display(),
            info.from_layer,
            info.by_layer
        ));
    }
    output.trim_end().to_string()
}

pub fn format_merge_json(report: &MergeReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Precedence table, lowest first. Configured remote layers that are not
/// cached yet are listed after it.
pub fn format_plan_table(plan: &MergePlan, sources: &[LayerSource]) -> String {
    let pending: Vec<&LayerSource> = sources
        .iter()
        .filter(|s| !plan.names().contains(&s.name.as_str()))
        .collect();

    if plan.is_empty() && pending.is_empty() {
        return "No layers found.".to_string();
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["#", "Layer", "Origin", "Path"]);
    for (index, layer) in plan.into_iter().enumerate() {
        let origin = match layer.origin {
            LayerOrigin::Local => "local",
            LayerOrigin::External => "external",
        };
        table.add_row(vec![
            (index + 1).to_string(),
            layer.name.clone(),
            origin.to_string(),
            layer.root.display().to_string(),
        ]);
    }

    let mut output = table.to_string();
    if let Some(highest) = plan.highest() {
        output.push_str(&format!("\nHighest precedence: {}", highest.name));
    }
    if !pending.is_empty() {
        output.push_str("\nNot fetched yet:");
        for source in pending {
            output.push_str(&format!("\n  {} ({})", source.name, source.descriptor));
        }
    }
    output
}

pub fn format_plan_json(plan: &MergePlan) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(plan)
}
