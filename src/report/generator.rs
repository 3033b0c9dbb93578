//! Markdown and JSON report generation.
//!
//! One report is produced per aggregation bucket. Markdown reports are
//! assembled section by section; JSON reports are the serialized
//! metadata and results.

use crate::analysis::results::{CollectionStats, HashStats, StringStats};
use crate::analysis::{Frequencies, Results, SizeStats};
use crate::cli::OutputFormat;
use crate::models::{ReportMetadata, ValueType};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Generate a complete Markdown report for one bucket.
pub fn generate_markdown_report(results: &Results, metadata: &ReportMetadata, top_n: usize) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!("# Reckon Report: {}\n\n", cell(&results.name)));

    output.push_str(&generate_metadata_section(results, metadata));
    output.push_str(&generate_summary_section(results, metadata));

    if results.strings.observed > 0 {
        output.push_str(&generate_strings_section(&results.strings, top_n));
    }
    for (value_type, stats) in [
        (ValueType::List, &results.lists),
        (ValueType::Set, &results.sets),
        (ValueType::SortedSet, &results.sorted_sets),
    ] {
        if stats.observed > 0 {
            output.push_str(&generate_collection_section(value_type, stats, top_n));
        }
    }
    if results.hashes.observed > 0 {
        output.push_str(&generate_hashes_section(&results.hashes, top_n));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(results: &Results, metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Bucket:** {}\n", cell(&results.name)));
    section.push_str(&format!("- **Aggregation:** `{}`\n", metadata.aggregator));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Instances:** {}\n",
        metadata.instances.join(", ")
    ));
    if !metadata.skipped.is_empty() {
        section.push_str(&format!(
            "- **Skipped Instances:** {}\n",
            metadata.skipped.join(", ")
        ));
    }
    section.push_str(&format!("- **Keys in Keyspace:** {}\n", metadata.key_count));
    section.push_str(&format!("- **Keys Sampled:** {}\n", metadata.sampled));
    section.push_str(&format!(
        "- **Sampling Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the per-type summary table.
fn generate_summary_section(results: &Results, metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    if results.is_empty() {
        section.push_str("No keys were sampled into this bucket.\n\n");
        return section;
    }

    section.push_str("| Type | Sampled | Share of Sample | Est. Keys |\n");
    section.push_str("|:---|---:|---:|---:|\n");

    for value_type in ValueType::SAMPLED {
        let count = results.count(value_type);
        if count == 0 {
            continue;
        }
        section.push_str(&format!(
            "| {} | {} | {:.1}% | {} |\n",
            value_type.label(),
            count,
            metadata.share(count),
            metadata.estimate_keys(count)
        ));
    }

    let total = results.total();
    section.push_str(&format!(
        "| **Total** | **{}** | **{:.1}%** | **{}** |\n\n",
        total,
        metadata.share(total),
        metadata.estimate_keys(total)
    ));

    section
}

fn generate_strings_section(stats: &StringStats, top_n: usize) -> String {
    let mut section = String::new();

    section.push_str(&format!("## Strings ({} sampled)\n\n", stats.observed));
    section.push_str(&size_table(&[
        ("Key length", &stats.key_lengths),
        ("Value size (bytes)", &stats.value_sizes),
    ]));
    section.push_str(&histogram_table("Value Sizes", "Size (bytes)", &stats.value_sizes));
    section.push_str(&top_table("Most Common Keys", "Key", &stats.keys, top_n));
    section.push_str(&top_table("Most Common Values", "Value", &stats.values, top_n));

    section
}

fn generate_collection_section(value_type: ValueType, stats: &CollectionStats, top_n: usize) -> String {
    let mut section = String::new();

    let noun = match value_type {
        ValueType::List => "Lists",
        ValueType::Set => "Sets",
        _ => "Sorted Sets",
    };
    let size_label = match value_type {
        ValueType::List => "Length",
        _ => "Cardinality",
    };

    section.push_str(&format!("## {} ({} sampled)\n\n", noun, stats.observed));
    section.push_str(&size_table(&[
        ("Key length", &stats.key_lengths),
        (size_label, &stats.cardinality),
        ("Member size (bytes)", &stats.member_sizes),
    ]));
    section.push_str(&histogram_table(size_label, size_label, &stats.cardinality));
    section.push_str(&top_table("Most Common Keys", "Key", &stats.keys, top_n));
    section.push_str(&top_table("Most Common Members", "Member", &stats.members, top_n));

    section
}

fn generate_hashes_section(stats: &HashStats, top_n: usize) -> String {
    let mut section = String::new();

    section.push_str(&format!("## Hashes ({} sampled)\n\n", stats.observed));
    section.push_str(&size_table(&[
        ("Key length", &stats.key_lengths),
        ("Field count", &stats.field_counts),
        ("Field name size (bytes)", &stats.field_sizes),
        ("Field value size (bytes)", &stats.value_sizes),
    ]));
    section.push_str(&histogram_table("Field Counts", "Fields", &stats.field_counts));
    section.push_str(&top_table("Most Common Keys", "Key", &stats.keys, top_n));
    section.push_str(&top_table("Most Common Fields", "Field", &stats.fields, top_n));
    section.push_str(&top_table("Most Common Values", "Value", &stats.values, top_n));

    section
}

/// Min / mean / max for several measures. Measures with no samples are left out.
fn size_table(rows: &[(&str, &SizeStats)]) -> String {
    let mut table = String::new();

    table.push_str("| Measure | Samples | Min | Mean | Max |\n");
    table.push_str("|:---|---:|---:|---:|---:|\n");

    for (label, stats) in rows {
        if stats.is_empty() {
            continue;
        }
        table.push_str(&format!(
            "| {} | {} | {} | {:.1} | {} |\n",
            label,
            stats.count(),
            stats.min().unwrap_or(0),
            stats.mean().unwrap_or(0.0),
            stats.max().unwrap_or(0)
        ));
    }
    table.push('\n');

    table
}

fn histogram_table(title: &str, unit: &str, stats: &SizeStats) -> String {
    if stats.is_empty() {
        return String::new();
    }

    let mut table = String::new();

    table.push_str(&format!("### {} Distribution\n\n", title));
    table.push_str(&format!("| {} | Samples | Share |\n", unit));
    table.push_str("|:---|---:|---:|\n");

    let total = stats.count() as f64;
    for (upper, count) in stats.histogram() {
        table.push_str(&format!(
            "| ≤ {} | {} | {:.1}% |\n",
            upper,
            count,
            count as f64 * 100.0 / total
        ));
    }
    table.push('\n');

    table
}

fn top_table(title: &str, column: &str, frequencies: &Frequencies, top_n: usize) -> String {
    if frequencies.is_empty() || top_n == 0 {
        return String::new();
    }

    let mut table = String::new();

    table.push_str(&format!(
        "### {} ({} distinct)\n\n",
        title,
        frequencies.distinct()
    ));
    table.push_str(&format!("| {} | Count |\n", column));
    table.push_str("|:---|---:|\n");

    for (label, count) in frequencies.top(top_n) {
        table.push_str(&format!("| {} | {} |\n", cell(label), count));
    }
    table.push('\n');

    table
}

/// Render a sampled label inside a table cell.
fn cell(label: &str) -> String {
    let escaped = label
        .replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace('`', "'")
        .replace(['\r', '\n'], " ");
    format!("`{}`", escaped)
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(
        "*Figures are extrapolated from a random sample. Collection members and hash \
         fields are taken from the first element, so they describe the head of each \
         collection rather than a uniform sample of its contents.*\n",
    );

    footer
}

#[derive(Serialize)]
struct JsonReport<'a> {
    metadata: &'a ReportMetadata,
    results: &'a Results,
}

/// Generate a JSON report for one bucket.
pub fn generate_json_report(results: &Results, metadata: &ReportMetadata) -> Result<String> {
    serde_json::to_string_pretty(&JsonReport { metadata, results }).map_err(Into::into)
}

/// Render one bucket in `format`.
pub fn render(
    format: OutputFormat,
    results: &Results,
    metadata: &ReportMetadata,
    top_n: usize,
) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(generate_markdown_report(results, metadata, top_n)),
        OutputFormat::Json => generate_json_report(results, metadata),
    }
}

/// Turn a bucket name into something safe to use as a file name.
pub fn sanitize_bucket_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    match sanitized.trim_matches('.') {
        "" => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Write one report per bucket into `dir` and return the paths written.
///
/// Files are named `reckon-<bucket>.<ext>`. Buckets whose names sanitize
/// to the same file name get a numeric suffix.
pub fn write_reports(
    dir: &Path,
    format: OutputFormat,
    buckets: &[Results],
    metadata: &ReportMetadata,
    top_n: usize,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut used = HashSet::new();
    let mut written = Vec::with_capacity(buckets.len());

    for results in buckets {
        let stem = sanitize_bucket_name(&results.name);
        let mut file_name = format!("reckon-{}.{}", stem, format.extension());
        let mut n = 2;
        while !used.insert(file_name.clone()) {
            file_name = format!("reckon-{}-{}.{}", stem, n, format.extension());
            n += 1;
        }

        let path = dir.join(&file_name);
        let content = render(format, results, metadata, top_n)?;
        std::fs::write(&path, &content)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        written.push(path);
    }

    Ok(written)
}
