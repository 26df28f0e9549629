use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use specimen_audit::{
    aggregate_revisions, extract_first_csv, flatten_requirements, merge_wide_tables,
    merged_file_name, output_folder, write_wide_file, AuditError, Config, LabelCache, PollBudget,
    Resolver, RestClient, TimeWindow, ValueNormalizer,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let cp_id = match args.get(1).and_then(|arg| arg.parse::<i64>().ok()) {
        Some(id) => id,
        None => {
            eprintln!("Usage: specimen-audit <collection-protocol-id>");
            eprintln!("       (credentials via SR_AUDIT_BASE_URL / SR_AUDIT_USERNAME / SR_AUDIT_PASSWORD)");
            std::process::exit(1);
        }
    };

    run(cp_id)
}

fn run(cp_id: i64) -> Result<()> {
    println!("🧪 Specimen Requirement Audit History");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::from_env().context("loading configuration")?;

    // 1. Session
    println!("\n🔐 Authenticating against {}...", config.base_url);
    let mut client = RestClient::new(&config.base_url)?;
    client
        .authenticate(&config.credentials)
        .context("establishing session")?;
    println!("✓ Session established");

    // 2. Events
    println!("\n📋 Listing events for collection protocol {cp_id}...");
    let events = client.list_events(cp_id).context("listing events")?;
    if events.is_empty() {
        println!("No events found.");
        return Ok(());
    }
    println!("✓ Found {} events", events.len());

    // 3. Prefetch catalogs so common identifiers never cost a round trip
    println!("\n📚 Prefetching permissible-value catalogs...");
    let mut cache = LabelCache::new();
    for attribute in &config.prefetch_attributes {
        match client.list_permissible_values(attribute) {
            Ok(values) => {
                let merged = cache.prefetch(&values);
                println!("✓ {attribute}: {merged} values cached");
            }
            Err(err) => eprintln!("⚠️  Could not prefetch {attribute}: {err}"),
        }
    }

    // 4. Export + transform, one requirement at a time
    let folder = PathBuf::from(output_folder(cp_id));
    fs::create_dir_all(&folder)
        .with_context(|| format!("creating output folder {}", folder.display()))?;

    let normalizer = ValueNormalizer::new();
    let window = TimeWindow::last_year();
    let mut processed = 0usize;
    let mut skipped = 0usize;

    for event in &events {
        let requirements = match client.list_requirements(cp_id, &event.label) {
            Ok(tree) => flatten_requirements(&tree),
            Err(err) => {
                eprintln!("⚠️  Skipping event '{}': {err}", event.label);
                continue;
            }
        };
        println!(
            "\n📦 Event '{}': {} requirements",
            event.label,
            requirements.len()
        );

        for requirement in &requirements {
            match process_requirement(
                &client,
                requirement.id,
                &event.label,
                &window,
                &config.poll,
                &normalizer,
                &mut cache,
                &folder,
            ) {
                Ok(true) => {
                    processed += 1;
                    println!("  ✓ Requirement {}", requirement.id);
                }
                Ok(false) => {
                    println!("  - Requirement {}: no audit export produced", requirement.id);
                }
                Err(err) => {
                    skipped += 1;
                    eprintln!("  ⚠️ Requirement {} skipped: {err}", requirement.id);
                }
            }
        }
    }

    // 5. Merge
    println!("\n🔗 Merging wide tables...");
    let report = merge_wide_tables(&folder, &merged_file_name(cp_id)).context("merging tables")?;
    println!(
        "✓ Merged {} files ({} rows) into {}",
        report.merged_files,
        report.rows,
        folder.join(merged_file_name(cp_id)).display()
    );

    // 6. Summary
    let stats = cache.stats();
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Done: {processed} requirements exported, {skipped} skipped");
    println!(
        "   Label cache: {} entries, {} hits, {} remote fetches, {} decimal fallbacks",
        cache.len(),
        stats.hits,
        stats.remote_fetches,
        stats.fallbacks
    );
    if report.skipped_files > 0 {
        println!("   Merge skipped {} unreadable files", report.skipped_files);
    }

    Ok(())
}

/// Export, download, and transform one requirement's audit history.
///
/// Returns Ok(false) when the platform produced no export file. Any error is
/// fatal to this requirement only - the caller logs it and moves on.
#[allow(clippy::too_many_arguments)]
fn process_requirement(
    client: &RestClient,
    req_id: i64,
    event_label: &str,
    window: &TimeWindow,
    poll: &PollBudget,
    normalizer: &ValueNormalizer,
    cache: &mut LabelCache,
    folder: &Path,
) -> Result<bool, AuditError> {
    let file_id = match client.submit_export(req_id, window)? {
        Some(id) => id,
        None => return Ok(false),
    };

    let archive = client.poll_export_file(&file_id, poll)?;
    let narrow = extract_first_csv(&archive)?;

    let mut resolver = Resolver::new(cache, client);
    let history = aggregate_revisions(narrow.as_slice(), normalizer, &mut resolver)?;

    write_wide_file(folder, &history, req_id, event_label)?;
    Ok(true)
}
