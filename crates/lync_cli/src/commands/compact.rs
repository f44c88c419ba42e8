//! Compact command implementation.

use super::StoreLocation;
use lync_sync_engine::CompactPolicy;

/// Runs the compact command.
pub fn run(
    location: &StoreLocation,
    include_failed: bool,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let policy = if include_failed {
        CompactPolicy::AllTerminal
    } else {
        CompactPolicy::SyncedOnly
    };

    println!("Compacting event queue at {:?}", location.path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let log = location.open_log()?;
    let stats = log.stats();
    let removable = log.compactable(policy);

    println!("Compaction Analysis:");
    println!("  Events:   {}", stats.total);
    println!("  Pending:  {} (always kept)", stats.pending);
    println!("  Synced:   {} (will be removed)", stats.synced);
    println!(
        "  Failed:   {} (will be {})",
        stats.failed,
        if include_failed { "removed" } else { "kept" }
    );
    println!("  Remaining after compaction: {}", stats.total - removable);

    if !dry_run {
        println!();
        if removable > 0 {
            println!("Performing compaction...");
            let removed = log.compact(policy);
            if !log.durability().is_durable() {
                return Err("Compacted queue could not be written".into());
            }
            println!("✓ Removed {removed} events");
        } else {
            println!("No compaction needed - queue holds no removable events");
        }
    }

    Ok(())
}
