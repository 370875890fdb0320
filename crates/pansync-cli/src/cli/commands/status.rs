//! `pansync status` – list recorded transfers.

use anyhow::Result;
use pansync_core::transfer_db::TransferDb;

pub async fn run_status(db: &TransferDb) -> Result<()> {
    let rows = db.list_transfers().await?;
    if rows.is_empty() {
        println!("No transfers recorded.");
        return Ok(());
    }
    println!(
        "{:<6} {:<9} {:<9} {:<12} {:<30} {}",
        "ID", "KIND", "STATE", "SLICES", "REMOTE", "LOCAL"
    );
    for r in rows {
        let slices = if r.slice_count > 0 {
            format!("{}/{}", r.slices_done(), r.slice_count)
        } else {
            "-".to_string()
        };
        println!(
            "{:<6} {:<9} {:<9} {:<12} {:<30} {}",
            r.id,
            r.kind.as_str(),
            r.state.as_str(),
            slices,
            r.remote,
            r.local.display()
        );
        if let Some(err) = &r.last_error {
            println!("       error: {err}");
        }
    }
    Ok(())
}
