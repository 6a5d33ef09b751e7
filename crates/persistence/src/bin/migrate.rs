#![deny(warnings)]

use chrono::Utc;
use persistence::{default_state_dir, open, seal, FileStorage, StorageBackend, SCHEMA_VERSION};

/// Rewrite a stored state blob in the current envelope layout.
fn main() -> anyhow::Result<()> {
    let mut dir = default_state_dir().to_string();
    let mut key = "app_state".to_string();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dir" => dir = args.next().ok_or_else(|| anyhow::anyhow!("--dir needs a value"))?,
            "--key" => key = args.next().ok_or_else(|| anyhow::anyhow!("--key needs a value"))?,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    let storage = FileStorage::new(&dir);
    let Some(blob) = storage.get(&key) else {
        println!("Nothing stored under {key} in {dir}");
        return Ok(());
    };
    let payload = open(blob)?;
    if !storage.set(&key, seal(payload, Utc::now())?) {
        anyhow::bail!("could not write {key} back to {dir}");
    }
    println!("{key} migrated to schema v{SCHEMA_VERSION} in {dir}");
    Ok(())
}
