//! `seedpush vapid` – print the application server public key.

use anyhow::Result;
use seedpush_core::config::SeedpushConfig;
use seedpush_core::push::VapidKeys;

pub fn run_vapid(cfg: &SeedpushConfig) -> Result<()> {
    let path = cfg.vapid_file_path()?;
    let keys = VapidKeys::load_or_create(&path)?;
    println!("{}", keys.public_key);
    Ok(())
}
