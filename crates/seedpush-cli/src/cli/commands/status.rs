//! `seedpush status` – list the jobs in the state file.

use anyhow::Result;
use seedpush_core::config::SeedpushConfig;
use seedpush_core::registry::read_snapshot;

pub fn run_status(cfg: &SeedpushConfig, session: Option<&str>) -> Result<()> {
    let path = cfg.state_file_path()?;
    let Some(jobs) = read_snapshot(&path)? else {
        println!("No state file at {}.", path.display());
        return Ok(());
    };

    let jobs: Vec<_> = jobs
        .into_iter()
        .filter(|j| session.map_or(true, |s| j.session == s))
        .collect();
    if jobs.is_empty() {
        println!("No jobs recorded.");
        return Ok(());
    }

    println!("{:<42} {:<18} {}", "ID", "SESSION", "NOTIFY");
    for j in jobs {
        let notify = if j.notify_target.is_some() { "yes" } else { "-" };
        println!("{:<42} {:<18} {}", j.id, j.session, notify);
    }
    Ok(())
}
