use anyhow::Result;
use chrono::Utc;
use std::path::Path;

use acp_observer::config::Config;
use acp_observer::scheduler::TargetScheduleQueue;
use acp_observer::utils::format_timestamp;

pub fn validate(path: &Path) -> Result<()> {
    let mut config = Config::from_file(path)?;
    config.apply_env_overrides();

    if let Err(e) = config.validate() {
        println!("Configuration {} has problems:", path.display());
        for problem in e.problems() {
            println!("  - {problem}");
        }
        anyhow::bail!("{} problem(s) found", e.problems().len());
    }

    let queue = TargetScheduleQueue::from_targets(config.targets()?);
    let stop = config.global_stop_time()?;

    println!("Configuration {} is valid\n", path.display());
    println!("{}", queue.summary(Utc::now(), stop).display());

    for (i, target) in queue.iter().enumerate() {
        let plan = target.imaging_plan(&config.imaging);
        println!(
            "{:>2}. {:<16} start {}  priority {}  {}",
            i + 1,
            target.name,
            format_timestamp(&target.start_time),
            target.priority,
            plan.filter_summary()
        );
    }
    Ok(())
}
