use clap::Args;
use lapwatch_core::{Configuration, INFINITE_LAPS};
use std::time::Duration;

#[derive(Args)]
pub struct ValidateArgs {
    /// Number of laps (999 = no fixed end)
    #[arg(long)]
    laps: u16,
    /// Work interval in seconds
    #[arg(long)]
    work: u64,
    /// Rest interval in seconds
    #[arg(long, default_value = "0")]
    rest: u64,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: ValidateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Configuration::adhoc(
        args.laps,
        Duration::from_secs(args.work),
        Duration::from_secs(args.rest),
    )?;

    if args.json {
        let total_secs = cfg.total_duration().map(|d| d.as_secs());
        let out = serde_json::json!({
            "valid": true,
            "laps": cfg.laps(),
            "infinite": cfg.is_infinite(),
            "work_secs": cfg.work().as_secs(),
            "rest_secs": cfg.rest().as_secs(),
            "total_secs": total_secs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let laps = if cfg.laps() == INFINITE_LAPS {
        "endless".to_string()
    } else {
        format!("{} laps", cfg.laps())
    };
    match cfg.total_duration() {
        Some(total) => println!(
            "valid: {laps} x {}s work / {}s rest, {}s total",
            cfg.work().as_secs(),
            cfg.rest().as_secs(),
            total.as_secs()
        ),
        None => println!(
            "valid: {laps} x {}s work / {}s rest",
            cfg.work().as_secs(),
            cfg.rest().as_secs()
        ),
    }
    Ok(())
}
