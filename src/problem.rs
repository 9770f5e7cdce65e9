//! Demonstrates the PROBLEM: unsynchronized increments lose updates
//!
//! 100 000 increment tasks run on a pool of four workers with no mutual
//! exclusion around the read-modify-write. Two workers routinely read the
//! same value, both add one, and one of the updates vanishes: the final
//! count comes up short of 100 000 on essentially every run.

use anyhow::Result;

use shared_counter_race::{run_workload, Strategy, WorkloadConfig};

const TASK_COUNT: usize = 100_000;
const POOL_SIZE: usize = 4;

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    println!("\n❌ PROBLEM APPROACH DEMONSTRATION");
    println!("=================================\n");
    println!("Incrementing a shared counter {TASK_COUNT} times across {POOL_SIZE} workers");
    println!("with NO synchronization around the read-modify-write.\n");

    let config = WorkloadConfig::new(POOL_SIZE, TASK_COUNT, Strategy::Unsynchronized);
    let report = run_workload(&config)?;
    let lost = report.lost_updates(TASK_COUNT as i64);

    println!("Expected count: {TASK_COUNT}");
    println!("Actual count:   {} ({})", report.final_count, report.status);
    println!("Lost updates:   {lost}\n");

    if lost > 0 {
        println!("⚠️  {lost} increments were overwritten by concurrent writers.");
        println!("   Each lost update is a read-modify-write race: two workers read");
        println!("   the same value and the second store clobbered the first.\n");
    } else {
        println!("No updates lost this run - the race is probabilistic.");
        println!("Run it again, or raise the task count.\n");
    }

    println!("See `cargo run --bin solution` for the disciplines that fix this.");
    Ok(())
}
