//! The `sous status` command: meal plan and preparation task counts.

use anyhow::Result;

use sous_db::config::DbConfig;
use sous_db::pool;
use sous_db::queries::{meal_plans, tasks};

pub async fn show(db: &DbConfig) -> Result<()> {
    let pool = pool::create_pool(db).await?;

    let counts = meal_plans::get_meal_plan_counts(&pool).await?;
    println!("meal plans ({} total)", counts.total);
    println!("  awaiting votes  {}", counts.awaiting_votes);
    println!("  finalized       {}", counts.finalized);
    println!("  expired         {}", counts.expired);

    let task_counts = tasks::count_tasks_by_status(&pool).await?;
    let total: i64 = task_counts.iter().map(|(_, count)| count).sum();
    println!("preparation tasks ({total} total)");
    for (status, count) in &task_counts {
        println!("  {status:<15} {count}");
    }

    pool.close().await;
    Ok(())
}
