use anyhow::Result;
use serde_json::json;

use tally_core::Ledger;
use tally_core::models::today;
use tally_core::seed::{seed_catalog, seed_demo};

pub(crate) fn cmd_seed(
    ledger: &Ledger,
    demo_email: Option<&str>,
    demo_password: &str,
    json: bool,
) -> Result<()> {
    let added = seed_catalog(ledger)?;
    let demo = demo_email
        .map(|email| seed_demo(ledger, email, demo_password, today()))
        .transpose()?;

    if json {
        let demo = demo.as_ref().map(|d| {
            json!({
                "user_id": d.user_id,
                "food_logs": d.food_logs,
                "weights": d.weights,
                "activities": d.activities,
            })
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "foods_added": added, "demo": demo }))?
        );
        return Ok(());
    }

    println!("Added {added} catalog item(s)");
    if let (Some(d), Some(email)) = (&demo, demo_email) {
        let (logs, weights, activities) = (d.food_logs, d.weights, d.activities);
        println!("Demo user {email}: {logs} food logs, {weights} weights, {activities} activity days");
    }
    Ok(())
}
