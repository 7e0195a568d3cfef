use anyhow::Result;
use serde_json::json;

use tally_core::Ledger;
use tally_core::models::{GoalProfile, Registration};

pub(crate) struct RegisterArgs {
    pub name: String,
    pub email: String,
    pub password: String,
    pub weight: Option<f64>,
    pub goals: GoalProfile,
}

pub(crate) fn cmd_register(ledger: &Ledger, args: RegisterArgs, json: bool) -> Result<()> {
    let user = ledger.register(&Registration {
        name: args.name,
        email: args.email,
        password: args.password,
        current_weight: args.weight,
        goals: args.goals,
    })?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "user_id": user.id, "email": user.email }))?
        );
    } else {
        let email = &user.email;
        let id = user.id;
        println!("Registered {email} ({id})");
    }
    Ok(())
}
