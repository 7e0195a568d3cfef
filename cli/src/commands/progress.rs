use anyhow::Result;
use chrono::Datelike;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use tally_core::Ledger;
use tally_core::models::{ComplianceStatus, Verdict, today};

use super::helpers::{find_user, fmt_opt, no_neg_zero, parse_date, truncate};

pub(crate) fn cmd_summary(
    ledger: &Ledger,
    email: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "Food")]
        name: String,
        #[tabled(rename = "Servings")]
        servings: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let user = find_user(ledger, email)?;
    let date = parse_date(date)?;
    let summary = ledger.daily_summary(user.id, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let date = &summary.date;
    if summary.logged_foods.is_empty() {
        eprintln!("No food logged for {date}");
        process::exit(2);
    }

    println!("=== {date} ===\n");

    let rows: Vec<FoodRow> = summary
        .logged_foods
        .iter()
        .map(|e| FoodRow {
            name: truncate(&e.name, 35),
            servings: format!("{}", e.servings),
            calories: format!("{:.0}", e.total_calories),
            protein: fmt_opt(e.total_macros.protein, "g"),
            carbs: fmt_opt(e.total_macros.carbs, "g"),
            fat: fmt_opt(e.total_macros.fat, "g"),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}\n");

    let cal = no_neg_zero(summary.total_calories);
    let burned = no_neg_zero(summary.calories_burned);
    let p = summary.macros_consumed.protein;
    let c = summary.macros_consumed.carbs;
    let f = summary.macros_consumed.fat;
    println!("  EATEN:  {cal:.0} kcal | P:{p:.0}g C:{c:.0}g F:{f:.0}g");
    println!("  BURNED: {burned:.0} kcal");

    let goals = &summary.user_profile;
    if let Some(goal) = goals.calorie_goal {
        let remaining = goal - cal + burned;
        println!("  GOAL:   {goal:.0} kcal | REMAINING: {remaining:.0} kcal");
    }
    let mg = &goals.macro_goals;
    if mg.protein.is_some() || mg.carbs.is_some() || mg.fat.is_some() {
        let (gp, gc, gf) = (fmt_opt(mg.protein, "g"), fmt_opt(mg.carbs, "g"), fmt_opt(mg.fat, "g"));
        println!("  MACRO GOALS: P:{gp} C:{gc} F:{gf}");
    }

    Ok(())
}

pub(crate) fn cmd_month(
    ledger: &Ledger,
    email: &str,
    year: Option<i32>,
    month: Option<u32>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct DayRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Status")]
        status: String,
    }

    let user = find_user(ledger, email)?;
    let now = today();
    let year = year.unwrap_or(now.year());
    let month = month.unwrap_or(now.month());
    let map = ledger.month_compliance(user.id, year, month)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    if map.is_empty() {
        eprintln!("No food logged in {year}-{month:02}");
        process::exit(2);
    }

    let rows: Vec<DayRow> = map
        .iter()
        .map(|(date, status)| DayRow {
            date: date.clone(),
            status: match status {
                ComplianceStatus::Success => "within goal".to_string(),
                ComplianceStatus::Failure => "over goal".to_string(),
            },
        })
        .collect();
    let hits = map
        .values()
        .filter(|s| **s == ComplianceStatus::Success)
        .count();
    let days = map.len();

    println!("{}", Table::new(&rows).with(Style::rounded()));
    println!("\n  {hits}/{days} logged days within goal");
    Ok(())
}

pub(crate) fn cmd_trend(ledger: &Ledger, email: &str, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct TrendRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Calories")]
        calories: String,
    }

    let user = find_user(ledger, email)?;
    let series = ledger.calorie_trend(user.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&series)?);
        return Ok(());
    }

    if series.is_empty() {
        eprintln!("No food logged in the last 30 days");
        process::exit(2);
    }

    let rows: Vec<TrendRow> = series
        .iter()
        .map(|d| TrendRow {
            date: d.date.clone(),
            calories: format!("{:.0}", no_neg_zero(d.total_calories)),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_check(ledger: &Ledger, email: &str, json: bool) -> Result<()> {
    let user = find_user(ledger, email)?;
    let verdict = ledger.trend_verdict(user.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(());
    }

    let marker = match verdict.on_track {
        Verdict::OnTrack => "on track",
        Verdict::Over => "over",
        Verdict::Unknown => "unknown",
    };
    println!("[{marker}] {}", verdict.message);
    Ok(())
}
