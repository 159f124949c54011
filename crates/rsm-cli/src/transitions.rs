//! # Transitions Subcommand
//!
//! Prints the transition table of one lifecycle, as text or JSON.

use anyhow::Result;
use clap::{Args, ValueEnum};
use rsm_state::{
    CatalogueStatus, LifecycleState, OrderStatus, PaymentStatus, RegistrationStatus, StampStatus,
};
use serde_json::{json, Value};

/// Which lifecycle to print.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Machine {
    Order,
    Payment,
    Stamp,
    Catalogue,
    Registration,
}

/// Arguments for `rsm transitions`.
#[derive(Args, Debug)]
pub struct TransitionsArgs {
    #[arg(value_enum)]
    pub machine: Machine,

    /// Emit JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

/// One row per status: `(status, reachable statuses, terminal)`.
fn table<S: LifecycleState>() -> Vec<(&'static str, Vec<&'static str>, bool)> {
    S::all()
        .iter()
        .map(|s| {
            (
                s.as_str(),
                s.allowed_transitions().iter().map(|t| t.as_str()).collect(),
                s.is_terminal(),
            )
        })
        .collect()
}

fn rows(machine: Machine) -> (&'static str, Vec<(&'static str, Vec<&'static str>, bool)>) {
    match machine {
        Machine::Order => (OrderStatus::KIND, table::<OrderStatus>()),
        Machine::Payment => (PaymentStatus::KIND, table::<PaymentStatus>()),
        Machine::Stamp => (StampStatus::KIND, table::<StampStatus>()),
        Machine::Catalogue => (CatalogueStatus::KIND, table::<CatalogueStatus>()),
        Machine::Registration => (RegistrationStatus::KIND, table::<RegistrationStatus>()),
    }
}

/// The table as a JSON document.
pub fn to_json(machine: Machine) -> Value {
    let (kind, rows) = rows(machine);
    json!({
        "kind": kind,
        "statuses": rows
            .into_iter()
            .map(|(status, to, terminal)| json!({
                "status": status,
                "transitions": to,
                "terminal": terminal,
            }))
            .collect::<Vec<_>>(),
    })
}

/// The table as aligned text lines.
pub fn to_text(machine: Machine) -> Vec<String> {
    let (kind, rows) = rows(machine);
    let width = rows.iter().map(|(s, _, _)| s.len()).max().unwrap_or(0);
    let mut lines = vec![format!("{kind} lifecycle")];
    for (status, to, terminal) in rows {
        let targets = if terminal {
            "(terminal)".to_string()
        } else {
            to.join(", ")
        };
        lines.push(format!("  {status:<width$}  -> {targets}"));
    }
    lines
}

pub fn run_transitions(args: &TransitionsArgs) -> Result<u8> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(&to_json(args.machine))?);
    } else {
        for line in to_text(args.machine) {
            println!("{line}");
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_table_lists_every_status() {
        let doc = to_json(Machine::Order);
        let statuses = doc["statuses"].as_array().unwrap();
        assert_eq!(statuses.len(), OrderStatus::all().len());
        let delivered = statuses
            .iter()
            .find(|s| s["status"] == "delivered")
            .unwrap();
        assert_eq!(delivered["terminal"], true);
    }

    #[test]
    fn text_marks_terminal_statuses() {
        let lines = to_text(Machine::Stamp);
        assert_eq!(lines[0], "stamp lifecycle");
        assert!(lines.iter().any(|l| l.contains("used") && l.contains("(terminal)")));
        assert!(lines
            .iter()
            .any(|l| l.trim_start().starts_with("produced") && l.contains("activated")));
    }
}
