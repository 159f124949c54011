//! # Quote Subcommand
//!
//! Prices an order offline with the same arithmetic the service applies at
//! order creation.

use anyhow::{anyhow, Result};
use clap::Args;
use rsm_api::config::{DEFAULT_MAX_ORDER_QUANTITY, DEFAULT_TAX_RATE_BPS};
use rsm_core::{format_amount, parse_amount, OrderPricing};

/// Arguments for `rsm quote`.
#[derive(Args, Debug)]
pub struct QuoteArgs {
    /// Unit stamp price as a decimal, e.g. `2.50`.
    #[arg(long)]
    pub price: String,

    /// Number of stamps.
    #[arg(long)]
    pub quantity: i64,

    /// Tax rate in basis points.
    #[arg(long, default_value_t = DEFAULT_TAX_RATE_BPS)]
    pub tax_rate_bps: i64,

    /// Largest accepted quantity.
    #[arg(long, default_value_t = DEFAULT_MAX_ORDER_QUANTITY)]
    pub max_quantity: i64,

    /// Emit JSON (amounts in cents) instead of text.
    #[arg(long)]
    pub json: bool,
}

pub fn compute(args: &QuoteArgs) -> Result<OrderPricing> {
    let unit_price = parse_amount(args.price.trim())
        .ok_or_else(|| anyhow!("{:?} is not a valid amount", args.price))?;
    Ok(OrderPricing::compute(
        unit_price,
        args.quantity,
        args.tax_rate_bps,
        args.max_quantity,
    )?)
}

pub fn run_quote(args: &QuoteArgs) -> Result<u8> {
    let pricing = compute(args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&pricing)?);
        return Ok(0);
    }
    println!("quantity     {}", pricing.quantity);
    println!("unit price   {}", format_amount(pricing.unit_price));
    println!("total        {}", format_amount(pricing.total_amount));
    println!(
        "tax ({} bps) {}",
        pricing.tax_rate_bps,
        format_amount(pricing.tax_amount)
    );
    println!("grand total  {}", format_amount(pricing.grand_total));
    Ok(0)
}
