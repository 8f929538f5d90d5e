//! Text rendering for command output.

use machina_core::{Machine, TokenAmount};
use machina_payment::{FlowUpdate, Notification, PaymentReceipt, CURRENCY_SYMBOL};

pub fn machine_row(machine: &Machine) -> String {
    let status = if machine.exists { "available" } else { "unavailable" };
    format!(
        "{:>6}  {:<24}  {:>12} {CURRENCY_SYMBOL}  {status}",
        machine.index.to_string(),
        machine.name,
        machine.price.to_string(),
    )
}

pub fn machine_details(machine: &Machine) -> String {
    format!(
        "machine {}\n  name:         {}\n  address:      {}\n  price:        {} {CURRENCY_SYMBOL}\n  platform fee: {} {CURRENCY_SYMBOL} ({} bps)\n  exists:       {}",
        machine.index,
        machine.name,
        machine.machine_addr,
        machine.price,
        machine.platform_fee(),
        machine.platform_fee_bps,
        machine.exists,
    )
}

pub fn balance_line(label: &str, amount: TokenAmount) -> String {
    format!("{label:<8} {amount}")
}

/// One line per update; `None` for updates shown elsewhere.
pub fn flow_update(update: &FlowUpdate) -> Option<String> {
    match update {
        FlowUpdate::Step(step) => Some(format!("... {step}")),
        FlowUpdate::Confirmed { slot, hash } => Some(format!("    {slot} confirmed: {hash}")),
        FlowUpdate::Retrying {
            slot,
            next_attempt,
            reason,
        } => Some(format!("    {slot} failed ({reason}), attempt {next_attempt}")),
        FlowUpdate::Failed(failure) => Some(format!(
            "payment failed while {}: {}",
            failure.step,
            failure.user_message()
        )),
        FlowUpdate::Completed(_) => None,
    }
}

pub fn payment_summary(receipt: &PaymentReceipt) -> String {
    let mut lines = vec![format!(
        "paid {} {CURRENCY_SYMBOL} for {} ({})",
        receipt.price, receipt.machine.name, receipt.machine.index
    )];
    if let Some(amount) = receipt.airdrop_amount {
        lines.push(format!("  airdropped:  {amount} {CURRENCY_SYMBOL}"));
    }
    lines.push(format!("  transaction: {}", receipt.use_machine_hash));
    lines.join("\n")
}

pub fn notification_line(notification: &Notification) -> String {
    let marker = if notification.read { " " } else { "*" };
    format!(
        "{marker} {}  {}: {}",
        notification.timestamp.format("%Y-%m-%d %H:%M"),
        notification.title,
        notification.message
    )
}
