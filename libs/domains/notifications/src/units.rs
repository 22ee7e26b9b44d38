//! Amount formatting for rendered messages.

use domain_wallet::Unit;

const SATS_PER_BTC: u64 = 100_000_000;
const SATS_PER_BIT: u64 = 100;

/// Format a base-unit (satoshi) amount per the recipient's display unit,
/// with thousands grouping and the unit label appended.
///
/// 12_300_000 renders as "0.123 BTC" or "123,000 bits".
pub fn format_amount(base_units: u64, unit: Unit) -> String {
    match unit {
        Unit::Btc => {
            let whole = base_units / SATS_PER_BTC;
            // six decimal places, then trailing zeros stripped down to two
            let micros = (base_units % SATS_PER_BTC) / 100;
            let mut decimals = format!("{micros:06}");
            while decimals.len() > 2 && decimals.ends_with('0') {
                decimals.pop();
            }
            format!("{}.{} BTC", group_thousands(whole), decimals)
        }
        Unit::Bit => {
            let bits = (base_units + SATS_PER_BIT / 2) / SATS_PER_BIT;
            format!("{} bits", group_thousands(bits))
        }
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    grouped
}
