//! Name tag rendering.

/// Formats `value` with a comma between every group of three digits.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

/// Fills a name tag template. The first `x#` becomes `<amount>x`, the first
/// `@` the display name.
pub fn render_name(template: &str, amount: u64, display_name: &str) -> String {
    template
        .replacen("x#", &format!("{}x", group_thousands(amount)), 1)
        .replacen('@', display_name, 1)
}
