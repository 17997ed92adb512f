// Number formatting for the console summary.
use num_format::{Locale, ToFormattedString};

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus thousands separators on the integer part,
    // e.g. `1,234,567.89`.
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: u64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// `$1,234.56`, with the sign ahead of the currency symbol.
pub fn format_currency(n: f64) -> String {
    let body = format_number(n.abs(), 2);
    if n < 0.0 && body != "0.00" {
        format!("-${}", body)
    } else {
        format!("${}", body)
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
