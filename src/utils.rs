use rust_decimal::Decimal;

pub fn write_csv<I, R, W>(records: I, writer: W) -> anyhow::Result<()>
where
    I: IntoIterator<Item = R>,
    R: serde::Serialize,
    W: std::io::Write,
{
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records.into_iter() {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Amount in reais with two decimal places
pub fn format_brl(amount: Decimal) -> String {
    if amount.is_sign_negative() && !amount.is_zero() {
        format!("-R$ {:.2}", amount.abs())
    } else {
        format!("R$ {:.2}", amount)
    }
}
