use crate::domain::payment::Payment;
use crate::error::Result;
use std::io::Write;

/// Writes payments as CSV, header first, in the order given.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments<'a>(&mut self, payments: impl IntoIterator<Item = &'a Payment>) -> Result<()> {
        for payment in payments {
            self.writer.serialize(payment)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{NewPayment, PaymentId, PaymentStatus};
    use crate::interfaces::csv::payment_reader::PaymentReader;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_writer_output_reads_back() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let payment = Payment {
            status: PaymentStatus::Refunded,
            ..NewPayment::new(4200, "GBP", "merch_04").into_payment(PaymentId::new(), at)
        };

        let mut buf = Vec::new();
        PaymentWriter::new(&mut buf).write_payments([&payment]).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("id,amountCents,currency,merchantId,status,createdAt,updatedAt\n"));
        assert!(text.contains(",4200,GBP,merch_04,Refunded,"));

        let read: Vec<Payment> = PaymentReader::new(text.as_bytes())
            .payments()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(read, vec![payment]);
    }

    #[test]
    fn test_writer_with_no_payments_writes_nothing() {
        let mut buf = Vec::new();
        PaymentWriter::new(&mut buf).write_payments([]).unwrap();
        assert!(buf.is_empty());
    }
}
