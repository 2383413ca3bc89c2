use super::registration::RegistrationId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub type PaymentId = u64;
pub type UserId = u64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment {id} is {status}; proof can only be submitted for pending payments")]
    NotPending { id: PaymentId, status: PaymentStatus },
    #[error("payment {id} is already paid and cannot change to {requested}")]
    PaidIsFinal {
        id: PaymentId,
        requested: PaymentStatus,
    },
    #[error("payment {id} does not belong to user {user_id}")]
    NotOwner { id: PaymentId, user_id: UserId },
    #[error("unknown payment status: {0}")]
    UnknownStatus(String),
}

/// Lifecycle of a single payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting a bank transfer
    PendingPayment,
    /// Proof submitted, waiting for the coordinator to review it
    #[serde(alias = "pending_br_proof_approval")]
    PendingProofApproval,
    /// Invoice sent to an international participant
    InvoiceSentInt,
    PaidBr,
    #[serde(alias = "paid_international")]
    PaidInt,
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::PendingPayment,
        PaymentStatus::PendingProofApproval,
        PaymentStatus::InvoiceSentInt,
        PaymentStatus::PaidBr,
        PaymentStatus::PaidInt,
        PaymentStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::PendingPayment => "pending_payment",
            PaymentStatus::PendingProofApproval => "pending_proof_approval",
            PaymentStatus::InvoiceSentInt => "invoice_sent_int",
            PaymentStatus::PaidBr => "paid_br",
            PaymentStatus::PaidInt => "paid_int",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// The "paid" family: events covered by these payments are immutable.
    pub fn is_paid(self) -> bool {
        matches!(self, PaymentStatus::PaidBr | PaymentStatus::PaidInt)
    }

    pub fn is_pending(self) -> bool {
        self == PaymentStatus::PendingPayment
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "pending_br_proof_approval" => return Ok(PaymentStatus::PendingProofApproval),
            "paid_international" => return Ok(PaymentStatus::PaidInt),
            _ => {}
        }
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PaymentError::UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    BankTransfer,
    InternationalInvoice,
    /// Nothing to pay; bookkeeping entry only
    None,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::InternationalInvoice => "international_invoice",
            PaymentMethod::None => "none",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price charged for one event within a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PaymentLine {
    pub event_code: String,
    #[schemars(with = "f64")]
    pub individual_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub registration_id: RegistrationId,
    /// Human-facing reference quoted on bank transfers (PAY-YYYYMMDD-XXXXXX)
    pub reference: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    #[schemars(with = "f64")]
    pub total_amount: Decimal,
    #[serde(default)]
    pub events: Vec<PaymentLine>,
    #[serde(default)]
    pub proof_reference: Option<String>,
    #[serde(default)]
    pub proof_uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub invoice_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        self.status.is_paid()
    }

    /// Event codes this payment has locked. Empty unless the payment is paid.
    pub fn immutable_event_codes(&self) -> Vec<String> {
        if !self.is_paid() {
            return Vec::new();
        }
        self.events.iter().map(|l| l.event_code.clone()).collect()
    }

    /// Record a bank-transfer proof and hand the payment over for review.
    pub fn submit_proof(
        &mut self,
        user_id: UserId,
        proof_reference: &str,
        at: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        if self.user_id != user_id {
            return Err(PaymentError::NotOwner {
                id: self.id,
                user_id,
            });
        }
        if !self.status.is_pending() {
            return Err(PaymentError::NotPending {
                id: self.id,
                status: self.status,
            });
        }
        self.proof_reference = Some(proof_reference.to_string());
        self.proof_uploaded_at = Some(at);
        self.status = PaymentStatus::PendingProofApproval;
        self.append_note("Payment proof uploaded by user");
        Ok(())
    }

    /// Administrative status change, logged in the notes. Returns the old status.
    pub fn change_status(
        &mut self,
        new_status: PaymentStatus,
        admin: &str,
        at: DateTime<Utc>,
    ) -> Result<PaymentStatus, PaymentError> {
        let old_status = self.status;
        if old_status.is_paid() && !new_status.is_paid() {
            return Err(PaymentError::PaidIsFinal {
                id: self.id,
                requested: new_status,
            });
        }
        if new_status == PaymentStatus::InvoiceSentInt && self.invoice_sent_at.is_none() {
            self.invoice_sent_at = Some(at);
        }
        self.status = new_status;
        self.append_note(&format!(
            "[{}] Payment status changed by {}: '{}' -> '{}'",
            at.format("%Y-%m-%d %H:%M:%S"),
            admin,
            old_status,
            new_status
        ));
        Ok(old_status)
    }

    fn append_note(&mut self, entry: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{entry}"),
            _ => entry.to_string(),
        });
    }
}

/// Deterministic payment reference: PAY-<date>-<first 6 hex digits of a digest>.
pub fn generate_reference(payment_id: PaymentId, user_id: UserId, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payment_id.to_be_bytes());
    hasher.update(user_id.to_be_bytes());
    hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    let digest = hex::encode_upper(hasher.finalize());
    format!("PAY-{}-{}", at.format("%Y%m%d"), &digest[..6])
}
