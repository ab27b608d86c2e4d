use serde::{Deserialize, Serialize};

/// Fully rendered message, ready for the mail relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub content: String,
    pub correlation_id: String,
    pub category: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailReceipt {
    pub id: String,
}
