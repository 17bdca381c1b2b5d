use crate::modules::exports::models::EInvoiceDocument;

/// Turns a finished invoice document into an external e-invoice format
/// (XRechnung, ZUGFeRD, Peppol UBL and the like).
///
/// Implementations live outside this crate; the service only guarantees the
/// document it passes in belongs to an issued or paid invoice.
pub trait EInvoiceExporter: Send + Sync {
    type Output;
    type Error: std::error::Error + Send + Sync + 'static;

    fn export(&self, document: &EInvoiceDocument) -> Result<Self::Output, Self::Error>;

    /// Format name used in logs
    fn name(&self) -> &str;
}

/// Serializes the document as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter {
    pub pretty: bool,
}

impl EInvoiceExporter for JsonExporter {
    type Output = String;
    type Error = serde_json::Error;

    fn export(&self, document: &EInvoiceDocument) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(document)
        } else {
            serde_json::to_string(document)
        }
    }

    fn name(&self) -> &str {
        "json"
    }
}
