use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::store::{Event, GuestListRow, OrderWithBuyer};
use crate::util::dates::AgeCategory;

// ============================================================================
// Document Collaborator
// ============================================================================
//
// PDF and CSV rendering is external: the core hands over structured rows and
// receives bytes. Document builders here assemble those rows; layout is the
// renderer's concern. A CSV renderer ships in-crate as the reference
// implementation.
//
// ============================================================================

/// A tabular document: title, free-form meta lines, a header row and data
/// rows. Rich enough for the guest list and the order summary.
#[derive(Debug, Clone, Serialize)]
pub struct TableDocument {
    pub title: String,
    pub meta: Vec<String>,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub trait DocumentRenderer: Send + Sync {
    fn render(&self, document: &TableDocument) -> anyhow::Result<Vec<u8>>;
}

/// Renders the data rows as quoted CSV. Title and meta lines are dropped;
/// CSV is a data exchange format, not a layout.
pub struct CsvRenderer;

impl DocumentRenderer for CsvRenderer {
    fn render(&self, document: &TableDocument) -> anyhow::Result<Vec<u8>> {
        let mut out = String::new();
        out.push_str(&csv_line(&document.header));
        for row in &document.rows {
            out.push_str(&csv_line(row));
        }
        Ok(out.into_bytes())
    }
}

fn csv_line(fields: &[String]) -> String {
    let quoted: Vec<String> = fields
        .iter()
        .map(|f| format!("\"{}\"", f.replace('"', "\"\"")))
        .collect();
    format!("{}\n", quoted.join(","))
}

/// Everything a per-ticket document needs. The QR payload is the scannable
/// part; the rest is display data.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDocument {
    pub event_name: String,
    pub payment_reference: String,
    pub ticket_number: u32,
    pub participant_name: String,
    pub participant_phone: String,
    pub participant_email: String,
    pub age_category: Option<AgeCategory>,
    pub security_id: String,
    pub qr_payload: String,
}

/// Guest list for one event: confirmed, paid participants only.
pub fn guest_list_document(event: &Event, rows: &[GuestListRow]) -> TableDocument {
    let today = Utc::now().date_naive();
    TableDocument {
        title: format!("{} - Guest List", event.name),
        meta: vec![
            event
                .location
                .as_deref()
                .map(|l| format!("Location: {l}"))
                .unwrap_or_default(),
            format!("Created: {today}"),
            format!("Participants: {}", rows.len()),
        ]
        .into_iter()
        .filter(|line| !line.is_empty())
        .collect(),
        header: vec![
            "Name".to_string(),
            "Phone".to_string(),
            "Email".to_string(),
            "Ticket #".to_string(),
            "Buyer".to_string(),
            "Buyer Email".to_string(),
            "Reference".to_string(),
            "Order Date".to_string(),
            "Price".to_string(),
        ],
        rows: rows
            .iter()
            .map(|row| {
                vec![
                    row.participant.name.clone(),
                    row.participant.phone.clone(),
                    row.participant.email.clone(),
                    row.participant.ticket_number.to_string(),
                    row.buyer_name.clone(),
                    row.buyer_email.clone(),
                    row.payment_reference.clone(),
                    row.order_created_at.date_naive().to_string(),
                    format!("{:.2} EUR", row.total_price),
                ]
            })
            .collect(),
    }
}

/// Admin overview of all orders, one row per order.
pub fn order_summary_document(title: &str, orders: &[OrderWithBuyer]) -> TableDocument {
    TableDocument {
        title: format!("{title} - Order Summary"),
        meta: vec![
            format!("Created: {}", Utc::now().date_naive()),
            format!("Orders: {}", orders.len()),
        ],
        header: vec![
            "Buyer".to_string(),
            "Status".to_string(),
            "Tickets".to_string(),
            "Price".to_string(),
            "Ordered".to_string(),
            "Paid".to_string(),
        ],
        rows: orders
            .iter()
            .map(|row| {
                vec![
                    row.buyer.name.clone(),
                    format!("{:?}", row.order.status).to_lowercase(),
                    row.order.ticket_count.to_string(),
                    format!("{:.2} EUR", row.order.total_price),
                    row.order.created_at.date_naive().to_string(),
                    row.order
                        .paid_at
                        .map(|d: NaiveDate| d.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Participant, Visibility};

    #[test]
    fn test_csv_renderer_quotes_fields() {
        let doc = TableDocument {
            title: "t".to_string(),
            meta: vec![],
            header: vec!["Name".to_string(), "Note".to_string()],
            rows: vec![vec!["Lena \"Leni\" S.".to_string(), "a,b".to_string()]],
        };
        let bytes = CsvRenderer.render(&doc).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "\"Name\",\"Note\"\n\"Lena \"\"Leni\"\" S.\",\"a,b\"\n");
    }

    #[test]
    fn test_guest_list_document_rows() {
        let event = Event {
            id: "ev1".to_string(),
            name: "Abiball 2026".to_string(),
            year: 2026,
            location: Some("Stadthalle".to_string()),
            visibility: Visibility::Public,
            password: None,
            max_tickets: 100,
            ticket_price: 45.0,
            start_datetime: None,
            ticket_sale_start: None,
            ticket_sale_end: None,
            max_tickets_per_user: None,
            ticket_generation_enabled: true,
            active: true,
        };
        let rows = vec![GuestListRow {
            participant: Participant::new(
                "Lena Schmidt".to_string(),
                "0151".to_string(),
                "lena@example.com".to_string(),
                None,
                1,
            ),
            buyer_name: "Max Mustermann".to_string(),
            buyer_email: "max@example.com".to_string(),
            payment_reference: "MAX001".to_string(),
            order_created_at: Utc::now(),
            total_price: 45.0,
        }];
        let doc = guest_list_document(&event, &rows);
        assert_eq!(doc.rows.len(), 1);
        assert_eq!(doc.rows[0][0], "Lena Schmidt");
        assert_eq!(doc.rows[0][8], "45.00 EUR");
        assert!(doc.meta.iter().any(|m| m.contains("Stadthalle")));
    }
}
