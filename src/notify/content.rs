use std::fmt::Write;

use crate::store::{BankAccount, Event, Participant};

use super::OutgoingMail;

// ============================================================================
// Mail Content
// ============================================================================
//
// Two messages leave this system: the order confirmation sent right after an
// order is placed (deliberately without payment details) and the payment
// request carrying bank details plus the EPC payload for banking apps.
//
// ============================================================================

fn participant_lines(body: &mut String, participants: &[Participant]) {
    for (index, participant) in participants.iter().enumerate() {
        let mut contact = Vec::new();
        if !participant.phone.is_empty() {
            contact.push(participant.phone.as_str());
        }
        if !participant.email.is_empty() {
            contact.push(participant.email.as_str());
        }
        if contact.is_empty() {
            let _ = writeln!(body, "  {}. {}", index + 1, participant.name);
        } else {
            let _ = writeln!(
                body,
                "  {}. {} ({})",
                index + 1,
                participant.name,
                contact.join(", ")
            );
        }
    }
}

/// Confirmation that an order was received and its tickets are reserved.
/// Payment details follow in a separate payment request.
pub fn order_received(
    recipient: &str,
    buyer_name: &str,
    event: &Event,
    payment_reference: &str,
    participants: &[Participant],
    total_price: f64,
) -> OutgoingMail {
    let mut body = String::new();
    let _ = writeln!(body, "Hello {buyer_name},");
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "thank you for your ticket order for {}. Your tickets are reserved.",
        event.name
    );
    let _ = writeln!(body);
    let _ = writeln!(body, "Order reference: {payment_reference}");
    let _ = writeln!(body, "Tickets: {}", participants.len());
    let _ = writeln!(body, "Total: {total_price:.2} EUR");
    let _ = writeln!(body);
    let _ = writeln!(body, "Participants:");
    participant_lines(&mut body, participants);
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "You will receive the payment details in a separate message. \
         Your tickets are confirmed once the payment has arrived."
    );

    OutgoingMail {
        to: recipient.to_string(),
        subject: format!("Order received - {}", event.name),
        body,
    }
}

/// Payment request with bank details and the EPC payload a banking app can
/// scan to prefill the transfer.
pub fn payment_request(
    recipient: &str,
    buyer_name: &str,
    event: &Event,
    payment_reference: &str,
    total_price: f64,
    account: &BankAccount,
    epc_payload: &str,
) -> OutgoingMail {
    let mut body = String::new();
    let _ = writeln!(body, "Hello {buyer_name},");
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "here are the payment details for your ticket order for {}.",
        event.name
    );
    let _ = writeln!(body);
    let _ = writeln!(body, "Order reference: {payment_reference}");
    let _ = writeln!(body, "Amount: {total_price:.2} EUR");
    let _ = writeln!(body);
    let _ = writeln!(body, "Please transfer to:");
    let _ = writeln!(body, "  Recipient: {}", account.account_name);
    let _ = writeln!(body, "  Bank: {}", account.bank_name);
    let _ = writeln!(body, "  IBAN: {}", account.iban);
    let _ = writeln!(body, "  BIC: {}", account.bic);
    let _ = writeln!(body, "  Reference: {payment_reference}");
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Important: use exactly the reference {payment_reference} so the \
         transfer can be matched to your order."
    );
    let _ = writeln!(body);
    let _ = writeln!(body, "EPC QR payload for banking apps:");
    let _ = writeln!(body, "{epc_payload}");

    OutgoingMail {
        to: recipient.to_string(),
        subject: format!("Payment request - {}", event.name),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Visibility;

    fn event() -> Event {
        Event {
            id: "ev1".to_string(),
            name: "Abiball 2026".to_string(),
            year: 2026,
            location: None,
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
        }
    }

    #[test]
    fn test_order_received_has_no_payment_details() {
        let participants = vec![Participant::new(
            "Lena Schmidt".to_string(),
            String::new(),
            String::new(),
            None,
            1,
        )];
        let mail = order_received(
            "lena@example.com",
            "Lena Schmidt",
            &event(),
            "LENA001",
            &participants,
            45.0,
        );
        assert_eq!(mail.subject, "Order received - Abiball 2026");
        assert!(mail.body.contains("LENA001"));
        assert!(!mail.body.contains("IBAN"));
    }

    #[test]
    fn test_payment_request_contains_bank_details_and_payload() {
        let account = BankAccount {
            id: "acc1".to_string(),
            event_id: "ev1".to_string(),
            account_name: "Abikomitee 2026".to_string(),
            bank_name: "Sparkasse".to_string(),
            iban: "DE89370400440532013000".to_string(),
            bic: "COBADEFFXXX".to_string(),
            percentage: 100.0,
            escrow_document_url: None,
        };
        let mail = payment_request(
            "lena@example.com",
            "Lena Schmidt",
            &event(),
            "LENA001",
            45.0,
            &account,
            "BCD\n002\n...",
        );
        assert!(mail.body.contains("DE89370400440532013000"));
        assert!(mail.body.contains("45.00 EUR"));
        assert!(mail.body.contains("BCD"));
    }
}
