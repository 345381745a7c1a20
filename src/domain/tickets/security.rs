use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Ticket Security Payload
// ============================================================================
//
// Every rendered ticket document gets a fresh random security id and a
// verification hash binding it to its order and ticket number. The hash
// covers exactly order_id, ticket_number and security_id; the display
// fields (participant name, event name) ride along unprotected. Because the
// security id is never persisted, every self-consistent rendered payload
// verifies; a reprint does not invalidate earlier prints.
//
// ============================================================================

/// What the ticket QR code carries, as one JSON object.
#[derive(Debug, Clone, Serialize)]
pub struct TicketQrPayload {
    pub order_id: String,
    pub ticket_number: u32,
    pub participant_name: String,
    pub event: String,
    pub security_id: String,
    pub verification_hash: String,
}

/// What arrives from the scanner. The required fields are optional here so
/// that missing data is a distinct, reportable condition rather than a
/// parse failure; display fields like the participant name are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannedQr {
    pub order_id: Option<String>,
    pub ticket_number: Option<u32>,
    pub security_id: Option<String>,
    pub verification_hash: Option<String>,
}

/// Fresh random security id, regenerated on every render.
pub fn new_security_id<R: Rng>(rng: &mut R) -> String {
    let bytes: [u8; 8] = rng.gen();
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// SHA-256 over `order_id-ticket_number-security_id`, hex encoded.
pub fn verification_hash(order_id: &str, ticket_number: u32, security_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{order_id}-{ticket_number}-{security_id}"));
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

impl TicketQrPayload {
    pub fn new(
        order_id: &str,
        ticket_number: u32,
        participant_name: &str,
        event_name: &str,
        security_id: String,
    ) -> Self {
        let verification_hash = verification_hash(order_id, ticket_number, &security_id);
        Self {
            order_id: order_id.to_string(),
            ticket_number,
            participant_name: participant_name.to_string(),
            event: event_name.to_string(),
            security_id,
            verification_hash,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_security_id_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let id = new_security_id(&mut rng);
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, id.to_uppercase());
    }

    #[test]
    fn test_security_ids_differ_per_render() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_ne!(new_security_id(&mut rng), new_security_id(&mut rng));
    }

    #[test]
    fn test_hash_is_deterministic_and_binds_the_triple() {
        let a = verification_hash("order1", 2, "ABCD");
        let b = verification_hash("order1", 2, "ABCD");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        assert_ne!(a, verification_hash("order2", 2, "ABCD"));
        assert_ne!(a, verification_hash("order1", 3, "ABCD"));
        assert_ne!(a, verification_hash("order1", 2, "ABCE"));
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = TicketQrPayload::new("order1", 2, "Lena Schmidt", "Abiball 2026", "AB12".to_string());
        let json = payload.to_json();
        let scanned: ScannedQr = serde_json::from_str(&json).unwrap();
        assert_eq!(scanned.order_id.as_deref(), Some("order1"));
        assert_eq!(scanned.ticket_number, Some(2));
        assert_eq!(
            scanned.verification_hash,
            Some(verification_hash("order1", 2, "AB12"))
        );
    }
}
