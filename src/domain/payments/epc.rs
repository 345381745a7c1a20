// ============================================================================
// EPC QR Payload
// ============================================================================
//
// The text payload European banking apps parse to prefill a SEPA credit
// transfer (EPC069-12, version 002). This is a wire format, not a display
// string: eleven newline-joined fields in a fixed order, IBAN without
// whitespace, amount as EUR with two decimals. Any deviation breaks parsing
// in banking apps.
//
// ============================================================================

/// Build the EPC payload for one payment request.
pub fn epc_payload(
    account_name: &str,
    iban: &str,
    bic: &str,
    amount: f64,
    reference: &str,
) -> String {
    let iban: String = iban.chars().filter(|c| !c.is_whitespace()).collect();
    let amount = format!("EUR{amount:.2}");
    [
        "BCD",           // Service tag
        "002",           // Version
        "1",             // Character set (1 = UTF-8)
        "SCT",           // Identification (SEPA credit transfer)
        bic,             // BIC
        account_name,    // Beneficiary name
        iban.as_str(),   // Beneficiary account
        amount.as_str(), // Amount
        "",              // Purpose (unused)
        reference,       // Remittance information
        "",              // Beneficiary-to-originator info (unused)
    ]
    .join("\n")
}
