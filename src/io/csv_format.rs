//! CSV format handling for agreement requests and obligation output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to agreement requests
//! - Obligation report serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::core::engine::Holding;
use crate::types::{AgreementRequest, RequestAction};
use serde::Deserialize;
use std::io::Write;

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns: action, lender, borrower, value.
/// The value is kept as text so a malformed number is reported per row
/// instead of failing the whole deserializer.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    pub action: String,
    pub lender: String,
    pub borrower: String,
    pub value: Option<String>,
}

/// Convert a CsvRecord to an AgreementRequest
///
/// This function:
/// - Parses the action string (case insensitive) into a RequestAction
/// - Requires non-empty lender and borrower names
/// - Parses the value as a signed integer
///
/// Zero and negative values are accepted here; the obligation contract is
/// what rejects them, so they still travel through a flow and show up as a
/// `positive_value` failure.
///
/// # Arguments
///
/// * `csv_record` - The deserialized CSV record
///
/// # Returns
///
/// Result containing either:
/// - Ok(AgreementRequest) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<AgreementRequest, String> {
    let action = match csv_record.action.to_lowercase().as_str() {
        "issue" => RequestAction::Issue,
        "settle" => RequestAction::Settle,
        _ => {
            return Err(format!(
                "Invalid action: '{}' for {} -> {}",
                csv_record.action, csv_record.lender, csv_record.borrower
            ))
        }
    };

    if csv_record.lender.is_empty() || csv_record.borrower.is_empty() {
        return Err(format!(
            "{:?} request requires both a lender and a borrower",
            action
        ));
    }

    let value = match csv_record.value {
        Some(value_str) if !value_str.trim().is_empty() => {
            value_str.trim().parse::<i64>().map_err(|_| {
                format!(
                    "Invalid value '{}' for {} -> {}",
                    value_str, csv_record.lender, csv_record.borrower
                )
            })?
        }
        _ => {
            return Err(format!(
                "{:?} request from {} to {} requires a value",
                action, csv_record.lender, csv_record.borrower
            ))
        }
    };

    Ok(AgreementRequest {
        action,
        lender: csv_record.lender,
        borrower: csv_record.borrower,
        value,
    })
}

/// Write every holder's unconsumed obligations in CSV format
///
/// Columns: holder, lender, borrower, value. Rows are sorted by all four
/// columns so output is deterministic whatever order flows finished in.
///
/// # Arguments
///
/// * `holdings` - Obligations as seen from each vault
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_obligations_csv(holdings: &[Holding], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["holder", "lender", "borrower", "value"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut rows: Vec<(&str, &str, &str, i64)> = holdings
        .iter()
        .map(|holding| {
            (
                holding.holder.as_str(),
                holding.obligation.lender.name.as_str(),
                holding.obligation.borrower.name.as_str(),
                holding.obligation.value,
            )
        })
        .collect();
    rows.sort();

    for (holder, lender, borrower, value) in rows {
        writer
            .write_record([holder, lender, borrower, value.to_string().as_str()])
            .map_err(|e| format!("Failed to write obligation record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::keys_for;
    use crate::types::{ObligationState, Party};
    use rstest::rstest;

    fn record(action: &str, lender: &str, borrower: &str, value: Option<&str>) -> CsvRecord {
        CsvRecord {
            action: action.to_string(),
            lender: lender.to_string(),
            borrower: borrower.to_string(),
            value: value.map(|s| s.to_string()),
        }
    }

    fn holding(holder: &str, lender: &str, borrower: &str, value: i64) -> Holding {
        let party = |name: &str| Party::new(name, keys_for(name).public_key());
        Holding {
            holder: holder.to_string(),
            obligation: ObligationState::new(value, party(lender), party(borrower)),
        }
    }

    #[rstest]
    #[case("issue", RequestAction::Issue, "10", 10)]
    #[case("settle", RequestAction::Settle, "10", 10)]
    #[case("ISSUE", RequestAction::Issue, " 7 ", 7)] // case insensitive, trimmed
    #[case("issue", RequestAction::Issue, "0", 0)]
    #[case("issue", RequestAction::Issue, "-5", -5)]
    fn test_convert_csv_record_valid(
        #[case] action: &str,
        #[case] expected_action: RequestAction,
        #[case] value: &str,
        #[case] expected_value: i64,
    ) {
        let request = convert_csv_record(record(action, "PartyA", "PartyB", Some(value))).unwrap();

        assert_eq!(request.action, expected_action);
        assert_eq!(request.lender, "PartyA");
        assert_eq!(request.borrower, "PartyB");
        assert_eq!(request.value, expected_value);
    }

    #[rstest]
    #[case::invalid_action("transfer", "PartyA", "PartyB", Some("1"), "Invalid action")]
    #[case::missing_value("issue", "PartyA", "PartyB", None, "requires a value")]
    #[case::blank_value("issue", "PartyA", "PartyB", Some("  "), "requires a value")]
    #[case::invalid_value("issue", "PartyA", "PartyB", Some("ten"), "Invalid value")]
    #[case::fractional_value("issue", "PartyA", "PartyB", Some("1.5"), "Invalid value")]
    #[case::missing_lender("issue", "", "PartyB", Some("1"), "requires both")]
    fn test_convert_csv_record_errors(
        #[case] action: &str,
        #[case] lender: &str,
        #[case] borrower: &str,
        #[case] value: Option<&str>,
        #[case] expected_error: &str,
    ) {
        let result = convert_csv_record(record(action, lender, borrower, value));
        assert!(result.unwrap_err().contains(expected_error));
    }

    #[rstest]
    #[case::empty(vec![], "holder,lender,borrower,value\n")]
    #[case::both_holders(
        vec![
            holding("PartyB", "PartyA", "PartyB", 10),
            holding("PartyA", "PartyA", "PartyB", 10),
        ],
        "holder,lender,borrower,value\nPartyA,PartyA,PartyB,10\nPartyB,PartyA,PartyB,10\n"
    )]
    #[case::sorted_by_every_column(
        vec![
            holding("PartyA", "PartyC", "PartyA", 1),
            holding("PartyA", "PartyA", "PartyB", 20),
            holding("PartyA", "PartyA", "PartyB", 3),
        ],
        "holder,lender,borrower,value\nPartyA,PartyA,PartyB,3\nPartyA,PartyA,PartyB,20\nPartyA,PartyC,PartyA,1\n"
    )]
    fn test_write_obligations_csv(#[case] holdings: Vec<Holding>, #[case] expected_output: &str) {
        let mut output = Vec::new();
        write_obligations_csv(&holdings, &mut output).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), expected_output);
    }
}
