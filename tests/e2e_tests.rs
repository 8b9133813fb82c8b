//! End-to-end integration tests
//!
//! These tests validate the complete request processing pipeline using
//! predefined CSV test fixtures. Each test:
//! 1. Reads input.csv from a fixture directory
//! 2. Runs every request as an agreement flow on a fresh simulated network
//! 3. Generates the obligation report
//! 4. Compares actual output with expected.csv
//!
//! Test fixtures are located in tests/fixtures/ and cover:
//! - Issuance recorded at both parties
//! - Settlement consuming the matching obligation
//! - Contract rejections (non-positive values, same party twice)
//! - Settling something already settled or never issued
//! - Many concurrent party pairs
//! - Malformed rows
//!
//! Each test is run twice: once with the sync strategy and once with the async strategy.

#[cfg(test)]
mod tests {
    use iou_ledger::cli::StrategyType;
    use iou_ledger::strategy::{create_strategy, BatchConfig};
    use iou_ledger::ProtocolConfig;
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    /// Run a test fixture by processing input.csv and comparing with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if fixture files cannot be read or the output does not match.
    fn run_test_fixture(fixture_name: &str, strategy_type: StrategyType) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );
        assert!(
            Path::new(&expected_path).exists(),
            "Expected file not found: {}",
            expected_path
        );

        // Small batches so async runs also cross batch boundaries
        let strategy = create_strategy(
            strategy_type,
            Some(BatchConfig::new(3, 4)),
            ProtocolConfig::default(),
        );

        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");
        strategy
            .process(Path::new(&input_path), &mut temp_output)
            .unwrap_or_else(|e| panic!("Failed to process requests: {}", e));
        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (strategy: {:?})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, strategy_type, actual_output, expected_output
        );
    }

    #[rstest]
    #[case("happy_path")]
    #[case("settlement")]
    #[case("invalid_values")]
    #[case("same_party")]
    #[case("double_settle")]
    #[case("multiple_pairs")]
    #[case("malformed_data")]
    fn test_fixtures(
        #[case] fixture: &str,
        #[values(StrategyType::Sync, StrategyType::Async)] strategy: StrategyType,
    ) {
        run_test_fixture(fixture, strategy);
    }

    #[test]
    fn test_acceptor_limit_from_config() {
        let mut input = NamedTempFile::new().unwrap();
        input
            .write_all(b"action,lender,borrower,value\nissue,PartyA,PartyB,50\nissue,PartyA,PartyB,500\n")
            .unwrap();
        input.flush().unwrap();

        let protocol = ProtocolConfig::new(std::time::Duration::from_secs(5), 3, Some(100));
        let strategy = create_strategy(StrategyType::Sync, None, protocol);
        let mut output = Vec::new();
        strategy.process(input.path(), &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "holder,lender,borrower,value\nPartyA,PartyA,PartyB,50\nPartyB,PartyA,PartyB,50\n"
        );
    }
}
