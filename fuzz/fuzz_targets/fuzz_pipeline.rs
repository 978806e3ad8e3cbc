#![no_main]

use df_core::Metrics;
use df_metrics::{analyze, compute_metrics};
use df_parser::{Sanitizer, parse_evidence_json, prepare_document, validate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(document) = prepare_document(raw, &Sanitizer::default()) else {
        return;
    };

    // Accepted documents must survive a print/reparse cycle.
    let printed = document.syntax().to_string();
    assert!(validate(&printed).is_ok(), "reprint rejected: {printed}");

    let report = analyze(&document);
    assert_eq!(report.metrics, compute_metrics(&document));
    if !report.metrics.is_zeroed() {
        let expected =
            Metrics::from_counts(report.metrics.node_count, report.metrics.edge_count);
        assert_eq!(report.metrics, expected);
    }

    let evidence = parse_evidence_json(&document);
    assert!(serde_json::from_str::<serde_json::Value>(&evidence).is_ok());
});
