// SPDX-License-Identifier: PMPL-1.0-or-later
//! Demonstration dataset: three consistent facts and one contradiction.

use nexus_graph::PropertyValue;
use nexus_ingest::{FactIngested, FactInput, IngestError, TemporalIngestion};

fn fact(subject: &str, predicate: &str, object: &str, source: &str, metadata: &[(&str, &str)]) -> FactInput {
    FactInput {
        subject: Some(subject.to_string()),
        predicate: Some(predicate.to_string()),
        object: Some(object.to_string()),
        metadata: metadata
            .iter()
            .map(|(k, v)| (k.to_string(), PropertyValue::from(*v)))
            .collect(),
        source_document: Some(source.to_string()),
        ..Default::default()
    }
}

/// The four demo facts. Amit is CEO of both CompanyX and CompanyY.
pub fn demo_facts() -> Vec<FactInput> {
    vec![
        fact(
            "Amit",
            "CEO_OF",
            "CompanyX",
            "company_records_2024.pdf",
            &[("since", "2024"), ("location", "San Francisco")],
        ),
        fact("Sarah", "CTO_OF", "CompanyX", "company_records_2023.pdf", &[("since", "2023")]),
        fact(
            "CompanyX",
            "HEADQUARTERED_IN",
            "San Francisco",
            "company_info.pdf",
            &[("moved", "2020")],
        ),
        fact("Amit", "CEO_OF", "CompanyY", "press_release_2025.pdf", &[("since", "2025")]),
    ]
}

/// Ingest the demo facts, one result per fact.
pub async fn ingest_demo(ingestion: &TemporalIngestion) -> Vec<Result<FactIngested, IngestError>> {
    ingestion.batch_ingest_facts(demo_facts()).await
}
