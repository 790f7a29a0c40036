// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for detection, ingestion and healing

use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nexus_conflict::{assess_severity, scan, ConflictDetector, DetectorConfig};
use nexus_graph::{
    Entity, EntityId, EntityUpsert, GraphStore, InMemoryGraphStore, Relationship,
    RelationshipSnapshot,
};
use nexus_healer::{LatestEvidenceArbiter, SelfCorrectionEngine};
use nexus_ingest::{Fact, TemporalIngestion};
use tokio::runtime::Runtime;

/// `people` subjects, each CEO of `companies_each` companies.
fn synthetic_graph(people: usize, companies_each: usize) -> (Vec<Entity>, Vec<Relationship>) {
    let now = Utc::now();
    let mut entities = Vec::new();
    let mut relationships = Vec::new();
    for p in 0..people {
        let person = EntityUpsert::new(format!("Person {p}"), "Person");
        let person_id = person.id.clone();
        entities.push(Entity::from_upsert(person));
        for c in 0..companies_each {
            let company = EntityUpsert::new(format!("Company {p}-{c}"), "Organization");
            let company_id = company.id.clone();
            entities.push(Entity::from_upsert(company));
            let confidence = if c % 3 == 0 { 0.5 } else { 0.95 };
            relationships.push(
                Relationship::new(person_id.clone(), company_id, "CEO_OF")
                    .with_confidence(confidence)
                    .at(now - Duration::days((c * 20) as i64)),
            );
        }
    }
    (entities, relationships)
}

// ============================================================================
// Detection
// ============================================================================

fn bench_scan(c: &mut Criterion) {
    let config = DetectorConfig::default();
    let now = Utc::now();
    let mut group = c.benchmark_group("detection");

    for people in [100usize, 1_000, 5_000] {
        let (entities, relationships) = synthetic_graph(people, 3);
        group.throughput(Throughput::Elements(relationships.len() as u64));
        group.bench_with_input(BenchmarkId::new("all_conflicts", people), &people, |b, _| {
            b.iter(|| black_box(scan::all_conflicts(&entities, &relationships, now, &config)))
        });
    }
    group.finish();
}

fn bench_severity(c: &mut Criterion) {
    let now = Utc::now();
    let edges: Vec<RelationshipSnapshot> = (0..64)
        .map(|i| {
            let rel = Relationship::new(EntityId::new("s"), EntityId::new(format!("t{i}")), "CEO_OF")
                .at(now - Duration::days(i * 7));
            RelationshipSnapshot::capture(&rel, format!("Target {i}"))
        })
        .collect();

    c.bench_function("severity/assess_64_edges", |b| {
        b.iter(|| black_box(assess_severity(&edges, now)))
    });
}

// ============================================================================
// Ingestion and healing
// ============================================================================

fn bench_ingest(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("ingest");
    group.throughput(Throughput::Elements(1));

    let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
    let ingestion = TemporalIngestion::new(store);
    let mut n = 0u64;
    group.bench_function("ingest_fact", |b| {
        b.to_async(&rt).iter(|| {
            n += 1;
            let fact = Fact::new(format!("Person {}", n % 500), "WORKS_AT", format!("Company {n}"));
            let ingestion = &ingestion;
            async move { black_box(ingestion.ingest_fact(fact).await.unwrap()) }
        });
    });
    group.finish();
}

fn bench_detect_and_heal(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("healing");
    group.sample_size(20);

    group.bench_function("detect_and_heal_200_entities", |b| {
        b.to_async(&rt).iter(|| async {
            let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
            let ingestion = TemporalIngestion::new(store.clone());
            let now = Utc::now();
            for p in 0..200 {
                for c in 0..2 {
                    let fact = Fact::new(format!("Person {p}"), "CEO_OF", format!("Company {p}-{c}"))
                        .at(now - Duration::days(c * 40));
                    ingestion.ingest_fact(fact).await.unwrap();
                }
            }
            let detector = ConflictDetector::new(store.clone(), DetectorConfig::default());
            let conflicts = detector.run_detection_cycle().await.unwrap();
            let engine =
                SelfCorrectionEngine::with_defaults(store, Arc::new(LatestEvidenceArbiter::default()));
            black_box(engine.heal_all_conflicts(&conflicts).await)
        });
    });
    group.finish();
}

criterion_group!(detection, bench_scan, bench_severity);
criterion_group!(pipeline, bench_ingest, bench_detect_and_heal);
criterion_main!(detection, pipeline);
